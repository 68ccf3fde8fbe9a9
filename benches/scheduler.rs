use criterion::{criterion_group, criterion_main, Criterion, black_box};

use meshstream::services::RefinementDecoder;
use meshstream::streaming::{
    encode_pdae, solid_angle, PdaeDecoder, PriorityWeights, RefinementOp, RefinementRecord,
};

use glam::Vec3;

fn sample_stream(records: usize) -> Vec<u8> {
    let records: Vec<RefinementRecord> = (0..records)
        .map(|r| RefinementRecord {
            ops: vec![
                RefinementOp::VertexAddition {
                    position: [r as f32, 1.0, 2.0],
                    normal: [0.0, 1.0, 0.0],
                    uv: [0.5, 0.5],
                },
                RefinementOp::TriangleAddition([0, 1, r as u32 + 2]),
                RefinementOp::IndexUpdate { index: 0, vertex: r as u32 },
            ],
        })
        .collect();
    encode_pdae(&records)
}

fn bench_solid_angle(c: &mut Criterion) {
    let centers: Vec<Vec3> = (0..1024)
        .map(|i| Vec3::new(i as f32 * 37.0, (i % 17) as f32 * 100.0, -(i as f32) * 11.0))
        .collect();

    c.bench_function("solid_angle_1024", |b| {
        b.iter(|| {
            centers
                .iter()
                .map(|&center| solid_angle(black_box(Vec3::new(0.0, 30000.0, 10000.0)), center, 1000.0))
                .sum::<f64>()
        });
    });
}

fn bench_chunk_priority(c: &mut Criterion) {
    let weights = PriorityWeights::default();

    c.bench_function("next_chunk_priority", |b| {
        let mut offset = 0u64;
        b.iter(|| {
            offset = offset.wrapping_add(512 * 1024);
            weights.next_chunk(black_box(0.01), offset, 512 * 1024)
        });
    });
}

fn bench_pdae_decode_whole(c: &mut Criterion) {
    let stream = sample_stream(2000);

    c.bench_function("pdae_decode_2000", |b| {
        b.iter(|| PdaeDecoder.decode(black_box(&stream), 0, None));
    });
}

fn bench_pdae_decode_chunked(c: &mut Criterion) {
    let stream = sample_stream(2000);
    let chunk = 4096;

    c.bench_function("pdae_decode_2000_chunked_4k", |b| {
        b.iter(|| {
            let mut buffered = Vec::new();
            let mut read = 0;
            let mut total = None;
            for piece in stream.chunks(chunk) {
                buffered.extend_from_slice(piece);
                if let Ok(decoded) = PdaeDecoder.decode(&buffered, read, total) {
                    read = decoded.refinements_read;
                    total = decoded.num_refinements;
                    buffered = decoded.remainder;
                }
            }
            read
        });
    });
}

criterion_group!(
    benches,
    bench_solid_angle,
    bench_chunk_priority,
    bench_pdae_decode_whole,
    bench_pdae_decode_chunked,
);
criterion_main!(benches);
