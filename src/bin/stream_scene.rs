//! Scene streamer: downloads a scene's models in priority order and logs
//! what a renderer would receive.
//!
//! Usage: cargo run --release --bin stream_scene -- <SCENE.json> [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Streamer configuration JSON (default: built-in defaults)
//!   --cdn <URL>       CDN root (default: http://open3dhub.com)
//!   --cached          Reuse artifacts published by an earlier run

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use meshstream::asset::{AssetId, Scene};
use meshstream::core::{Result, StreamerConfig, logging};
use meshstream::orchestrator::{Action, Orchestrator};
use meshstream::services::{Collaborators, HttpFetcher, PassthroughMaterializer, http::DEFAULT_BASE_URL};
use meshstream::streaming::PdaeDecoder;

#[derive(Default)]
struct AssetProgress {
    ready_after: Option<f64>,
    texture_updates: usize,
    refinements: usize,
    failures: usize,
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn run(args: &[String]) -> Result<()> {
    let Some(scene_path) = args.get(1).filter(|a| !a.starts_with("--")) else {
        eprintln!("Usage: stream_scene <SCENE.json> [--config <PATH>] [--cdn <URL>] [--cached]");
        return Ok(());
    };

    let config = match parse_str_arg(args, "--config") {
        Some(path) => StreamerConfig::load(&PathBuf::from(path))?,
        None => StreamerConfig::default(),
    };
    let cdn = parse_str_arg(args, "--cdn").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let cached = args.iter().any(|a| a == "--cached");

    let scene = Scene::load(&PathBuf::from(scene_path))?;
    let vantage = scene.vantage();
    let assets: Vec<_> = scene
        .descriptors(config.min_base_texture_dimension)
        .into_iter()
        .map(|asset| asset.with_materialized(cached))
        .collect();

    log::info!("=== meshstream ===");
    log::info!("Scene:   {scene_path} ({} models)", assets.len());
    log::info!("CDN:     {cdn}");
    log::info!("Vantage: {vantage}");
    log::info!("Workers: {} download, {} materialize", config.download_workers, config.materialize_workers);

    let collaborators = Collaborators {
        fetcher: Arc::new(HttpFetcher::new(cdn)?),
        materializer: Arc::new(PassthroughMaterializer),
        decoder: Arc::new(PdaeDecoder),
    };

    let start = Instant::now();
    let (handle, mut actions) = Orchestrator::stream(config, collaborators, assets, vantage)?;

    let mut progress: BTreeMap<AssetId, AssetProgress> = BTreeMap::new();
    while let Some(action) = actions.blocking_recv() {
        match action {
            Action::AssetReady { asset, artifact } => {
                let elapsed = start.elapsed().as_secs_f64();
                log::info!("[{elapsed:7.2}s] {asset} ready: {}", artifact.path().display());
                progress.entry(asset).or_default().ready_after = Some(elapsed);
            }
            Action::TextureUpdated { asset, mip_offset, data } => {
                log::debug!("{asset}: texture level at {mip_offset} ({} bytes)", data.len());
                progress.entry(asset).or_default().texture_updates += 1;
            }
            Action::RefinementsAvailable { asset, refinements } => {
                log::debug!("{asset}: {} refinements", refinements.len());
                progress.entry(asset).or_default().refinements += refinements.len();
            }
            Action::AssetFailed { asset, task, error } => {
                log::warn!("{asset}: {task:?} failed: {error}");
                progress.entry(asset).or_default().failures += 1;
            }
            Action::AllWorkDone => break,
        }
    }

    let report = handle.join()?;
    log::info!("Finished in {:.2}s", start.elapsed().as_secs_f64());
    for (asset, p) in &progress {
        let ready = p.ready_after.map_or("never".to_string(), |t| format!("{t:.2}s"));
        log::info!(
            "  {asset}: ready {ready}, {} texture updates, {} refinements, {} failures",
            p.texture_updates,
            p.refinements,
            p.failures
        );
    }
    if !report.failures.is_empty() {
        log::warn!("{} task failures", report.failures.len());
    }
    Ok(())
}

fn main() -> ExitCode {
    logging::init();
    let args: Vec<String> = std::env::args().collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
