//! View-dependent priority for streaming tasks
//!
//! Every task concerning an asset derives its priority from the solid angle
//! the asset subtends at the vantage point.

use std::cmp::Ordering;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, Vec3};

/// Solid angle of the full sphere, returned when the vantage is inside the object
pub const MAX_SOLID_ANGLE: f64 = 4.0 * PI;

/// Solid angle subtended by a sphere of `radius` centred at `center`.
///
/// Strictly decreasing in distance and strictly increasing in radius.
/// Returns [`MAX_SOLID_ANGLE`] when `vantage` lies within the sphere.
pub fn solid_angle(vantage: Vec3, center: Vec3, radius: f32) -> f64 {
    let distance = vantage.as_dvec3().distance(center.as_dvec3());
    let radius = f64::from(radius.max(0.0));

    if distance <= radius {
        return MAX_SOLID_ANGLE;
    }

    let sin_alpha = radius / distance;
    let sin_sq = sin_alpha * sin_alpha;
    let cos_alpha = (1.0 - sin_sq).sqrt();

    // 1 - cos(a) == sin^2(a) / (1 + cos(a)); stays positive at long range
    2.0 * PI * sin_sq / (1.0 + cos_alpha)
}

/// Scheduling priority (higher = sooner)
#[derive(Clone, Copy, Debug, Default)]
pub struct Priority(pub f64);

impl Priority {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        // total_cmp keeps BinaryHeap ordering sound for NaN/infinity
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Scaling weights applied on top of the solid angle.
///
/// These bias relative scheduling only; any positive values keep the
/// per-asset ordering intact.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    /// Multiplier applied after dividing a model download by its byte size,
    /// keeping model downloads ahead of refinement chunks
    pub size_normalization_boost: f64,
    /// Decay factor for successive progressive chunks
    pub progressive_decay: f64,
    /// World-space bounding radius per unit of asset scale
    pub radius_per_scale: f32,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            size_normalization_boost: 1.0e12,
            progressive_decay: 0.3,
            radius_per_scale: 1000.0,
        }
    }
}

impl PriorityWeights {
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.size_normalization_boost)
            || !positive(self.progressive_decay)
            || !positive(f64::from(self.radius_per_scale))
        {
            return Err(Error::Config(format!("priority weights must be positive: {self:?}")));
        }
        Ok(())
    }

    /// Bounding radius of an asset with the given scale
    pub fn radius(&self, scale: f32) -> f32 {
        scale * self.radius_per_scale
    }

    /// Priority of the initial model download, normalized by download size
    pub fn model_download(&self, solid_angle: f64, download_size: Option<u64>) -> Priority {
        let size = download_size.filter(|&s| s > 0).unwrap_or(1) as f64;
        Priority(solid_angle / size * self.size_normalization_boost)
    }

    /// Priority of the progressive chunk that starts at `consumed_end`.
    ///
    /// Decays with the amount of stream already consumed; later refinements
    /// touch perceptually smaller detail.
    pub fn next_chunk(&self, solid_angle: f64, consumed_end: u64, chunk_size: u64) -> Priority {
        let chunk = chunk_size as f64;
        let scale = (self.progressive_decay * chunk).sqrt() / (consumed_end as f64 + chunk).sqrt();
        Priority(solid_angle * scale)
    }
}

/// Priority of a texture level relative to the base level already applied
pub fn texture_level(solid_angle: f64, base_pixels: u64, level_pixels: u64) -> Priority {
    let ratio = base_pixels as f64 / level_pixels.max(1) as f64;
    Priority(solid_angle * ratio.sqrt())
}
