use std::sync::Mutex;

use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::store::BoxFuture;
use crate::utils::lock;

/// Probability that the simulated detector reports a face.
pub const DEFAULT_FALLBACK_PRESENCE_PROBABILITY: f64 = 0.8;

/// Face-detection capability.
///
/// Implementations wrap a real landmark detector and report `true` whenever
/// it finds at least one face in the current frame.
pub trait Detector: Send + Sync {
    /// Resolves once the camera is ready to be sampled.
    fn initialize<'a>(&'a self) -> BoxFuture<'a, Result<()>>;

    fn sample<'a>(&'a self) -> BoxFuture<'a, Result<bool>>;
}

/// Maps a face list from a landmark detector onto presence.
pub fn faces_present<T>(faces: &[T]) -> bool {
    !faces.is_empty()
}

/// Pseudo-random presence used when the real detector cannot be reached.
pub struct FallbackDetector {
    rng: Mutex<StdRng>,
    presence_probability: f64,
}

impl FallbackDetector {
    pub fn new(presence_probability: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            presence_probability: presence_probability.clamp(0.0, 1.0),
        }
    }

    pub fn seeded(presence_probability: f64, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            presence_probability: presence_probability.clamp(0.0, 1.0),
        }
    }

    pub fn sample_now(&self) -> bool {
        lock(&self.rng).gen_bool(self.presence_probability)
    }
}

impl Default for FallbackDetector {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_PRESENCE_PROBABILITY)
    }
}

impl Detector for FallbackDetector {
    fn initialize<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn sample<'a>(&'a self) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.sample_now()) })
    }
}

/// Stand-in for hosts without a camera; always fails so the monitor falls back.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDetector;

impl Detector for UnavailableDetector {
    fn initialize<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Err(anyhow!("no camera available")) })
    }

    fn sample<'a>(&'a self) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async { Err(anyhow!("no camera available")) })
    }
}
