use rand::Rng;

/// Source of uniform draws in `[0, 1)`.
///
/// Every place the engine flips a coin (retry jitter, banter, daydream shape)
/// takes one of these instead of reaching for a global generator, so tests
/// can script the outcome.
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;
}

/// Default source backed by the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::rng().random()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
