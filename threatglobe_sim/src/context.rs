//! Simulation context implementing GlobeContext for deterministic testing.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use threatglobe_env::GlobeContext;

/// Simulation context backed by deterministic time and RNG.
///
/// This implements `GlobeContext` using:
/// - A virtual clock that only moves when advanced
/// - A seeded ChaCha8 RNG for location and spawn jitter
/// - Simulated sleep that advances virtual time
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (ms since simulation start)
    virtual_time_ms: Arc<Mutex<f64>>,

    /// Deterministic RNG for jitter
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ms: Arc::new(Mutex::new(0.0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        *lock(&self.virtual_time_ms) += duration.as_secs_f64() * 1000.0;
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time_ms(&self, time_ms: f64) {
        *lock(&self.virtual_time_ms) = time_ms;
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ms: Arc::clone(&self.virtual_time_ms),
            rng: Arc::clone(&self.rng),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl GlobeContext for SimContext {
    fn now_ms(&self) -> f64 {
        *lock(&self.virtual_time_ms)
    }

    fn random_unit(&self) -> f64 {
        lock(&self.rng).gen::<f64>()
    }

    async fn sleep(&self, duration: Duration) {
        // In simulation, sleep advances virtual time
        self.advance_time(duration);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now_ms(), 0.0);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now_ms(), 1000.0);

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now_ms(), 1500.0);

        ctx.set_time_ms(10.0);
        assert_eq!(ctx.now_ms(), 10.0);
    }

    #[test]
    fn test_sim_context_deterministic_jitter() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);
        let a: Vec<f64> = (0..5).map(|_| ctx1.random_unit()).collect();
        let b: Vec<f64> = (0..5).map(|_| ctx2.random_unit()).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|r| (0.0..1.0).contains(r)));

        let other = SimContext::new(43);
        assert_ne!(a[0], other.random_unit());
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        assert_eq!(ctx1.now_ms(), ctx2.now_ms());
        assert_eq!(ctx2.seed(), 42);
    }

    #[tokio::test]
    async fn test_sleep_advances_virtual_time() {
        let ctx = SimContext::new(1);
        ctx.sleep(Duration::from_millis(200)).await;
        assert_eq!(ctx.now_ms(), 200.0);
    }
}
