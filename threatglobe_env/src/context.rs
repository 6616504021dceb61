//! Core environment context trait for the ThreatGlobe engine.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the globe engine can run
/// against the system clock in production and against a virtual clock in
/// simulation.
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wall clock, `thread_rng`, `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// Every source of non-determinism the engine touches (time and jitter)
/// goes through this trait.
#[async_trait]
pub trait GlobeContext: Send + Sync + 'static {
    /// Returns the current wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Entity `startTime`s and counter bucket timestamps are expressed in
    /// this clock. In simulation, this is virtual time plus a fixed epoch.
    fn now_ms(&self) -> f64;

    /// Returns a uniformly distributed value in `[0, 1)`.
    ///
    /// Used for explosion location and spawn-time jitter.
    fn random_unit(&self) -> f64;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
