//! Simulated image fetcher with virtual latency and a failure rate.

use crate::context::SimContext;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Mutex, MutexGuard};
use threatglobe_env::{EnvError, GlobeContext, ImageBitmap, ImageCallback, ImageFetcher};
use tracing::debug;

/// A fetch waiting for its virtual completion time.
struct PendingFetch {
    due_ms: f64,
    url: String,
    fails: bool,
    done: ImageCallback,
}

/// Deterministic stand-in for a network image loader.
///
/// Latency and failure are drawn at request time from a seeded RNG; the
/// callback fires from [`SimImageFetcher::deliver_due`] once the virtual
/// clock has passed the due time.
pub struct SimImageFetcher {
    context: SimContext,
    rng: Mutex<ChaCha8Rng>,
    max_latency_ms: f64,
    failure_rate: f64,
    pending: Mutex<Vec<PendingFetch>>,
}

impl SimImageFetcher {
    /// # Arguments
    /// * `context` - Shared virtual clock
    /// * `seed` - Seed for latency and failure draws
    pub fn new(context: SimContext, seed: u64) -> Self {
        Self {
            context,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            max_latency_ms: 800.0,
            failure_rate: 0.1,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Sets the upper bound of the uniform latency draw.
    pub fn with_max_latency_ms(mut self, ms: f64) -> Self {
        self.max_latency_ms = ms;
        self
    }

    /// Sets the probability that a fetch fails.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fetches not yet delivered.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Runs the callbacks of every fetch due by the current virtual time.
    ///
    /// # Returns
    /// Number of callbacks invoked.
    pub fn deliver_due(&self) -> usize {
        let now = self.context.now_ms();
        let due: Vec<PendingFetch> = {
            let mut pending = lock(&self.pending);
            let (due, waiting): (Vec<PendingFetch>, Vec<PendingFetch>) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|fetch| fetch.due_ms <= now);
            *pending = waiting;
            due
        };

        let delivered = due.len();
        for fetch in due {
            let result = if fetch.fails {
                Err(EnvError::fetch(&fetch.url, "simulated failure"))
            } else {
                Ok(ImageBitmap::new(16, 16, vec![0xff; 16 * 16 * 4]))
            };
            (fetch.done)(result);
        }
        delivered
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ImageFetcher for SimImageFetcher {
    fn fetch(&self, url: &str, done: ImageCallback) {
        let (latency, fails) = {
            let mut rng = lock(&self.rng);
            let latency = rng.gen::<f64>() * self.max_latency_ms;
            (latency, rng.gen_bool(self.failure_rate))
        };
        debug!("Sim fetch {} due in {:.0}ms (fails: {})", url, latency, fails);
        lock(&self.pending).push(PendingFetch {
            due_ms: self.context.now_ms() + latency,
            url: url.to_string(),
            fails,
            done,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn recorder() -> (Arc<Mutex<Vec<bool>>>, impl Fn() -> ImageCallback) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let make = move || -> ImageCallback {
            let sink = Arc::clone(&sink);
            Box::new(move |result| sink.lock().unwrap().push(result.is_ok()))
        };
        (results, make)
    }

    #[test]
    fn test_delivered_after_latency() {
        let ctx = SimContext::new(7);
        let fetcher = SimImageFetcher::new(ctx.clone(), 7)
            .with_max_latency_ms(100.0)
            .with_failure_rate(0.0);
        let (results, callback) = recorder();

        fetcher.fetch("https://img.example/a.png", callback());
        fetcher.fetch("https://img.example/b.png", callback());
        assert_eq!(fetcher.pending(), 2);

        ctx.advance_time(Duration::from_millis(100));
        assert_eq!(fetcher.deliver_due(), 2);
        assert_eq!(fetcher.pending(), 0);
        assert_eq!(*results.lock().unwrap(), vec![true, true]);
    }

    #[test]
    fn test_failure_rate_one_always_fails() {
        let ctx = SimContext::new(7);
        let fetcher = SimImageFetcher::new(ctx.clone(), 7)
            .with_max_latency_ms(0.0)
            .with_failure_rate(1.0);
        let (results, callback) = recorder();

        fetcher.fetch("https://img.example/a.png", callback());
        fetcher.deliver_due();
        assert_eq!(*results.lock().unwrap(), vec![false]);
    }
}
