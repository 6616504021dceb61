//! Production implementations backed by Tokio and the system clock.

use crate::{EnvError, GlobeContext, ImageCallback, ImageFetcher, ImageSource};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Production context backed by Tokio and OS entropy.
///
/// Time comes from the system clock, jitter from `thread_rng`.
pub struct SystemContext;

impl SystemContext {
    /// Creates a new SystemContext.
    pub fn new() -> Self {
        Self
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for SystemContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GlobeContext for SystemContext {
    fn now_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    fn random_unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

/// Fetcher that runs every load of an [`ImageSource`] as a tokio task.
///
/// Must be used from within a tokio runtime.
pub struct TokioImageFetcher<S: ImageSource> {
    source: Arc<S>,
}

impl<S: ImageSource> TokioImageFetcher<S> {
    /// Wraps an image source.
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

impl<S: ImageSource> ImageFetcher for TokioImageFetcher<S> {
    fn fetch(&self, url: &str, done: ImageCallback) {
        let source = Arc::clone(&self.source);
        let url = url.to_string();
        tokio::spawn(async move {
            let result = source.load(&url).await;
            if let Err(e) = &result {
                tracing::debug!("image load failed: {}", e);
            }
            done(result);
        });
    }
}

/// Rejects every load. Useful when downloaded objects are disabled.
pub struct NoImageSource;

#[async_trait]
impl ImageSource for NoImageSource {
    async fn load(&self, url: &str) -> Result<crate::ImageBitmap, EnvError> {
        Err(EnvError::fetch(url, "no image source configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageBitmap;
    use tokio::sync::oneshot;

    struct FixedSource;

    #[async_trait]
    impl ImageSource for FixedSource {
        async fn load(&self, url: &str) -> Result<ImageBitmap, EnvError> {
            if url.ends_with(".png") {
                Ok(ImageBitmap::new(4, 2, vec![0; 32]))
            } else {
                Err(EnvError::fetch(url, "unsupported"))
            }
        }
    }

    #[tokio::test]
    async fn test_system_context_time() {
        let ctx = SystemContext::new();
        let t1 = ctx.now_ms();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now_ms();

        assert!(t2 - t1 >= 10.0);
    }

    #[test]
    fn test_system_context_random_range() {
        let ctx = SystemContext::new();
        for _ in 0..100 {
            let r = ctx.random_unit();
            assert!((0.0..1.0).contains(&r));
        }
        assert_eq!(ctx.seed(), 0);
    }

    #[tokio::test]
    async fn test_tokio_fetcher_delivers_result() {
        let fetcher = TokioImageFetcher::new(FixedSource);

        let (tx, rx) = oneshot::channel();
        fetcher.fetch("https://example.org/a.png", Box::new(move |r| {
            let _ = tx.send(r);
        }));
        let bitmap = rx.await.unwrap().unwrap();
        assert_eq!(bitmap.width, 4);

        let (tx, rx) = oneshot::channel();
        fetcher.fetch("https://example.org/a.gif", Box::new(move |r| {
            let _ = tx.send(r);
        }));
        assert!(rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_no_image_source_rejects() {
        let fetcher = TokioImageFetcher::new(NoImageSource);
        let (tx, rx) = oneshot::channel();
        fetcher.fetch("x", Box::new(move |r| {
            let _ = tx.send(r);
        }));
        assert!(rx.await.unwrap().is_err());
    }
}
