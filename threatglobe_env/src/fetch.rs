//! Image fetch abstraction for downloaded-image entities.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::ImageBitmap;

/// Completion callback for a fetch. Invoked exactly once.
pub type ImageCallback = Box<dyn FnOnce(Result<ImageBitmap, EnvError>) + Send + 'static>;

/// Fire-and-forget image loading.
///
/// # Implementations
///
/// - **Production**: `TokioImageFetcher` - spawns the download on tokio
/// - **Simulation**: `SimImageFetcher` - virtual latency and failure rate
///
/// # Flow
///
/// ```text
/// Provider                  Fetcher                   Source
///   |                          |                         |
///   |-- fetch(url, done) ----->|                         |
///   |   (returns at once)      |-- load(url) ----------->|
///   |                          |<------- bitmap/error ---|
///   |<-- done(result) ---------|                         |
/// ```
pub trait ImageFetcher: Send + Sync + 'static {
    /// Starts loading `url`. Never blocks; `done` may run on another task.
    fn fetch(&self, url: &str, done: ImageCallback);
}

/// An async image source, e.g. an HTTP client living outside this crate.
#[async_trait]
pub trait ImageSource: Send + Sync + 'static {
    /// Loads and decodes the image at `url`.
    async fn load(&self, url: &str) -> Result<ImageBitmap, EnvError>;
}
