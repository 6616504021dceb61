//! ThreatGlobe Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction that lets the ThreatGlobe
//! engine run both in **Production** (tokio, system clock) and inside the
//! deterministic **Simulation** harness.
//!
//! # Core Concept
//!
//! Everything the engine would otherwise take from the outside world is
//! injected:
//! - Time (`now_ms()`, `sleep()`)
//! - Randomness (`random_unit()`, used for location/spawn jitter)
//! - Image downloads (`ImageFetcher::fetch()`, fire-and-forget)
//!
//! Producers hand work to the engine through an [`InboundQueue`], which the
//! engine drains atomically once per ingestion tick.
//!
//! # Example
//!
//! ```ignore
//! use threatglobe_env::{GlobeContext, InboundQueue};
//!
//! async fn ingestion_loop(ctx: &dyn GlobeContext, queue: &InboundQueue<String>) {
//!     loop {
//!         for raw in queue.take_all() {
//!             handle(raw, ctx.now_ms());
//!         }
//!         ctx.sleep(Duration::from_millis(200)).await;
//!     }
//! }
//! ```

mod context;
mod error;
mod fetch;
mod tokio_impl;
mod types;

pub use context::GlobeContext;
pub use error::EnvError;
pub use fetch::{ImageCallback, ImageFetcher, ImageSource};
pub use tokio_impl::{NoImageSource, SystemContext, TokioImageFetcher};
pub use types::{ImageBitmap, InboundQueue};
