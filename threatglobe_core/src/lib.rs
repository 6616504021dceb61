//! ThreatGlobe Core - entity lifecycle and layer dispatch for live threat-event globes
//!
//! Inbound event records become short-lived entities (explosions, circles,
//! pointers, bars, downloaded images, arcs) that independent layers hold in
//! sorted collections, age every tick and drop once expired:
//! 1. **Lifecycle**: start time, lifetime, fade window and per-type phases
//! 2. **Dispatch**: a capability registry routing ticks to the layers that opted in
//! 3. **Aggregation**: rolling event counters and H3 hex-bin analysis

pub mod color;
pub mod globe_analysis;
pub mod globe_counters;
pub mod globe_entities;
pub mod globe_explosion;
pub mod globe_layers;
pub mod globe_lifecycle;
pub mod globe_providers;
pub mod globe_registry;
pub mod globe_runtime;
pub mod globe_shapes;
pub mod globe_sorted;
pub mod globe_view;
pub mod ingest;
pub mod settings;
pub mod state;

#[cfg(feature = "dashboard")]
pub mod dashboard;

// Re-export key types for convenience
pub use color::Rgba;
pub use globe_counters::EventCounterData;
pub use globe_entities::Entity;
pub use globe_lifecycle::{EntityId, EntityKind, PointData};
pub use globe_registry::GlobeLayerRegistry;
pub use globe_runtime::{GlobeRuntime, RuntimeConfig, RuntimeSnapshot};
pub use globe_view::{CameraPosition, GlobeView};
pub use ingest::{IngestError, Ingested};
pub use settings::Settings;
pub use state::AppState;
