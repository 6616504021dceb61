//! Shared application state: the inbound queues between producers and the engine.

use crate::globe_entities::Entity;
use crate::globe_view::CameraPosition;
use threatglobe_env::InboundQueue;

/// Queues filled by ingestion and drained by the engine.
///
/// Clones share the same queues, so producers on other tasks can hold one.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Entities waiting for the next ingestion tick
    pub new_points: InboundQueue<Entity>,
    /// Event weights waiting for the next counter tick
    pub new_events: InboundQueue<f64>,
    /// Camera moves, consumed one at a time
    pub new_camera_positions: InboundQueue<CameraPosition>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}
