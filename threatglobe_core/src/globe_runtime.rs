//! Globe Runtime - wires settings, ingestion, layers and counters together.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        GlobeRuntime                          │
//! │                                                              │
//! │  raw JSON ──▶ Ingestor ──▶ AppState queues                   │
//! │                              │ points   │ events   │ camera  │
//! │                              ▼          ▼          ▼         │
//! │  ingestion tick (200ms)   registry   counter   camera layer  │
//! │  counter tick   (1s)         │                               │
//! │  render tick    (16ms)       ▼                               │
//! │                          GlobeView                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Layer order
//!
//! Hooks are dispatched in registration order, which [`GlobeRuntime::new`]
//! fixes as:
//!
//! 1. `NewCameraPositions`, `Rotation` (camera first, so a frame sees it)
//! 2. `ExplosionDataGroup`, then its sub-layers `Explosions`, `HeatMap`
//! 3. providers: `Circles`, `Pointers`, `Bars`, `DownloadedObjectsProvider`, `Arcs`
//! 4. shape builders: circles, pointers, bars, downloaded objects
//! 5. `AnalysisMode`
//! 6. object passes: `Opacity`, `Labeled`, `GlobalZoom`
//! 7. `CustomObjects` (last, so every build and update hook above is known)

use crate::globe_analysis::AnalysisModeLayer;
use crate::globe_counters::{EventCounter, EventCounterData};
use crate::globe_entities::{BarData, CircleData, PointerData};
use crate::globe_layers::{
    CameraCommandLayer, CustomObjectLayerGroup, GlobalZoomLayer, LabelLayer, OpacityLayer,
    RotationLayer,
};
use crate::globe_lifecycle::EntityKind;
use crate::globe_providers::{
    ArcsLayer, CommonObjectProvider, DownloadedObjectsProvider, ExplosionDataGroup,
};
use crate::globe_registry::{GlobeLayerRegistry, Shared};
use crate::globe_shapes::{
    BarsLayer, CirclesLayer, DownloadedObjectsLayer, ExplosionsLayer, HeatmapLayer,
    PointersLayer,
};
use crate::globe_view::{GlobeView, Scene};
use crate::ingest::{IngestError, Ingested, Ingestor};
use crate::settings::Settings;
use crate::state::AppState;
use crossbeam::channel::Sender;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use threatglobe_env::{GlobeContext, ImageFetcher, InboundQueue};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Tick periods of the run loop.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Ingestion tick period in ms (default: 200)
    pub ingestion_interval_ms: u64,

    /// Counter aggregation period in ms (default: 1000)
    pub counter_interval_ms: u64,

    /// Render tick period in ms (default: 16)
    pub frame_interval_ms: u64,

    /// Viewport handed to scene-attached layers
    pub scene: Scene,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ingestion_interval_ms: 200,
            counter_interval_ms: 1000,
            frame_interval_ms: 16,
            scene: Scene::default(),
        }
    }
}

/// What the runtime looks like at one instant; fed to the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeSnapshot {
    pub timestamp_ms: f64,
    pub counters: EventCounterData,
    pub entity_counts: BTreeMap<EntityKind, usize>,
    pub shown_nodes: usize,
    pub arcs: usize,
    pub hex_bins: usize,
}

/// Handles the runtime keeps on the data-owning layers.
struct DataLayers {
    explosions: Shared<ExplosionDataGroup>,
    circles: Shared<CommonObjectProvider<CircleData>>,
    pointers: Shared<CommonObjectProvider<PointerData>>,
    bars: Shared<CommonObjectProvider<BarData>>,
    downloaded: Shared<DownloadedObjectsProvider>,
    arcs: Shared<ArcsLayer>,
    analysis: Shared<AnalysisModeLayer>,
}

/// The engine: one registry, one globe, one set of queues.
///
/// Single-threaded: layers are shared through `Rc`, so the runtime stays on
/// the thread that built it. Producers elsewhere feed it through the
/// [`AppState`] queues or the raw inbound queue of [`GlobeRuntime::run`].
pub struct GlobeRuntime {
    context: Arc<dyn GlobeContext>,
    config: RuntimeConfig,
    settings: Settings,
    state: AppState,
    registry: GlobeLayerRegistry,
    globe: GlobeView,
    ingestor: Ingestor,
    counter: EventCounter,
    layers: DataLayers,
    snapshots: Option<Sender<RuntimeSnapshot>>,
}

impl GlobeRuntime {
    /// Builds the registry with the standard layer set and attaches it.
    ///
    /// # Arguments
    /// * `context` - Clock and randomness
    /// * `fetcher` - Image loader for downloaded objects
    /// * `settings` - Initial settings; owned by the runtime from now on
    /// * `config` - Tick periods and viewport
    pub fn new(
        context: Arc<dyn GlobeContext>,
        fetcher: Arc<dyn ImageFetcher>,
        mut settings: Settings,
        config: RuntimeConfig,
    ) -> Self {
        let mut registry = GlobeLayerRegistry::new();

        registry
            .layer(CameraCommandLayer::new())
            .attach_to_globe()
            .attach_to_settings()
            .attach_to_state()
            .frame_update()
            .install();
        registry.layer(RotationLayer).frame_update().install();

        let explosions = registry
            .layer(ExplosionDataGroup::new(Arc::clone(&context)))
            .registry_aware()
            .pre_update()
            .new_data()
            .data_update()
            .frame_update()
            .object_provider()
            .install();
        registry
            .layer(ExplosionsLayer::new())
            .explosion_sub_layer()
            .build_object()
            .update_object_frame()
            .install();
        registry
            .layer(HeatmapLayer::new())
            .explosion_sub_layer()
            .install();

        let circles = registry
            .layer(CommonObjectProvider::circles())
            .pre_update()
            .new_data()
            .frame_update()
            .object_provider()
            .install();
        let pointers = registry
            .layer(CommonObjectProvider::pointers())
            .pre_update()
            .new_data()
            .frame_update()
            .object_provider()
            .install();
        let bars = registry
            .layer(CommonObjectProvider::bars())
            .pre_update()
            .new_data()
            .frame_update()
            .object_provider()
            .install();
        let downloaded = registry
            .layer(DownloadedObjectsProvider::new(fetcher))
            .pre_update()
            .new_data()
            .frame_update()
            .object_provider()
            .install();
        let arcs = registry
            .layer(ArcsLayer::new())
            .pre_update()
            .new_data()
            .data_update()
            .frame_update()
            .object_provider()
            .install();

        registry.layer(CirclesLayer).build_object().install();
        registry.layer(PointersLayer).build_object().install();
        registry.layer(BarsLayer).build_object().install();
        registry.layer(DownloadedObjectsLayer).build_object().install();

        let analysis = registry
            .layer(AnalysisModeLayer::new())
            .attach_to_settings()
            .pre_update()
            .new_data()
            .data_update()
            .install();

        registry
            .layer(OpacityLayer::new())
            .attach_to_settings()
            .build_object()
            .update_object_frame()
            .frame_update()
            .install();
        registry
            .layer(LabelLayer::new())
            .build_object()
            .update_object_frame()
            .install();
        registry
            .layer(GlobalZoomLayer::new())
            .attach_to_scene()
            .post_build_object()
            .post_update_object_frame()
            .frame_update()
            .install();

        registry
            .layer(CustomObjectLayerGroup::new())
            .registry_aware()
            .data_update()
            .frame_update()
            .install();

        let state = AppState::new();
        let mut globe = GlobeView::new();
        registry.attach_to_settings(&mut settings);
        registry.attach_to_state(&state);
        registry.attach_to_scene(&config.scene);
        registry.attach_to_globe(&mut globe);

        let mut counter = EventCounter::new(config.counter_interval_ms as f64);
        counter.attach_to_settings(&mut settings);

        info!(
            "Globe runtime ready with {} layers",
            registry.layer_names().len()
        );

        Self {
            context,
            config,
            settings,
            state,
            registry,
            globe,
            ingestor: Ingestor::new(),
            counter,
            layers: DataLayers {
                explosions,
                circles,
                pointers,
                bars,
                downloaded,
                arcs,
                analysis,
            },
            snapshots: None,
        }
    }

    /// Sends a [`RuntimeSnapshot`] on every counter tick.
    pub fn with_snapshot_feed(mut self, tx: Sender<RuntimeSnapshot>) -> Self {
        self.snapshots = Some(tx);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable settings; changes reach subscribed layers on their next tick.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Shared queues; clones can be handed to producers.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn globe(&self) -> &GlobeView {
        &self.globe
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Registered layer names, in dispatch order.
    pub fn layer_names(&self) -> Vec<&str> {
        self.registry.layer_names()
    }

    /// Ingests one raw record at the context's current time.
    pub fn ingest(&mut self, raw: &str) -> Result<Ingested, IngestError> {
        let now = self.context.now_ms();
        self.ingest_at(raw, now)
    }

    /// Ingests one raw record at `now`; rejected records are logged and dropped.
    pub fn ingest_at(&mut self, raw: &str, now: f64) -> Result<Ingested, IngestError> {
        let result = self
            .ingestor
            .ingest(raw, &mut self.settings, &self.state, now);
        if let Err(e) = &result {
            warn!("Dropping record: {}", e);
        }
        result
    }

    /// Pre-update, hand every queued entity to the layers, then publish.
    ///
    /// # Returns
    /// Number of entities drained from the points queue.
    pub fn ingestion_tick(&mut self, now: f64) -> usize {
        self.registry.pre_update(now);
        let points = self.state.new_points.take_all();
        for point in &points {
            self.registry.take_new_point(point);
        }
        self.registry
            .update_data(&mut self.globe, &self.settings, now);
        if !points.is_empty() {
            debug!("Ingestion tick took {} entities", points.len());
        }
        points.len()
    }

    pub fn counter_tick(&mut self, now: f64) {
        self.counter.tick(now, &self.state.new_events);
        if let Some(tx) = &self.snapshots {
            if tx.try_send(self.snapshot(now)).is_err() {
                debug!("Snapshot feed closed or full");
            }
        }
    }

    pub fn render_tick(&mut self, now: f64) {
        self.registry
            .update_frame(&mut self.globe, &self.settings, now);
    }

    /// Counter values to display at `now`.
    pub fn counters(&self, now: f64) -> EventCounterData {
        self.counter.display(now)
    }

    /// Live entities held by each data layer.
    pub fn entity_counts(&self) -> BTreeMap<EntityKind, usize> {
        let layers = &self.layers;
        let arcs = layers.arcs.borrow();
        BTreeMap::from([
            (EntityKind::Explosion, layers.explosions.borrow().data().len()),
            (EntityKind::Circle, layers.circles.borrow().data().len()),
            (EntityKind::Pointer, layers.pointers.borrow().data().len()),
            (EntityKind::Bar, layers.bars.borrow().data().len()),
            (EntityKind::Downloaded, layers.downloaded.borrow().data().len()),
            (EntityKind::Arc, arcs.arcs().len()),
            (EntityKind::ArcLabel, arcs.labels().len()),
            (EntityKind::AnalysisBin, layers.analysis.borrow().samples().len()),
        ])
    }

    /// Image downloads still pending.
    pub fn downloads_in_flight(&self) -> usize {
        self.layers.downloaded.borrow().in_flight()
    }

    pub fn snapshot(&self, now: f64) -> RuntimeSnapshot {
        RuntimeSnapshot {
            timestamp_ms: now,
            counters: self.counters(now),
            entity_counts: self.entity_counts(),
            shown_nodes: self.globe.shown_nodes(),
            arcs: self.globe.arcs.len(),
            hex_bins: self.globe.hex_bins.len(),
        }
    }

    /// Runs the three ticks until `shutdown` fires (or its sender is dropped).
    ///
    /// Raw records pushed onto `inbound` are ingested at the start of each
    /// ingestion tick.
    pub async fn run(&mut self, inbound: InboundQueue<String>, mut shutdown: oneshot::Receiver<()>) {
        let mut ingestion =
            tokio::time::interval(Duration::from_millis(self.config.ingestion_interval_ms));
        let mut counters =
            tokio::time::interval(Duration::from_millis(self.config.counter_interval_ms));
        let mut frames =
            tokio::time::interval(Duration::from_millis(self.config.frame_interval_ms));
        for interval in [&mut ingestion, &mut counters, &mut frames] {
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        info!("Globe runtime running");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ingestion.tick() => {
                    let now = self.context.now_ms();
                    for raw in inbound.take_all() {
                        let _ = self.ingest_at(&raw, now);
                    }
                    self.ingestion_tick(now);
                }
                _ = counters.tick() => {
                    let now = self.context.now_ms();
                    self.counter_tick(now);
                }
                _ = frames.tick() => {
                    let now = self.context.now_ms();
                    self.render_tick(now);
                }
            }
        }
        info!("Globe runtime stopped");
    }
}
