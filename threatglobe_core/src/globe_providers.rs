//! Per-type providers: layers that own one sorted collection of one entity type.
//!
//! ```text
//!   registry.take_new_point(entity)
//!        │
//!        ├─▶ CommonObjectProvider<CircleData>   position-keyed, replace
//!        ├─▶ CommonObjectProvider<PointerData>  position-keyed, replace
//!        ├─▶ CommonObjectProvider<BarData>      position-keyed, replace
//!        ├─▶ DownloadedObjectsProvider          fetch first, insert on success
//!        ├─▶ ExplosionDataGroup                 jitter, time-left ordered
//!        └─▶ ArcsLayer                          arc + derived label, time-left ordered
//! ```

use crate::color::QUAD9_COLOR;
use crate::globe_entities::{
    ArcData, ArcLabel, BarData, CircleData, DownloadedData, Entity, EntityVariant, PointerData,
};
use crate::globe_explosion::ExplosionData;
use crate::globe_lifecycle::PointData;
use crate::globe_registry::{
    DataUpdateHook, ExplosionSubLayer, FrameUpdateHook, GlobeLayer, LayerCapabilities,
    NewDataHook, ObjectProvider, PreUpdateHook, RegistryHook, Shared,
};
use crate::globe_sorted::{
    binary_search_replace, compare_positions, compare_time_left, map_and_filter,
    update_for_frame, FilterOptions, InsertOptions, InsertOutcome,
};
use crate::globe_view::{ArcDescriptor, GlobeView};
use crate::settings::Settings;
use std::rc::Rc;
use std::sync::Arc;
use threatglobe_env::{EnvError, GlobeContext, ImageBitmap, ImageFetcher, InboundQueue};
use tracing::{debug, error};

// ============================================================================
// COMMON PROVIDER
// ============================================================================

/// Owns the sorted collection of one entity variant.
///
/// Entities at the same position (within 0.001 degrees) replace each other.
pub struct CommonObjectProvider<T> {
    name: &'static str,
    data: Vec<T>,
    enabled: fn(&Settings) -> bool,
}

impl<T: EntityVariant> CommonObjectProvider<T> {
    /// # Arguments
    /// * `name` - Layer name
    /// * `enabled` - Reads the setting that toggles this type
    pub fn new(name: &'static str, enabled: fn(&Settings) -> bool) -> Self {
        Self {
            name,
            data: Vec::new(),
            enabled,
        }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn insert(&mut self, item: T) -> InsertOutcome {
        binary_search_replace(&mut self.data, item, compare_positions, InsertOptions::default())
    }

    pub fn layer_enabled(&self, settings: &Settings) -> bool {
        (self.enabled)(settings)
    }
}

impl CommonObjectProvider<CircleData> {
    pub fn circles() -> Self {
        Self::new("Circles", |s| s.enable_circles)
    }
}

impl CommonObjectProvider<PointerData> {
    pub fn pointers() -> Self {
        Self::new("Pointers", |s| s.enable_pointers)
    }
}

impl CommonObjectProvider<BarData> {
    pub fn bars() -> Self {
        Self::new("Bars", |s| s.enable_bars)
    }
}

impl<T: EntityVariant> GlobeLayer for CommonObjectProvider<T> {
    fn layer_name(&self) -> &str {
        self.name
    }
}

impl<T: EntityVariant> PreUpdateHook for CommonObjectProvider<T> {
    fn pre_update(&mut self, now: f64) {
        map_and_filter(&mut self.data, now, FilterOptions::default());
    }
}

impl<T: EntityVariant> NewDataHook for CommonObjectProvider<T> {
    fn should_take_point(&self, point: &Entity) -> bool {
        point.kind() == T::KIND
    }

    fn take_new_point(&mut self, point: Entity) {
        if let Some(item) = T::from_entity(point) {
            self.insert(item);
        }
    }
}

impl<T: EntityVariant> FrameUpdateHook for CommonObjectProvider<T> {
    fn update_frame(&mut self, _globe: &mut GlobeView, _settings: &Settings, now: f64) {
        update_for_frame(&mut self.data, now);
    }
}

impl<T: EntityVariant> ObjectProvider for CommonObjectProvider<T> {
    fn current_objects(&self, settings: &Settings) -> Vec<Entity> {
        if self.layer_enabled(settings) {
            self.data.iter().cloned().map(EntityVariant::into_entity).collect()
        } else {
            Vec::new()
        }
    }
}

// ============================================================================
// DOWNLOADED OBJECTS
// ============================================================================

type ImageCompletion = (DownloadedData, Result<ImageBitmap, EnvError>);

/// Provider for image billboards.
///
/// Taking a point starts the image download and returns at once. Finished
/// downloads are collected at the next pre-update: successes are inserted,
/// failures logged and dropped.
pub struct DownloadedObjectsProvider {
    inner: CommonObjectProvider<DownloadedData>,
    fetcher: Arc<dyn ImageFetcher>,
    completions: InboundQueue<ImageCompletion>,
    in_flight: usize,
}

impl DownloadedObjectsProvider {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            inner: CommonObjectProvider::new("DownloadedObjectsProvider", |s| {
                s.enable_downloaded_objects
            }),
            fetcher,
            completions: InboundQueue::new(),
            in_flight: 0,
        }
    }

    pub fn data(&self) -> &[DownloadedData] {
        self.inner.data()
    }

    /// Downloads started but not yet collected.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn collect_completions(&mut self, now: f64) {
        for (mut object, result) in self.completions.take_all() {
            self.in_flight = self.in_flight.saturating_sub(1);
            match result {
                Ok(image) => {
                    object.image = Some(image);
                    if object.update(now).is_alive() {
                        self.inner.insert(object);
                    } else {
                        debug!("Downloaded object {} expired before its image arrived", object.id());
                    }
                }
                Err(e) => {
                    error!("Downloaded object load error: {}", e);
                }
            }
        }
    }
}

impl GlobeLayer for DownloadedObjectsProvider {
    fn layer_name(&self) -> &str {
        self.inner.layer_name()
    }
}

impl PreUpdateHook for DownloadedObjectsProvider {
    fn pre_update(&mut self, now: f64) {
        self.inner.pre_update(now);
        self.collect_completions(now);
    }
}

impl NewDataHook for DownloadedObjectsProvider {
    fn should_take_point(&self, point: &Entity) -> bool {
        self.inner.should_take_point(point)
    }

    fn take_new_point(&mut self, point: Entity) {
        let Some(object) = DownloadedData::from_entity(point) else {
            return;
        };
        let url = object.url().to_string();
        let completions = self.completions.clone();
        self.in_flight += 1;
        self.fetcher.fetch(
            &url,
            Box::new(move |result| completions.push((object, result))),
        );
    }
}

impl FrameUpdateHook for DownloadedObjectsProvider {
    fn update_frame(&mut self, globe: &mut GlobeView, settings: &Settings, now: f64) {
        self.inner.update_frame(globe, settings, now);
    }
}

impl ObjectProvider for DownloadedObjectsProvider {
    fn current_objects(&self, settings: &Settings) -> Vec<Entity> {
        self.inner.current_objects(settings)
    }
}

// ============================================================================
// EXPLOSIONS
// ============================================================================

/// Owns every explosion and shares it with the explosion sub-layers.
///
/// Explosions are jittered on take, so position replacement makes no sense;
/// they are ordered by time left instead, which lets compaction stop at the
/// first expired one.
pub struct ExplosionDataGroup {
    data: Vec<ExplosionData>,
    sub_layers: Vec<Shared<dyn ExplosionSubLayer>>,
    context: Arc<dyn GlobeContext>,
}

impl ExplosionDataGroup {
    /// # Arguments
    /// * `context` - Source of the location and spawn-time jitter
    pub fn new(context: Arc<dyn GlobeContext>) -> Self {
        Self {
            data: Vec::new(),
            sub_layers: Vec::new(),
            context,
        }
    }

    pub fn data(&self) -> &[ExplosionData] {
        &self.data
    }

    pub fn sub_layer_count(&self) -> usize {
        self.sub_layers.len()
    }
}

impl GlobeLayer for ExplosionDataGroup {
    fn layer_name(&self) -> &str {
        "ExplosionDataGroup"
    }
}

impl RegistryHook for ExplosionDataGroup {
    fn new_layer_added(&mut self, layer: &LayerCapabilities) {
        if let Some(sub_layer) = &layer.explosion_sub_layer {
            self.sub_layers.push(Rc::clone(sub_layer));
        }
    }
}

impl PreUpdateHook for ExplosionDataGroup {
    fn pre_update(&mut self, now: f64) {
        map_and_filter(
            &mut self.data,
            now,
            FilterOptions {
                sorted_by_lifetime: true,
            },
        );
    }
}

impl NewDataHook for ExplosionDataGroup {
    fn should_take_point(&self, point: &Entity) -> bool {
        matches!(point, Entity::Explosion(_))
    }

    fn take_new_point(&mut self, point: Entity) {
        let Some(mut explosion) = ExplosionData::from_entity(point) else {
            return;
        };
        explosion.randomize_location(self.context.random_unit(), self.context.random_unit());
        explosion.randomize_spawn_time(self.context.random_unit());
        binary_search_replace(
            &mut self.data,
            explosion,
            compare_time_left,
            InsertOptions::no_replace(),
        );
    }
}

impl DataUpdateHook for ExplosionDataGroup {
    fn update_data(&mut self, globe: &mut GlobeView, settings: &Settings, now: f64) {
        for sub_layer in &self.sub_layers {
            sub_layer
                .borrow_mut()
                .update_explosion_data(globe, settings, &self.data, now);
        }
    }
}

impl FrameUpdateHook for ExplosionDataGroup {
    fn update_frame(&mut self, _globe: &mut GlobeView, _settings: &Settings, now: f64) {
        update_for_frame(&mut self.data, now);
    }
}

impl ObjectProvider for ExplosionDataGroup {
    fn current_objects(&self, settings: &Settings) -> Vec<Entity> {
        let needs_custom_objects = self
            .sub_layers
            .iter()
            .any(|layer| layer.borrow().needs_custom_objects(settings));
        if needs_custom_objects {
            self.data.iter().cloned().map(Entity::Explosion).collect()
        } else {
            Vec::new()
        }
    }
}

// ============================================================================
// ARCS
// ============================================================================

/// Owns arcs and their labels.
///
/// Arcs are drawn as globe-native arc descriptors; their labels are handed
/// to the custom-object group.
#[derive(Default)]
pub struct ArcsLayer {
    arcs: Vec<ArcData>,
    labels: Vec<ArcLabel>,
}

impl ArcsLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arcs(&self) -> &[ArcData] {
        &self.arcs
    }

    pub fn labels(&self) -> &[ArcLabel] {
        &self.labels
    }

    fn publish(&self, globe: &mut GlobeView) {
        globe.arcs = self.arcs.iter().map(describe_arc).collect();
    }
}

fn describe_arc(arc: &ArcData) -> ArcDescriptor {
    let line = arc.custom.line_type.unwrap_or_default();
    ArcDescriptor {
        id: arc.id(),
        start_lat: arc.lat(),
        start_lon: arc.lon(),
        end_lat: arc.custom.point2_lat,
        end_lon: arc.custom.point2_lon,
        paint: arc.paint(QUAD9_COLOR),
        altitude: arc.altitude(),
        dash_length: line.dash_length(),
        dash_gap: line.dash_gap(),
        dash_animate_time: arc.dash_animate_time(),
        stroke: arc.custom.line_width,
    }
}

impl GlobeLayer for ArcsLayer {
    fn layer_name(&self) -> &str {
        "Arcs"
    }
}

impl PreUpdateHook for ArcsLayer {
    fn pre_update(&mut self, now: f64) {
        let opts = FilterOptions {
            sorted_by_lifetime: true,
        };
        map_and_filter(&mut self.arcs, now, opts);
        map_and_filter(&mut self.labels, now, opts);
    }
}

impl NewDataHook for ArcsLayer {
    fn should_take_point(&self, point: &Entity) -> bool {
        matches!(point, Entity::Arc(_))
    }

    fn take_new_point(&mut self, point: Entity) {
        let Some(arc) = ArcData::from_entity(point) else {
            return;
        };
        let label = arc.produce_label();
        binary_search_replace(&mut self.arcs, arc, compare_time_left, InsertOptions::no_replace());
        binary_search_replace(
            &mut self.labels,
            label,
            compare_time_left,
            InsertOptions::no_replace(),
        );
    }
}

impl DataUpdateHook for ArcsLayer {
    fn update_data(&mut self, globe: &mut GlobeView, settings: &Settings, _now: f64) {
        if settings.enable_arcs {
            self.publish(globe);
        } else {
            globe.arcs.clear();
        }
    }
}

impl FrameUpdateHook for ArcsLayer {
    fn update_frame(&mut self, globe: &mut GlobeView, settings: &Settings, now: f64) {
        if settings.enable_arcs {
            update_for_frame(&mut self.arcs, now);
            update_for_frame(&mut self.labels, now);
            self.publish(globe);
        }
    }
}

impl ObjectProvider for ArcsLayer {
    fn current_objects(&self, settings: &Settings) -> Vec<Entity> {
        if settings.enable_arcs {
            self.labels.iter().cloned().map(Entity::ArcLabel).collect()
        } else {
            Vec::new()
        }
    }
}
