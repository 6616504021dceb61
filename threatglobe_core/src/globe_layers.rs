//! Scene-wide layers: the custom-object group and the passes that run over
//! every custom object (opacity, labels, zoom compensation), plus the camera
//! and rotation drivers.
//!
//! ```text
//!   update_data                         update_frame
//!   ───────────                         ────────────
//!   providers ──▶ objects               objects.update(now)
//!      new id?  ──▶ build ─▶ post_build     visible? ──▶ update ─▶ post_update
//!      gone id? ──▶ drop node               hidden?  ──▶ node.visible = false
//! ```

use crate::globe_entities::Entity;
use crate::globe_lifecycle::{EntityId, PointData};
use crate::globe_registry::{
    DataUpdateHook, FrameUpdateHook, GlobeAttachHook, GlobeLayer, LayerCapabilities, ObjectBuildHook,
    ObjectFrame, ObjectPostBuildHook, ObjectPostUpdateHook, ObjectProvider, ObjectUpdateHook,
    RegistryHook, SceneAttachHook, SettingsHook, Shared, StateHook,
};
use crate::globe_view::{
    wrap_longitude, CameraPosition, GlobeView, LabelState, Scene, SceneNode,
    MAX_CAMERA_DISTANCE, MIN_CAMERA_DISTANCE,
};
use crate::settings::{Settings, SettingsChanged};
use crate::state::AppState;
use crossbeam::channel::Receiver;
use nalgebra::Vector3;
use std::collections::HashSet;
use std::f64::consts::FRAC_PI_2;
use std::rc::Rc;
use threatglobe_env::InboundQueue;
use tracing::debug;

// ============================================================================
// CUSTOM OBJECT GROUP
// ============================================================================

/// Collects objects from every provider and drives the object hooks.
///
/// Nodes are keyed by entity id: an object keeps its node for as long as a
/// provider keeps returning it.
#[derive(Default)]
pub struct CustomObjectLayerGroup {
    objects: Vec<Entity>,
    providers: Vec<Shared<dyn ObjectProvider>>,
    build_hooks: Vec<Shared<dyn ObjectBuildHook>>,
    post_build_hooks: Vec<Shared<dyn ObjectPostBuildHook>>,
    update_hooks: Vec<Shared<dyn ObjectUpdateHook>>,
    post_update_hooks: Vec<Shared<dyn ObjectPostUpdateHook>>,
}

impl CustomObjectLayerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self) -> &[Entity] {
        &self.objects
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

impl GlobeLayer for CustomObjectLayerGroup {
    fn layer_name(&self) -> &str {
        "CustomObjects"
    }
}

impl RegistryHook for CustomObjectLayerGroup {
    fn new_layer_added(&mut self, layer: &LayerCapabilities) {
        if let Some(hook) = &layer.build {
            self.build_hooks.push(Rc::clone(hook));
        }
        if let Some(hook) = &layer.post_build {
            self.post_build_hooks.push(Rc::clone(hook));
        }
        if let Some(hook) = &layer.update {
            self.update_hooks.push(Rc::clone(hook));
        }
        if let Some(hook) = &layer.post_update {
            self.post_update_hooks.push(Rc::clone(hook));
        }
        if let Some(provider) = &layer.provider {
            self.providers.push(Rc::clone(provider));
        }
    }
}

impl DataUpdateHook for CustomObjectLayerGroup {
    fn update_data(&mut self, globe: &mut GlobeView, settings: &Settings, now: f64) {
        self.objects = self
            .providers
            .iter()
            .flat_map(|provider| provider.borrow().current_objects(settings))
            .collect();

        let frame = ObjectFrame {
            settings,
            camera: globe.camera,
            now,
        };
        let mut live: HashSet<EntityId> = HashSet::with_capacity(self.objects.len());
        for object in &self.objects {
            let id = object.id();
            live.insert(id);
            if globe.nodes.contains_key(&id) {
                continue;
            }

            let mut node = SceneNode::for_object(object);
            for hook in &self.build_hooks {
                hook.borrow_mut().build_object(&mut node, object, &frame);
            }
            for hook in &self.post_build_hooks {
                hook.borrow_mut().post_build_object(&mut node, object, &frame);
            }
            globe.nodes.insert(id, node);
        }

        let before = globe.nodes.len();
        globe.nodes.retain(|id, _| live.contains(id));
        let dropped = before - globe.nodes.len();
        if dropped > 0 {
            debug!("Dropped {} custom object nodes", dropped);
        }
    }
}

impl FrameUpdateHook for CustomObjectLayerGroup {
    fn update_frame(&mut self, globe: &mut GlobeView, settings: &Settings, now: f64) {
        let frame = ObjectFrame {
            settings,
            camera: globe.camera,
            now,
        };
        for object in self.objects.iter_mut() {
            let _ = object.update(now);
            let Some(node) = globe.nodes.get_mut(&object.id()) else {
                continue;
            };

            if !object.visible() {
                node.visible = false;
                continue;
            }
            if !node.do_not_show {
                node.visible = true;
            }

            for hook in &self.update_hooks {
                hook.borrow_mut().update_object_frame(node, object, &frame);
            }
            for hook in &self.post_update_hooks {
                hook.borrow_mut().post_update_object_frame(node, object, &frame);
            }
        }
    }
}

// ============================================================================
// DIRTY FLAG
// ============================================================================

/// A flag that clears itself a fixed number of frames after the last `set`.
///
/// [`DirtyFlag::update_frame`] must be called once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyFlag {
    dirty: bool,
    frames_until_clean: u32,
    frames_to_clean: u32,
}

impl Default for DirtyFlag {
    fn default() -> Self {
        Self::new(1)
    }
}

impl DirtyFlag {
    pub fn new(frames_to_clean: u32) -> Self {
        Self {
            dirty: false,
            frames_until_clean: 0,
            frames_to_clean,
        }
    }

    pub fn update_frame(&mut self) {
        if self.dirty && self.frames_until_clean == 0 {
            self.dirty = false;
        } else if self.frames_until_clean > 0 {
            self.frames_until_clean -= 1;
        }
    }

    pub fn is_set(&self) -> bool {
        self.dirty
    }

    pub fn set(&mut self) {
        self.dirty = true;
        self.frames_until_clean += self.frames_to_clean;
    }
}

// ============================================================================
// OPACITY
// ============================================================================

/// Applies record, layer and global opacity plus the lifetime fade.
///
/// Recomputed on build, and on update only while an opacity setting changed
/// recently or the object is fading.
#[derive(Default)]
pub struct OpacityLayer {
    dirty: DirtyFlag,
    changes: Option<Receiver<SettingsChanged>>,
}

impl OpacityLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object opacity in percent; zero or below hides the object.
    pub fn object_opacity<P: PointData + ?Sized>(object: &P, settings: &Settings) -> f64 {
        let layer = &object.common().layer;
        let mut neg = 0.0;
        if layer.layer_id.is_some() {
            neg = 100.0 - settings.layer_opacity(layer.layer_id);
        }
        neg += 100.0 - settings.global_opacity;

        let mut opacity = layer.opacity.unwrap_or(100.0) - neg;
        if let Some(fade) = object.fade_factor() {
            opacity *= fade;
        }
        opacity
    }

    fn apply(node: &mut SceneNode, object: &Entity, settings: &Settings) {
        let opacity = Self::object_opacity(object, settings);
        if opacity <= 0.0 {
            node.visible = false;
            node.do_not_show = true;
            return;
        }
        node.do_not_show = false;
        node.opacity = opacity / 100.0;
        node.transparent = opacity < 100.0;
    }
}

impl GlobeLayer for OpacityLayer {
    fn layer_name(&self) -> &str {
        "Opacity"
    }
}

impl SettingsHook for OpacityLayer {
    fn attach_to_settings(&mut self, settings: &mut Settings) {
        self.changes = Some(settings.subscribe());
    }
}

impl ObjectBuildHook for OpacityLayer {
    fn build_object(&mut self, node: &mut SceneNode, object: &Entity, frame: &ObjectFrame<'_>) {
        Self::apply(node, object, frame.settings);
    }
}

impl ObjectUpdateHook for OpacityLayer {
    fn update_object_frame(
        &mut self,
        node: &mut SceneNode,
        object: &Entity,
        frame: &ObjectFrame<'_>,
    ) {
        if !self.dirty.is_set() && object.fade_factor().is_none() {
            return;
        }
        Self::apply(node, object, frame.settings);
    }
}

impl FrameUpdateHook for OpacityLayer {
    fn update_frame(&mut self, _globe: &mut GlobeView, _settings: &Settings, _now: f64) {
        if let Some(changes) = &self.changes {
            if changes.try_iter().any(|change| change.is_opacity()) {
                self.dirty.set();
            }
        }
        self.dirty.update_frame();
    }
}

// ============================================================================
// LABELS
// ============================================================================

/// Attaches text labels to objects carrying display text.
#[derive(Debug, Default)]
pub struct LabelLayer;

impl LabelLayer {
    pub fn new() -> Self {
        Self
    }

    fn label_visible(hover_only: bool, settings: &Settings) -> bool {
        settings.enable_event_labels && !(hover_only && settings.enable_event_click_actions)
    }
}

impl GlobeLayer for LabelLayer {
    fn layer_name(&self) -> &str {
        "Labeled"
    }
}

impl ObjectBuildHook for LabelLayer {
    fn build_object(&mut self, node: &mut SceneNode, object: &Entity, frame: &ObjectFrame<'_>) {
        let spec = &object.common().label;
        let Some(text) = spec.text.as_deref().filter(|t| !t.is_empty()) else {
            return;
        };

        let hover_only = spec.hover_only.unwrap_or(false);
        let face_camera = object.label_face_camera();
        let lift = if object.face_camera() || face_camera { 1.1 } else { 0.1 };
        node.label = Some(LabelState {
            text: text.to_string(),
            visible: Self::label_visible(hover_only, frame.settings),
            scale: object.label_scale(),
            offset: Vector3::new(0.0, 0.0, lift) + object.label_offset(),
            face_camera,
            hover_only,
        });
    }
}

impl ObjectUpdateHook for LabelLayer {
    fn update_object_frame(
        &mut self,
        node: &mut SceneNode,
        object: &Entity,
        frame: &ObjectFrame<'_>,
    ) {
        if node.label.is_none() {
            return;
        }
        if object.label_expired() {
            node.label = None;
            return;
        }
        if let Some(label) = node.label.as_mut() {
            label.scale = object.label_scale();
            label.visible = Self::label_visible(label.hover_only, frame.settings);
        }
    }
}

// ============================================================================
// GLOBAL ZOOM
// ============================================================================

/// Keeps `ignore_zoom` objects at a constant on-screen size.
#[derive(Debug)]
pub struct GlobalZoomLayer {
    fov: f64,
    dirty: DirtyFlag,
    last_zoom_factor: Option<f64>,
}

impl Default for GlobalZoomLayer {
    fn default() -> Self {
        Self {
            fov: Scene::default().fov,
            dirty: DirtyFlag::default(),
            last_zoom_factor: None,
        }
    }
}

impl GlobalZoomLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Multiplier that cancels the camera's perspective shrink at `distance`.
    pub fn zoom_compensation(distance: f64, fov_degrees: f64) -> f64 {
        let distance = distance.clamp(MIN_CAMERA_DISTANCE, MAX_CAMERA_DISTANCE);
        let camera_factor = (distance - MIN_CAMERA_DISTANCE + 1.0)
            / (MAX_CAMERA_DISTANCE - MIN_CAMERA_DISTANCE + 1.0);
        let scale_factor =
            1.0 / (1.0 + 2.0 * (camera_factor / (FRAC_PI_2 - fov_degrees.to_radians() / 2.0).tan()));
        (1.0 - scale_factor) * 10.0
    }

    fn scale_to_camera(&self, node: &mut SceneNode, object: &Entity, frame: &ObjectFrame<'_>) {
        let base = if object.apply_global_scale() {
            1.0
        } else {
            object.scale()
        };
        let by = Self::zoom_compensation(frame.camera.distance, self.fov);
        let z = if object.scale_z() { by } else { 1.0 };
        node.scale = Vector3::new(base * by, base * by, base * z);
    }

    fn ignores_zoom(object: &Entity) -> bool {
        object.common().scaling.ignore_zoom.unwrap_or(false)
    }
}

impl GlobeLayer for GlobalZoomLayer {
    fn layer_name(&self) -> &str {
        "GlobalZoom"
    }
}

impl SceneAttachHook for GlobalZoomLayer {
    fn attach_to_scene(&mut self, scene: &Scene) {
        self.fov = scene.fov;
    }
}

impl ObjectPostBuildHook for GlobalZoomLayer {
    fn post_build_object(&mut self, node: &mut SceneNode, object: &Entity, frame: &ObjectFrame<'_>) {
        if Self::ignores_zoom(object) {
            self.scale_to_camera(node, object, frame);
        }
    }
}

impl ObjectPostUpdateHook for GlobalZoomLayer {
    fn post_update_object_frame(
        &mut self,
        node: &mut SceneNode,
        object: &Entity,
        frame: &ObjectFrame<'_>,
    ) {
        if self.dirty.is_set() && Self::ignores_zoom(object) {
            self.scale_to_camera(node, object, frame);
        }
    }
}

impl FrameUpdateHook for GlobalZoomLayer {
    fn update_frame(&mut self, globe: &mut GlobeView, _settings: &Settings, _now: f64) {
        self.dirty.update_frame();
        let zoom_factor = globe.camera.zoom_factor();
        if self.last_zoom_factor != Some(zoom_factor) {
            self.dirty.set();
            self.last_zoom_factor = Some(zoom_factor);
        }
    }
}

// ============================================================================
// CAMERA COMMANDS
// ============================================================================

const ZOOM_SPEED_PER_MS: f64 = 5.0 / 1000.0;
const LAT_SPEED_PER_MS: f64 = 45.0 / 1000.0;
const LON_SPEED_PER_MS: f64 = 90.0 / 1000.0;

/// Moves `from` toward `to` by at most `by`, snapping once within reach.
///
/// `inverse` walks the other way round, for longitudes on opposite signs.
///
/// # Returns
/// The new value and whether the target was reached.
pub fn move_by(from: f64, to: f64, by: f64, inverse: bool) -> (f64, bool) {
    if (to - from).abs() < by {
        (to, true)
    } else {
        let direction = if inverse { -1.0 } else { 1.0 };
        (from + (to - from).signum() * direction * by, false)
    }
}

/// Consumes queued camera moves one at a time.
///
/// Instant moves jump; the others glide at fixed angular and zoom speeds,
/// scaled by the command's speed multiplier. On globe attach the camera is
/// placed at the configured startup position.
#[derive(Debug, Default)]
pub struct CameraCommandLayer {
    queue: InboundQueue<CameraPosition>,
    target: Option<CameraPosition>,
    last_frame: f64,
    startup: Option<CameraPosition>,
}

impl CameraCommandLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self) -> Option<&CameraPosition> {
        self.target.as_ref()
    }

    fn glide(&mut self, globe: &mut GlobeView, target: CameraPosition, now: f64) {
        let delta = now - self.last_frame;
        self.last_frame = now;
        let speed = target.speed.unwrap_or(1.0);
        let camera = globe.camera;

        let (zoom, zoom_done) = match target.zoom {
            Some(to) => {
                let (zoom, done) = move_by(camera.zoom(), to, delta * ZOOM_SPEED_PER_MS * speed, false);
                (Some(zoom), done)
            }
            None => (None, true),
        };
        let (lat, lat_done) = move_by(camera.lat, target.lat, delta * LAT_SPEED_PER_MS * speed, false);
        let (lon, lon_done) = move_by(
            camera.lon,
            target.lon,
            delta * LON_SPEED_PER_MS * speed,
            target.lon.signum() != camera.lon.signum(),
        );

        globe.jump_camera(&CameraPosition {
            lat,
            lon: wrap_longitude(lon),
            zoom,
            speed: None,
            instant_move: true,
        });

        if zoom_done && lat_done && lon_done {
            debug!("Camera reached {:.2}, {:.2}", target.lat, target.lon);
            self.target = None;
        }
    }
}

impl GlobeLayer for CameraCommandLayer {
    fn layer_name(&self) -> &str {
        "NewCameraPositions"
    }
}

impl SettingsHook for CameraCommandLayer {
    fn attach_to_settings(&mut self, settings: &mut Settings) {
        self.startup = Some(
            CameraPosition {
                lat: settings.startup_lat,
                lon: settings.startup_lon,
                zoom: Some(settings.startup_zoom),
                speed: None,
                instant_move: true,
            }
            .normalize(),
        );
    }
}

impl GlobeAttachHook for CameraCommandLayer {
    fn attach_to_globe(&mut self, globe: &mut GlobeView) {
        if let Some(startup) = &self.startup {
            globe.jump_camera(startup);
        }
    }
}

impl StateHook for CameraCommandLayer {
    fn attach_to_state(&mut self, state: &AppState) {
        self.queue = state.new_camera_positions.clone();
    }
}

impl FrameUpdateHook for CameraCommandLayer {
    fn update_frame(&mut self, globe: &mut GlobeView, _settings: &Settings, now: f64) {
        if let Some(target) = self.target {
            self.glide(globe, target, now);
        } else if let Some(next) = self.queue.pop_front() {
            if next.instant_move {
                globe.jump_camera(&next);
            } else {
                self.target = Some(next);
                self.last_frame = now;
            }
        }
    }
}

// ============================================================================
// ROTATION
// ============================================================================

/// Spins the globe while auto-rotation is on; slower when zoomed in.
///
/// Advances per frame, so the speed follows the frame rate.
#[derive(Debug, Default)]
pub struct RotationLayer;

impl GlobeLayer for RotationLayer {
    fn layer_name(&self) -> &str {
        "Rotation"
    }
}

impl FrameUpdateHook for RotationLayer {
    fn update_frame(&mut self, globe: &mut GlobeView, settings: &Settings, _now: f64) {
        if settings.auto_rotate_globe {
            globe.rotation_y += 0.001 / (10.0 * globe.camera.zoom_factor());
        }
    }
}
