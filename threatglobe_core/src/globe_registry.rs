//! The Layer Hook Registry - routes lifecycle calls to independent layers.
//!
//! A layer opts into any subset of nine capabilities, each a trait:
//!
//! | Capability            | Trait             | Called                          |
//! |-----------------------|-------------------|---------------------------------|
//! | globe-attach          | [`GlobeAttachHook`] | once, with the globe model     |
//! | scene-attach          | [`SceneAttachHook`] | once, with the camera/viewport |
//! | settings-attach       | [`SettingsHook`]    | once, to subscribe to changes  |
//! | state-attach          | [`StateHook`]       | once, with the shared queues   |
//! | pre-update            | [`PreUpdateHook`]   | every ingestion tick, first    |
//! | new-data              | [`NewDataHook`]     | per inbound entity             |
//! | data-update           | [`DataUpdateHook`]  | every ingestion tick, last     |
//! | frame-update          | [`FrameUpdateHook`] | every rendered frame           |
//! | registry-notification | [`RegistryHook`]    | per registered layer           |
//!
//! Layers are registered through a builder whose per-hook methods only
//! compile when the layer implements the matching trait:
//!
//! ```ignore
//! let arcs = registry
//!     .layer(ArcsLayer::new())
//!     .pre_update()
//!     .new_data()
//!     .data_update()
//!     .frame_update()
//!     .object_provider()
//!     .install();
//! ```
//!
//! Every hook list is dispatched in registration order.
//!
//! Registry-aware layers also see the custom-object capabilities of their
//! peers (providers, build and update hooks, explosion sub-layers) through
//! the [`LayerCapabilities`] record they are notified with.

use crate::globe_entities::Entity;
use crate::globe_explosion::ExplosionData;
use crate::globe_lifecycle::PointData;
use crate::globe_view::{CameraState, GlobeView, Scene, SceneNode};
use crate::settings::Settings;
use crate::state::AppState;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info};

/// A layer shared between the registry and its peers.
pub type Shared<T> = Rc<RefCell<T>>;

// ============================================================================
// GLOBE HOOKS
// ============================================================================

/// Marker for every layer.
pub trait GlobeLayer {
    fn layer_name(&self) -> &str;
}

pub trait GlobeAttachHook: GlobeLayer {
    /// Runs basic setup against the globe.
    fn attach_to_globe(&mut self, globe: &mut GlobeView);
}

pub trait SceneAttachHook: GlobeLayer {
    fn attach_to_scene(&mut self, scene: &Scene);
}

pub trait SettingsHook: GlobeLayer {
    /// Reads initial values and subscribes to changes.
    fn attach_to_settings(&mut self, settings: &mut Settings);
}

pub trait StateHook: GlobeLayer {
    fn attach_to_state(&mut self, state: &AppState);
}

pub trait PreUpdateHook: GlobeLayer {
    /// Updates and cleans up old data before new data is passed in.
    fn pre_update(&mut self, now: f64);
}

pub trait NewDataHook: GlobeLayer {
    /// Acceptance test. The layer must not keep `point`.
    fn should_take_point(&self, point: &Entity) -> bool;

    /// Hands over an owned copy of an accepted entity.
    fn take_new_point(&mut self, point: Entity);
}

pub trait DataUpdateHook: GlobeLayer {
    /// Publishes the data taken during this ingestion tick.
    fn update_data(&mut self, globe: &mut GlobeView, settings: &Settings, now: f64);
}

pub trait FrameUpdateHook: GlobeLayer {
    fn update_frame(&mut self, globe: &mut GlobeView, settings: &Settings, now: f64);
}

pub trait RegistryHook: GlobeLayer {
    /// Called for every layer added after this one, for this layer itself and,
    /// on registration, for every layer added before it.
    ///
    /// Implementations may clone the handles in `layer` but must not borrow
    /// them: the described layer can be this very layer.
    fn new_layer_added(&mut self, layer: &LayerCapabilities);
}

// ============================================================================
// CUSTOM OBJECT HOOKS
// ============================================================================

/// Per-frame context handed to custom-object hooks.
#[derive(Debug, Clone, Copy)]
pub struct ObjectFrame<'a> {
    pub settings: &'a Settings,
    pub camera: CameraState,
    pub now: f64,
}

/// Supplies entities drawn as custom objects.
pub trait ObjectProvider: GlobeLayer {
    /// Copies of every object that should currently be drawn.
    fn current_objects(&self, settings: &Settings) -> Vec<Entity>;
}

/// Adds geometry to a freshly created node.
pub trait ObjectBuildHook: GlobeLayer {
    fn build_object(&mut self, node: &mut SceneNode, object: &Entity, frame: &ObjectFrame<'_>);
}

/// Runs once every build hook has run.
pub trait ObjectPostBuildHook: GlobeLayer {
    fn post_build_object(&mut self, node: &mut SceneNode, object: &Entity, frame: &ObjectFrame<'_>);
}

/// Updates a visible node each frame. Every layer sees every object.
pub trait ObjectUpdateHook: GlobeLayer {
    fn update_object_frame(
        &mut self,
        node: &mut SceneNode,
        object: &Entity,
        frame: &ObjectFrame<'_>,
    );
}

/// Runs once every update hook has run.
pub trait ObjectPostUpdateHook: GlobeLayer {
    fn post_update_object_frame(
        &mut self,
        node: &mut SceneNode,
        object: &Entity,
        frame: &ObjectFrame<'_>,
    );
}

/// A layer reading explosions without owning their lifetime.
pub trait ExplosionSubLayer: GlobeLayer {
    /// Receives every explosion held by the explosion group.
    fn update_explosion_data(
        &mut self,
        globe: &mut GlobeView,
        settings: &Settings,
        data: &[ExplosionData],
        now: f64,
    );

    /// Whether explosions must also be drawn as custom objects.
    fn needs_custom_objects(&self, settings: &Settings) -> bool;
}

/// What a registered layer offers to registry-aware peers.
#[derive(Clone, Default)]
pub struct LayerCapabilities {
    pub name: String,
    pub provider: Option<Shared<dyn ObjectProvider>>,
    pub build: Option<Shared<dyn ObjectBuildHook>>,
    pub post_build: Option<Shared<dyn ObjectPostBuildHook>>,
    pub update: Option<Shared<dyn ObjectUpdateHook>>,
    pub post_update: Option<Shared<dyn ObjectPostUpdateHook>>,
    pub explosion_sub_layer: Option<Shared<dyn ExplosionSubLayer>>,
}

impl std::fmt::Debug for LayerCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerCapabilities")
            .field("name", &self.name)
            .field("provider", &self.provider.is_some())
            .field("build", &self.build.is_some())
            .field("post_build", &self.post_build.is_some())
            .field("update", &self.update.is_some())
            .field("post_update", &self.post_update.is_some())
            .field("explosion_sub_layer", &self.explosion_sub_layer.is_some())
            .finish()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Main registry for globe layers.
#[derive(Default)]
pub struct GlobeLayerRegistry {
    attach_hooks: Vec<Shared<dyn GlobeAttachHook>>,
    scene_hooks: Vec<Shared<dyn SceneAttachHook>>,
    settings_hooks: Vec<Shared<dyn SettingsHook>>,
    state_hooks: Vec<Shared<dyn StateHook>>,
    pre_update_hooks: Vec<Shared<dyn PreUpdateHook>>,
    new_data_hooks: Vec<Shared<dyn NewDataHook>>,
    data_update_hooks: Vec<Shared<dyn DataUpdateHook>>,
    frame_update_hooks: Vec<Shared<dyn FrameUpdateHook>>,
    registry_hooks: Vec<Shared<dyn RegistryHook>>,
    all_layers: Vec<LayerCapabilities>,
}

impl GlobeLayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts registering `layer`; pick its hooks, then call `install`.
    pub fn layer<L: GlobeLayer + 'static>(&mut self, layer: L) -> LayerBuilder<'_, L> {
        self.layer_shared(Rc::new(RefCell::new(layer)))
    }

    /// Like [`layer`](Self::layer), for a layer the caller already shares.
    pub fn layer_shared<L: GlobeLayer + 'static>(
        &mut self,
        layer: Shared<L>,
    ) -> LayerBuilder<'_, L> {
        let name = layer.borrow().layer_name().to_string();
        LayerBuilder {
            registry: self,
            layer,
            hooks: PendingHooks::default(),
            caps: LayerCapabilities {
                name,
                ..Default::default()
            },
        }
    }

    fn register(&mut self, hooks: PendingHooks, caps: LayerCapabilities) {
        self.attach_hooks.extend(hooks.attach);
        self.scene_hooks.extend(hooks.scene);
        self.settings_hooks.extend(hooks.settings);
        self.state_hooks.extend(hooks.state);
        self.pre_update_hooks.extend(hooks.pre_update);
        self.new_data_hooks.extend(hooks.new_data);
        self.data_update_hooks.extend(hooks.data_update);
        self.frame_update_hooks.extend(hooks.frame_update);

        if let Some(hook) = &hooks.registry {
            self.registry_hooks.push(Rc::clone(hook));
        }
        for hook in &self.registry_hooks {
            hook.borrow_mut().new_layer_added(&caps);
        }
        if let Some(hook) = &hooks.registry {
            let mut newcomer = hook.borrow_mut();
            for existing in &self.all_layers {
                newcomer.new_layer_added(existing);
            }
        }

        info!("Registered layer {}", caps.name);
        self.all_layers.push(caps);
    }

    /// Names of every registered layer, in registration order.
    pub fn layer_names(&self) -> Vec<&str> {
        self.all_layers.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn attach_to_globe(&self, globe: &mut GlobeView) {
        for hook in &self.attach_hooks {
            hook.borrow_mut().attach_to_globe(globe);
        }
    }

    pub fn attach_to_scene(&self, scene: &Scene) {
        for hook in &self.scene_hooks {
            hook.borrow_mut().attach_to_scene(scene);
        }
    }

    pub fn attach_to_settings(&self, settings: &mut Settings) {
        for hook in &self.settings_hooks {
            hook.borrow_mut().attach_to_settings(settings);
        }
    }

    pub fn attach_to_state(&self, state: &AppState) {
        for hook in &self.state_hooks {
            hook.borrow_mut().attach_to_state(state);
        }
    }

    pub fn pre_update(&self, now: f64) {
        for hook in &self.pre_update_hooks {
            hook.borrow_mut().pre_update(now);
        }
    }

    /// Offers `point` to every new-data layer; each acceptor gets its own copy.
    ///
    /// # Returns
    /// Number of layers that took the point.
    pub fn take_new_point(&self, point: &Entity) -> usize {
        let mut takers = 0;
        for hook in &self.new_data_hooks {
            let mut layer = hook.borrow_mut();
            if layer.should_take_point(point) {
                layer.take_new_point(point.clone());
                takers += 1;
            }
        }
        if takers == 0 {
            debug!("No layer took {} {}", point.kind(), point.id());
        }
        takers
    }

    pub fn update_data(&self, globe: &mut GlobeView, settings: &Settings, now: f64) {
        for hook in &self.data_update_hooks {
            hook.borrow_mut().update_data(globe, settings, now);
        }
    }

    pub fn update_frame(&self, globe: &mut GlobeView, settings: &Settings, now: f64) {
        for hook in &self.frame_update_hooks {
            hook.borrow_mut().update_frame(globe, settings, now);
        }
    }
}

#[derive(Default)]
struct PendingHooks {
    attach: Option<Shared<dyn GlobeAttachHook>>,
    scene: Option<Shared<dyn SceneAttachHook>>,
    settings: Option<Shared<dyn SettingsHook>>,
    state: Option<Shared<dyn StateHook>>,
    pre_update: Option<Shared<dyn PreUpdateHook>>,
    new_data: Option<Shared<dyn NewDataHook>>,
    data_update: Option<Shared<dyn DataUpdateHook>>,
    frame_update: Option<Shared<dyn FrameUpdateHook>>,
    registry: Option<Shared<dyn RegistryHook>>,
}

/// Collects the capabilities of one layer before it is installed.
pub struct LayerBuilder<'r, L: GlobeLayer + 'static> {
    registry: &'r mut GlobeLayerRegistry,
    layer: Shared<L>,
    hooks: PendingHooks,
    caps: LayerCapabilities,
}

impl<'r, L: GlobeLayer + 'static> LayerBuilder<'r, L> {
    pub fn attach_to_globe(mut self) -> Self
    where
        L: GlobeAttachHook,
    {
        let hook: Shared<dyn GlobeAttachHook> = self.layer.clone();
        self.hooks.attach = Some(hook);
        self
    }

    pub fn attach_to_scene(mut self) -> Self
    where
        L: SceneAttachHook,
    {
        let hook: Shared<dyn SceneAttachHook> = self.layer.clone();
        self.hooks.scene = Some(hook);
        self
    }

    pub fn attach_to_settings(mut self) -> Self
    where
        L: SettingsHook,
    {
        let hook: Shared<dyn SettingsHook> = self.layer.clone();
        self.hooks.settings = Some(hook);
        self
    }

    pub fn attach_to_state(mut self) -> Self
    where
        L: StateHook,
    {
        let hook: Shared<dyn StateHook> = self.layer.clone();
        self.hooks.state = Some(hook);
        self
    }

    pub fn pre_update(mut self) -> Self
    where
        L: PreUpdateHook,
    {
        let hook: Shared<dyn PreUpdateHook> = self.layer.clone();
        self.hooks.pre_update = Some(hook);
        self
    }

    pub fn new_data(mut self) -> Self
    where
        L: NewDataHook,
    {
        let hook: Shared<dyn NewDataHook> = self.layer.clone();
        self.hooks.new_data = Some(hook);
        self
    }

    pub fn data_update(mut self) -> Self
    where
        L: DataUpdateHook,
    {
        let hook: Shared<dyn DataUpdateHook> = self.layer.clone();
        self.hooks.data_update = Some(hook);
        self
    }

    pub fn frame_update(mut self) -> Self
    where
        L: FrameUpdateHook,
    {
        let hook: Shared<dyn FrameUpdateHook> = self.layer.clone();
        self.hooks.frame_update = Some(hook);
        self
    }

    pub fn registry_aware(mut self) -> Self
    where
        L: RegistryHook,
    {
        let hook: Shared<dyn RegistryHook> = self.layer.clone();
        self.hooks.registry = Some(hook);
        self
    }

    pub fn object_provider(mut self) -> Self
    where
        L: ObjectProvider,
    {
        let hook: Shared<dyn ObjectProvider> = self.layer.clone();
        self.caps.provider = Some(hook);
        self
    }

    pub fn build_object(mut self) -> Self
    where
        L: ObjectBuildHook,
    {
        let hook: Shared<dyn ObjectBuildHook> = self.layer.clone();
        self.caps.build = Some(hook);
        self
    }

    pub fn post_build_object(mut self) -> Self
    where
        L: ObjectPostBuildHook,
    {
        let hook: Shared<dyn ObjectPostBuildHook> = self.layer.clone();
        self.caps.post_build = Some(hook);
        self
    }

    pub fn update_object_frame(mut self) -> Self
    where
        L: ObjectUpdateHook,
    {
        let hook: Shared<dyn ObjectUpdateHook> = self.layer.clone();
        self.caps.update = Some(hook);
        self
    }

    pub fn post_update_object_frame(mut self) -> Self
    where
        L: ObjectPostUpdateHook,
    {
        let hook: Shared<dyn ObjectPostUpdateHook> = self.layer.clone();
        self.caps.post_update = Some(hook);
        self
    }

    pub fn explosion_sub_layer(mut self) -> Self
    where
        L: ExplosionSubLayer,
    {
        let hook: Shared<dyn ExplosionSubLayer> = self.layer.clone();
        self.caps.explosion_sub_layer = Some(hook);
        self
    }

    /// Registers the layer and notifies registry-aware layers.
    ///
    /// # Returns
    /// The shared handle, for callers that want to inspect the layer later.
    pub fn install(self) -> Shared<L> {
        let LayerBuilder {
            registry,
            layer,
            hooks,
            caps,
        } = self;
        registry.register(hooks, caps);
        layer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globe_entities::CircleData;
    use crate::globe_lifecycle::CommonFields;

    #[derive(Default)]
    struct Watcher {
        name: &'static str,
        seen: Vec<String>,
    }

    impl GlobeLayer for Watcher {
        fn layer_name(&self) -> &str {
            self.name
        }
    }

    impl RegistryHook for Watcher {
        fn new_layer_added(&mut self, layer: &LayerCapabilities) {
            self.seen.push(layer.name.clone());
        }
    }

    struct Plain(&'static str);

    impl GlobeLayer for Plain {
        fn layer_name(&self) -> &str {
            self.0
        }
    }

    struct Taker {
        accept: bool,
        taken: usize,
        order: Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
    }

    impl GlobeLayer for Taker {
        fn layer_name(&self) -> &str {
            self.name
        }
    }

    impl NewDataHook for Taker {
        fn should_take_point(&self, _point: &Entity) -> bool {
            self.accept
        }
        fn take_new_point(&mut self, _point: Entity) {
            self.taken += 1;
        }
    }

    impl PreUpdateHook for Taker {
        fn pre_update(&mut self, _now: f64) {
            self.order.borrow_mut().push(self.name);
        }
    }

    #[test]
    fn test_registry_aware_notification_order() {
        let mut registry = GlobeLayerRegistry::new();
        let a = registry
            .layer(Watcher {
                name: "A",
                ..Default::default()
            })
            .registry_aware()
            .install();
        let b = registry
            .layer(Watcher {
                name: "B",
                ..Default::default()
            })
            .registry_aware()
            .install();
        registry.layer(Plain("C")).install();

        // A: itself, then each later layer
        assert_eq!(a.borrow().seen, vec!["A", "B", "C"]);
        // B: itself, then retroactively A, then C
        assert_eq!(b.borrow().seen, vec!["B", "A", "C"]);
        assert_eq!(registry.layer_names(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_plain_layer_is_not_notified() {
        let mut registry = GlobeLayerRegistry::new();
        registry.layer(Plain("first")).install();
        let w = registry
            .layer(Watcher {
                name: "late",
                ..Default::default()
            })
            .registry_aware()
            .install();
        assert_eq!(w.borrow().seen, vec!["late", "first"]);
    }

    #[test]
    fn test_take_new_point_clones_per_acceptor() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut registry = GlobeLayerRegistry::new();
        let mk = |name, accept| Taker {
            accept,
            taken: 0,
            order: order.clone(),
            name,
        };
        let yes1 = registry.layer(mk("yes1", true)).new_data().pre_update().install();
        let no = registry.layer(mk("no", false)).new_data().pre_update().install();
        let yes2 = registry.layer(mk("yes2", true)).new_data().pre_update().install();

        let point: Entity =
            CircleData::new(CommonFields::default(), Default::default(), 0.0).into();
        assert_eq!(registry.take_new_point(&point), 2);
        assert_eq!(yes1.borrow().taken, 1);
        assert_eq!(no.borrow().taken, 0);
        assert_eq!(yes2.borrow().taken, 1);

        registry.pre_update(0.0);
        assert_eq!(*order.borrow(), vec!["yes1", "no", "yes2"]);
    }
}
