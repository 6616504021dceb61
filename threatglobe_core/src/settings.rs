//! User-tunable settings with change notification.
//!
//! Fields are public for reading. Mutations go through the `set_*` methods,
//! which publish a [`SettingsChanged`] to every subscriber after the value
//! has been stored. Subscribers are crossbeam receivers obtained from
//! [`Settings::subscribe`]; dropped receivers are pruned on the next change.

use crate::color::{Rgba, DEFAULT_CRITICAL_COLOR, QUAD9_COLOR};
use crate::globe_explosion::{
    EXPLOSION_COLOR_DARK, EXPLOSION_COLOR_LIGHT, EXPLOSION_INFLATING_COLOR_DARK,
    EXPLOSION_INFLATING_COLOR_LIGHT,
};
use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

const DEFAULT_DARK_BG: Rgba = Rgba::rgb(0, 0, 0);
const DEFAULT_LIGHT_BG: Rgba = Rgba::rgb(255, 255, 255);

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid settings document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("Unknown layer: {0}")]
    UnknownLayer(i64),
}

/// Notification that one settings field changed.
///
/// `field` is the camelCase field name, `<key>Filter` for filters and
/// `LayerOpacity[<id>]` for layer opacities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChanged {
    pub field: String,
}

impl SettingsChanged {
    /// Whether the change concerns an event filter.
    pub fn is_filter(&self) -> bool {
        self.field.ends_with("Filter")
    }

    /// Whether the change concerns the opacity of a layer or of the globe.
    pub fn is_opacity(&self) -> bool {
        self.field == "globalOpacity" || self.field.starts_with("LayerOpacity[")
    }
}

/// A user-visible opacity group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    /// Opacity in percent (default: 100)
    pub opacity: f64,
}

/// Every setting the engine reads.
///
/// Fields are public so a document or a test can fill them in before the
/// settings are handed to a runtime. Once layers have subscribed, change
/// them only through the `set_*` methods: a plain field write is not
/// broadcast, so listeners such as the counters never see it.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Draw explosion markers (default: true)
    pub enable_event_explosions: bool,
    /// Draw entity labels (default: true)
    pub enable_event_labels: bool,
    /// Follow entity links on click (default: true)
    pub enable_event_click_actions: bool,
    /// Publish explosion heat points (default: false)
    pub enable_heatmaps: bool,
    /// Replace markers by decayed hexagonal bins (default: false)
    pub enable_analysis_mode: bool,
    pub enable_circles: bool,
    pub enable_pointers: bool,
    pub enable_bars: bool,
    pub enable_downloaded_objects: bool,
    pub enable_arcs: bool,
    /// Slowly spin the globe (default: true)
    pub auto_rotate_globe: bool,

    /// Inflate explosions of heavy events (default: true)
    pub enable_counter_scaling: bool,
    /// Inflation factor reached at `maximum_scale_counter` (default: 2.5)
    pub maximum_scale: f64,
    /// Counter at which inflation saturates (default: 20)
    pub maximum_scale_counter: f64,

    /// H3 resolution of analysis bins (default: 3)
    pub analysis_mode_resolution: u8,
    /// Sample lifetime in seconds (default: 60)
    pub analysis_mode_decay: f64,
    pub analysis_mode_start_color: Rgba,
    pub analysis_mode_end_color: Rgba,
    /// Bin weight mapped to the maximum height (default: 10000)
    pub analysis_mode_max_height_count: f64,
    /// Maximum bin height in km (default: 800)
    pub analysis_mode_max_height_kms: f64,

    /// Filter key -> case-insensitive regex
    pub filters: BTreeMap<String, String>,
    /// Opacity of everything, in percent (default: 100)
    pub global_opacity: f64,
    /// Layer id -> opacity group
    pub layers: BTreeMap<i64, LayerConfig>,

    pub show_event_counters: bool,
    pub show_event_counters_total: bool,
    pub show_event_counters_last5m: bool,
    pub show_event_counters_last1m: bool,
    pub show_event_counters_last10s: bool,
    pub counters_title: String,
    pub counters_label: String,

    /// Initial camera zoom in [-10, 10]
    pub startup_zoom: f64,
    pub startup_lat: f64,
    pub startup_lon: f64,

    pub light_mode: bool,
    pub bg_color: Rgba,

    #[serde(skip)]
    subscribers: Vec<Sender<SettingsChanged>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_event_explosions: true,
            enable_event_labels: true,
            enable_event_click_actions: true,
            enable_heatmaps: false,
            enable_analysis_mode: false,
            enable_circles: true,
            enable_pointers: true,
            enable_bars: true,
            enable_downloaded_objects: true,
            enable_arcs: true,
            auto_rotate_globe: true,
            enable_counter_scaling: true,
            maximum_scale: 2.5,
            maximum_scale_counter: 20.0,
            analysis_mode_resolution: 3,
            analysis_mode_decay: 60.0,
            analysis_mode_start_color: QUAD9_COLOR,
            analysis_mode_end_color: DEFAULT_CRITICAL_COLOR,
            analysis_mode_max_height_count: 10000.0,
            analysis_mode_max_height_kms: 800.0,
            filters: BTreeMap::new(),
            global_opacity: 100.0,
            layers: BTreeMap::new(),
            show_event_counters: true,
            show_event_counters_total: true,
            show_event_counters_last5m: true,
            show_event_counters_last1m: true,
            show_event_counters_last10s: true,
            counters_title: "Malicious Lookups Blocked".to_string(),
            counters_label: "Events".to_string(),
            startup_zoom: 0.0,
            startup_lat: 0.0,
            startup_lon: 0.0,
            light_mode: false,
            bg_color: DEFAULT_DARK_BG,
            subscribers: Vec::new(),
        }
    }
}

macro_rules! setters {
    ($($setter:ident => $field:ident: $ty:ty, $name:literal;)*) => {
        impl Settings {
            $(
                pub fn $setter(&mut self, value: $ty) {
                    self.$field = value;
                    self.notify($name);
                }
            )*
        }
    };
}

setters! {
    set_enable_event_explosions => enable_event_explosions: bool, "enableEventExplosions";
    set_enable_event_labels => enable_event_labels: bool, "enableEventLabels";
    set_enable_event_click_actions => enable_event_click_actions: bool, "enableEventClickActions";
    set_enable_heatmaps => enable_heatmaps: bool, "enableHeatmaps";
    set_enable_analysis_mode => enable_analysis_mode: bool, "enableAnalysisMode";
    set_enable_circles => enable_circles: bool, "enableCircles";
    set_enable_pointers => enable_pointers: bool, "enablePointers";
    set_enable_bars => enable_bars: bool, "enableBars";
    set_enable_downloaded_objects => enable_downloaded_objects: bool, "enableDownloadedObjects";
    set_enable_arcs => enable_arcs: bool, "enableArcs";
    set_auto_rotate_globe => auto_rotate_globe: bool, "autoRotateGlobe";
    set_enable_counter_scaling => enable_counter_scaling: bool, "enableCounterScaling";
    set_maximum_scale => maximum_scale: f64, "maximumScale";
    set_maximum_scale_counter => maximum_scale_counter: f64, "maximumScaleCounter";
    set_analysis_mode_resolution => analysis_mode_resolution: u8, "analysisModeResolution";
    set_analysis_mode_decay => analysis_mode_decay: f64, "analysisModeDecay";
    set_analysis_mode_start_color => analysis_mode_start_color: Rgba, "analysisModeStartColor";
    set_analysis_mode_end_color => analysis_mode_end_color: Rgba, "analysisModeEndColor";
    set_analysis_mode_max_height_count => analysis_mode_max_height_count: f64, "analysisModeMaxHeightCount";
    set_analysis_mode_max_height_kms => analysis_mode_max_height_kms: f64, "analysisModeMaxHeightKms";
    set_global_opacity => global_opacity: f64, "globalOpacity";
    set_show_event_counters => show_event_counters: bool, "showEventCounters";
    set_counters_title => counters_title: String, "countersTitle";
    set_counters_label => counters_label: String, "countersLabel";
    set_startup_zoom => startup_zoom: f64, "startupZoom";
    set_bg_color => bg_color: Rgba, "bgColor";
}

impl Settings {
    /// Loads settings from a JSON document; missing keys take their default.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Registers a change listener.
    pub fn subscribe(&mut self) -> Receiver<SettingsChanged> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Publishes a change of `field` to every live subscriber.
    pub fn notify(&mut self, field: &str) {
        debug!("settings changed: {}", field);
        let event = SettingsChanged {
            field: field.to_string(),
        };
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Switches light mode, flipping the background if it is still a default.
    pub fn set_light_mode(&mut self, value: bool) {
        if value && self.bg_color == DEFAULT_DARK_BG {
            self.bg_color = DEFAULT_LIGHT_BG;
        } else if !value && self.bg_color == DEFAULT_LIGHT_BG {
            self.bg_color = DEFAULT_DARK_BG;
        }
        self.light_mode = value;
        self.notify("lightMode");
    }

    /// Sets the filter regex of `key`; emits `<key>Filter`.
    pub fn set_filter(&mut self, key: &str, value: &str) {
        self.filters.insert(key.to_string(), value.to_string());
        self.notify(&format!("{}Filter", key));
    }

    /// Sets the opacity of a registered layer; emits `LayerOpacity[<id>]`.
    pub fn set_layer_opacity(&mut self, id: i64, opacity: f64) -> Result<(), SettingsError> {
        let layer = self
            .layers
            .get_mut(&id)
            .ok_or(SettingsError::UnknownLayer(id))?;
        layer.opacity = opacity;
        self.notify(&format!("LayerOpacity[{}]", id));
        Ok(())
    }

    /// Adds an opacity group at 100%.
    ///
    /// A group that is still named after its numeric id is renamed when a
    /// name arrives later.
    ///
    /// # Returns
    /// `true` if the layer was not known before.
    pub fn register_layer(&mut self, id: i64, name: Option<&str>) -> bool {
        if let Some(existing) = self.layers.get_mut(&id) {
            if let Some(name) = name {
                if existing.name == id.to_string() {
                    existing.name = name.to_string();
                }
            }
            return false;
        }
        self.layers.insert(
            id,
            LayerConfig {
                name: name.map(str::to_string).unwrap_or_else(|| id.to_string()),
                opacity: 100.0,
            },
        );
        true
    }

    /// Opacity of the group `id` in percent; 100 for unknown or absent groups.
    pub fn layer_opacity(&self, id: Option<i64>) -> f64 {
        id.and_then(|id| self.layers.get(&id))
            .map(|layer| layer.opacity)
            .unwrap_or(100.0)
    }

    /// Keeps exactly the filters named in `keys`, adding empty ones as needed.
    pub fn update_filter_keys(&mut self, keys: &[String]) {
        self.filters.retain(|key, _| keys.contains(key));
        for key in keys {
            self.filters.entry(key.clone()).or_default();
        }
    }

    /// Explosion `(inflating, deflated)` colors for the current theme.
    pub fn explosion_colors(&self) -> (Rgba, Rgba) {
        if self.light_mode {
            (EXPLOSION_INFLATING_COLOR_LIGHT, EXPLOSION_COLOR_LIGHT)
        } else {
            (EXPLOSION_INFLATING_COLOR_DARK, EXPLOSION_COLOR_DARK)
        }
    }

    /// Analysis-mode sample lifetime in ms.
    pub fn analysis_decay_ms(&self) -> f64 {
        self.analysis_mode_decay * 1000.0
    }
}
