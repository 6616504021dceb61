//! The Entity Lifecycle Model - shared temporal state machine of every globe entity.
//!
//! Every visual entity (explosion, circle, pointer, bar, downloaded image,
//! arc, arc label, analysis sample) carries the same clock:
//!
//! ```text
//!   startTime                                      startTime + total_lifetime
//!       │                                                    │
//!  ─────┼────────────────────────────────────────────────────┼──────────▶ now
//!  lifetime < 0       0 ≤ lifetime ≤ total_lifetime            lifetime > total
//!  (scheduled,        (visible)                  ▲             (expired,
//!   invisible)                                   │              removed)
//!                                     last fade_duration ms:
//!                                     fade factor 1 → 0
//! ```
//!
//! `lifetime` is recomputed from `now` on every `update`, which makes
//! updating idempotent for a given `now` and lets clones taken at different
//! times agree with each other.
//!
//! Presentation metadata (labels, links, layers, zoom scaling, hover text) is
//! attached by composition through small capability structs rather than
//! inherited.

use crate::color::Rgba;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Radius of the globe in world units.
pub const DEFAULT_GLOBE_RADIUS: f64 = 100.0;

/// Kilometres per world unit (Earth radius / globe radius).
pub const UNIT_KMS: f64 = 6371.0 / DEFAULT_GLOBE_RADIUS;

/// Degrees of latitude per kilometre.
pub const KM_TO_LATITUDE: f64 = 0.00902;

/// Degrees of longitude per kilometre (at the equator).
pub const KM_TO_LONGITUDE: f64 = 0.00898;

// ============================================================================
// IDENTITY & KIND
// ============================================================================

/// Stable identity of an entity. Clones keep the id of their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Creates a new random EntityId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Discriminant of the entity union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Explosion,
    Circle,
    Pointer,
    Bar,
    Downloaded,
    Arc,
    ArcLabel,
    AnalysisBin,
}

impl EntityKind {
    /// Returns every kind, in declaration order.
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Explosion,
            EntityKind::Circle,
            EntityKind::Pointer,
            EntityKind::Bar,
            EntityKind::Downloaded,
            EntityKind::Arc,
            EntityKind::ArcLabel,
            EntityKind::AnalysisBin,
        ]
    }

    /// Short name used in logs and exports.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Explosion => "explosion",
            EntityKind::Circle => "circle",
            EntityKind::Pointer => "pointer",
            EntityKind::Bar => "bar",
            EntityKind::Downloaded => "downloaded",
            EntityKind::Arc => "arc",
            EntityKind::ArcLabel => "arc_label",
            EntityKind::AnalysisBin => "analysis_bin",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of advancing an entity's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Liveness {
    /// Still within its lifetime (possibly not yet visible).
    Alive,
    /// Past its lifetime; the owning collection must drop it.
    Expired,
}

impl Liveness {
    pub fn is_alive(self) -> bool {
        self == Liveness::Alive
    }
}

// ============================================================================
// LIFECYCLE CLOCK
// ============================================================================

/// Per-entity clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lifecycle {
    /// Creation timestamp in ms; may lie in the future for delayed appearance
    pub start_time: f64,

    /// Elapsed ms since `start_time` at the last update (negative while scheduled)
    pub lifetime: f64,

    /// Total lifetime in ms (may be infinite)
    pub total_lifetime: f64,

    /// Length of the closing fade in ms (0 = no fade)
    pub fade_duration: f64,
}

impl Lifecycle {
    /// Creates a clock started at `start_time`, observed at `now`.
    ///
    /// # Arguments
    /// * `start_time` - When the entity should appear (ms)
    /// * `now` - Current time (ms); `lifetime = now - start_time`
    /// * `total_lifetime` - `None` means the entity never expires
    /// * `fade_duration` - `None` means no fade
    pub fn new(
        start_time: f64,
        now: f64,
        total_lifetime: Option<f64>,
        fade_duration: Option<f64>,
    ) -> Self {
        Self {
            start_time,
            lifetime: now - start_time,
            total_lifetime: total_lifetime.unwrap_or(f64::INFINITY),
            fade_duration: fade_duration.unwrap_or(0.0),
        }
    }

    /// Creates a clock starting right now.
    pub fn starting_now(now: f64, total_lifetime: Option<f64>, fade_duration: Option<f64>) -> Self {
        Self::new(now, now, total_lifetime, fade_duration)
    }

    /// `lifetime / total_lifetime`. Negative while scheduled, above 1 once expired.
    pub fn fraction(&self) -> f64 {
        self.lifetime / self.total_lifetime
    }

    pub fn expired(&self) -> bool {
        self.lifetime > self.total_lifetime
    }

    /// Visible iff `fraction >= 0` and not expired.
    pub fn visible(&self) -> bool {
        self.fraction() >= 0.0 && !self.expired()
    }

    pub fn time_left(&self) -> f64 {
        self.total_lifetime - self.lifetime
    }

    /// Linear ramp 1 → 0 over the last `fade_duration` ms of life.
    ///
    /// # Returns
    /// `None` when fading is disabled or the entity is not yet in its fade window.
    pub fn fade_factor(&self) -> Option<f64> {
        let left = self.time_left();
        if self.fade_duration == 0.0 || left > self.fade_duration {
            return None;
        }
        Some((left / self.fade_duration).max(0.0))
    }

    /// Recomputes `lifetime` from `now`.
    pub fn advance(&mut self, now: f64) -> Liveness {
        self.lifetime = now - self.start_time;
        if self.expired() {
            Liveness::Expired
        } else {
            Liveness::Alive
        }
    }

    /// Postpones appearance by `delay_ms` without touching the total lifetime.
    pub fn postpone(&mut self, delay_ms: f64) {
        self.start_time += delay_ms;
        self.lifetime -= delay_ms;
    }
}

// ============================================================================
// CAPABILITY STRUCTS
// ============================================================================

/// Optional text label drawn next to an entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSpec {
    /// Text to display (no label when absent)
    pub text: Option<String>,
    /// How long the label stays visible (ms); as long as the entity when absent
    pub interval: Option<f64>,
    pub font: Option<String>,
    /// Font size in pixels
    pub font_size: Option<f64>,
    /// "bold", "italic" or a combination
    pub font_style: Option<String>,
    pub color: Option<Rgba>,
    pub outline_color: Option<Rgba>,
    pub always_faces_viewer: Option<bool>,
    /// Only show while the pointer hovers the entity
    pub hover_only: Option<bool>,
}

/// Click-through link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkSpec {
    pub url: Option<String>,
    pub new_window: Option<bool>,
}

/// Opacity and user-visible layer grouping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerSpec {
    /// Opacity in percent, 0..=100
    pub opacity: Option<f64>,
    pub layer_id: Option<i64>,
    pub layer_name: Option<String>,
}

/// Zoom behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleSpec {
    /// Keep a constant on-screen size regardless of camera distance
    pub ignore_zoom: Option<bool>,
}

/// Hover popup text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoverSpec {
    pub text: Option<String>,
}

// ============================================================================
// COMMON DATA
// ============================================================================

/// Fields shared by every inbound event record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonFields {
    pub lat: f64,
    pub lon: f64,
    /// Total lifetime in ms
    pub ttl: Option<f64>,
    pub fade_duration: Option<f64>,
    /// Postpones the entity's appearance by this many ms
    pub draw_delay: Option<f64>,
    pub always_faces_viewer: Option<bool>,
    /// Event weight, may be fractional
    pub counter: Option<f64>,
    /// Whether the event contributes to the aggregate counters
    pub counter_include: Option<bool>,
    pub label: LabelSpec,
    pub link: LinkSpec,
    pub layer: LayerSpec,
    pub scaling: ScaleSpec,
    pub hover: HoverSpec,
}

/// State carried by every entity variant.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonData {
    pub id: EntityId,
    pub lat: f64,
    pub lon: f64,
    pub life: Lifecycle,
    pub always_faces_viewer: bool,
    pub counter: Option<f64>,
    pub counter_include: Option<bool>,
    pub label: LabelSpec,
    pub link: LinkSpec,
    pub layer: LayerSpec,
    pub scaling: ScaleSpec,
    pub hover: HoverSpec,
}

impl CommonData {
    /// Builds the shared state from inbound fields.
    ///
    /// # Arguments
    /// * `fields` - Parsed shared fields
    /// * `default_ttl` - Lifetime used when the record has no `ttl` (`None` = infinite)
    /// * `now` - Current time (ms); the entity starts at `now + draw_delay`
    pub fn from_fields(fields: CommonFields, default_ttl: Option<f64>, now: f64) -> Self {
        let start = now + fields.draw_delay.unwrap_or(0.0).max(0.0);
        Self {
            id: EntityId::new(),
            lat: fields.lat,
            lon: fields.lon,
            life: Lifecycle::new(start, now, fields.ttl.or(default_ttl), fields.fade_duration),
            always_faces_viewer: fields.always_faces_viewer.unwrap_or(false),
            counter: fields.counter,
            counter_include: fields.counter_include,
            label: fields.label,
            link: fields.link,
            layer: fields.layer,
            scaling: fields.scaling,
            hover: fields.hover,
        }
    }

    /// Minimal entity at a location, used by tests and synthetic sources.
    pub fn at(lat: f64, lon: f64, ttl: Option<f64>, now: f64) -> Self {
        Self::from_fields(
            CommonFields {
                lat,
                lon,
                ttl,
                ..Default::default()
            },
            None,
            now,
        )
    }

    /// Event weight, 1 when absent.
    pub fn weight(&self) -> f64 {
        self.counter.unwrap_or(1.0)
    }
}

// ============================================================================
// POINT DATA CONTRACT
// ============================================================================

/// The contract every entity variant fulfils.
///
/// Variants override the presentation methods; the lifecycle methods have
/// defaults driven by [`Lifecycle`].
pub trait PointData {
    fn common(&self) -> &CommonData;
    fn common_mut(&mut self) -> &mut CommonData;
    fn kind(&self) -> EntityKind;

    fn id(&self) -> EntityId {
        self.common().id
    }
    fn lat(&self) -> f64 {
        self.common().lat
    }
    fn lon(&self) -> f64 {
        self.common().lon
    }
    fn lifecycle(&self) -> &Lifecycle {
        &self.common().life
    }

    /// Advances the clock to `now`.
    fn update(&mut self, now: f64) -> Liveness {
        self.common_mut().life.advance(now)
    }
    fn visible(&self) -> bool {
        self.lifecycle().visible()
    }
    fn expired(&self) -> bool {
        self.lifecycle().expired()
    }
    fn time_left(&self) -> f64 {
        self.lifecycle().time_left()
    }
    fn fade_factor(&self) -> Option<f64> {
        self.lifecycle().fade_factor()
    }

    /// Relative size of the entity.
    fn scale(&self) -> f64 {
        1.0
    }
    /// Relative size of the label.
    fn label_scale(&self) -> f64 {
        1.0
    }
    /// Offset from the entity center to the label anchor.
    fn label_offset(&self) -> Vector3<f64> {
        Vector3::zeros()
    }
    /// Height above the globe surface in world units.
    fn height_offset(&self) -> f64 {
        0.0
    }
    fn face_camera(&self) -> bool {
        self.common().always_faces_viewer
    }
    /// Whether scaling also applies along the surface normal.
    fn scale_z(&self) -> bool {
        false
    }
    /// Whether camera-distance scaling replaces the entity's own scale.
    fn apply_global_scale(&self) -> bool {
        true
    }
    /// Whether `scale()` changes over time.
    fn variable_scale(&self) -> bool {
        false
    }
    fn label_expired(&self) -> bool {
        self.lifecycle().lifetime > self.common().label.interval.unwrap_or(f64::INFINITY)
    }
    fn label_face_camera(&self) -> bool {
        self.common().label.always_faces_viewer.unwrap_or(false)
    }
}

/// Linear interpolation.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
