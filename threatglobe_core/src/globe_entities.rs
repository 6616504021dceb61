//! Entity variants and the `Entity` union.
//!
//! Every consumer dispatches on the [`Entity`] tag in one place instead of
//! probing concrete types. Variant-specific behavior lives on the variant
//! structs; [`Entity`] forwards the [`PointData`] contract to them.

use crate::color::Rgba;
use crate::globe_explosion::ExplosionData;
use crate::globe_lifecycle::{
    CommonData, CommonFields, EntityKind, Lifecycle, Liveness, PointData, DEFAULT_GLOBE_RADIUS,
    UNIT_KMS,
};
use geo::{HaversineDistance, HaversineIntermediate, Point};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use threatglobe_env::ImageBitmap;

/// Default arc lifetime (ms).
pub const DEFAULT_ARC_LIFETIME: f64 = 5000.0;

/// Default time for an arc to draw itself (ms).
pub const DEFAULT_ARC_DRAW_DURATION: f64 = 200.0;

/// Altitude scale applied to arcs without an explicit maximum height.
pub const ARC_ALTITUDE_AUTO_SCALE: f64 = 0.5;

/// Dash animation period for animated arcs (ms).
pub const ARC_DASH_ANIMATE_TIME: f64 = 10000.0;

// ============================================================================
// CIRCLE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircleCustomization {
    pub radius: Option<f64>,
    pub color: Option<Rgba>,
    pub outline_color: Option<Rgba>,
    pub outline_thickness: Option<f64>,
}

/// A flat circle with a static radius.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleData {
    pub common: CommonData,
    pub custom: CircleCustomization,
}

impl CircleData {
    pub fn new(fields: CommonFields, custom: CircleCustomization, now: f64) -> Self {
        Self {
            common: CommonData::from_fields(fields, None, now),
            custom,
        }
    }
}

impl PointData for CircleData {
    fn common(&self) -> &CommonData {
        &self.common
    }
    fn common_mut(&mut self) -> &mut CommonData {
        &mut self.common
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Circle
    }
    fn scale(&self) -> f64 {
        self.custom.radius.unwrap_or(1.0)
    }
}

// ============================================================================
// POINTER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointerCustomization {
    pub background_color: Option<Rgba>,
    pub border_color: Option<Rgba>,
    pub scale: Option<f64>,
    pub glyph_color: Option<Rgba>,
}

/// A map pin; its label sits above the apex.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerData {
    pub common: CommonData,
    pub custom: PointerCustomization,
}

impl PointerData {
    pub fn new(fields: CommonFields, custom: PointerCustomization, now: f64) -> Self {
        Self {
            common: CommonData::from_fields(fields, None, now),
            custom,
        }
    }
}

impl PointData for PointerData {
    fn common(&self) -> &CommonData {
        &self.common
    }
    fn common_mut(&mut self) -> &mut CommonData {
        &mut self.common
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Pointer
    }
    fn scale(&self) -> f64 {
        self.custom.scale.unwrap_or(1.0)
    }
    fn label_offset(&self) -> Vector3<f64> {
        Vector3::new(0.0, 3.5 * self.scale(), 0.0)
    }
    fn label_scale(&self) -> f64 {
        // Label grows with the pointer
        self.scale()
    }
}

// ============================================================================
// BAR
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarCustomization {
    /// Height in km (required on the wire)
    pub height: f64,
    pub diameter: Option<f64>,
    pub bottom_color: Option<Rgba>,
    pub top_color: Option<Rgba>,
}

/// A vertical bar standing on the globe.
#[derive(Debug, Clone, PartialEq)]
pub struct BarData {
    pub common: CommonData,
    pub custom: BarCustomization,
}

impl BarData {
    pub fn new(fields: CommonFields, custom: BarCustomization, now: f64) -> Self {
        Self {
            common: CommonData::from_fields(fields, None, now),
            custom,
        }
    }
}

impl PointData for BarData {
    fn common(&self) -> &CommonData {
        &self.common
    }
    fn common_mut(&mut self) -> &mut CommonData {
        &mut self.common
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Bar
    }
    fn label_offset(&self) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, self.custom.height / UNIT_KMS)
    }
    fn face_camera(&self) -> bool {
        // Bars always stand perpendicular to the surface
        false
    }
    fn scale_z(&self) -> bool {
        true
    }
}

// ============================================================================
// DOWNLOADED IMAGE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadedCustomization {
    pub url: String,
    pub scale: Option<f64>,
}

/// An image billboard. Stays invisible until its bitmap arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedData {
    pub common: CommonData,
    pub custom: DownloadedCustomization,
    pub image: Option<ImageBitmap>,
}

impl DownloadedData {
    pub fn new(fields: CommonFields, custom: DownloadedCustomization, now: f64) -> Self {
        Self {
            common: CommonData::from_fields(fields, None, now),
            custom,
            image: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.custom.url
    }
}

impl PointData for DownloadedData {
    fn common(&self) -> &CommonData {
        &self.common
    }
    fn common_mut(&mut self) -> &mut CommonData {
        &mut self.common
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Downloaded
    }
    fn visible(&self) -> bool {
        self.image.is_some() && self.common.life.visible()
    }
    fn scale(&self) -> f64 {
        self.custom.scale.unwrap_or(1.0)
    }
    fn label_scale(&self) -> f64 {
        self.scale()
    }
}

// ============================================================================
// ARC + LABEL
// ============================================================================

/// Stroke style of an arc.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcLineType {
    #[default]
    Solid,
    DashedLarge,
    DashedSmall,
    Dots,
}

impl ArcLineType {
    /// Dash length as a fraction of the arc.
    pub fn dash_length(self) -> f64 {
        match self {
            ArcLineType::Dots => 0.0025,
            ArcLineType::DashedSmall => 0.05,
            ArcLineType::DashedLarge => 0.1,
            ArcLineType::Solid => 1.0,
        }
    }

    /// Gap length as a fraction of the arc.
    pub fn dash_gap(self) -> f64 {
        match self {
            ArcLineType::Dots => 0.01,
            ArcLineType::DashedSmall => 0.025,
            ArcLineType::DashedLarge => 0.05,
            ArcLineType::Solid => 0.0,
        }
    }
}

impl std::str::FromStr for ArcLineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solid" => Ok(ArcLineType::Solid),
            "dashed_large" => Ok(ArcLineType::DashedLarge),
            "dashed_small" => Ok(ArcLineType::DashedSmall),
            "dots" => Ok(ArcLineType::Dots),
            other => Err(format!("unknown arc line type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArcCustomization {
    pub point2_lat: f64,
    pub point2_lon: f64,
    pub color: Option<Rgba>,
    pub line_type: Option<ArcLineType>,
    pub line_width: Option<f64>,
    pub animated: Option<bool>,
    /// Time for the arc to draw in and to erase out (ms)
    pub draw_duration: Option<f64>,
    /// Apex height in km
    pub max_height: Option<f64>,
}

impl ArcCustomization {
    pub fn draw_duration(&self) -> f64 {
        self.draw_duration.unwrap_or(DEFAULT_ARC_DRAW_DURATION)
    }
}

/// How an arc is colored along its length `t` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArcPaint {
    Transparent,
    Solid(Rgba),
    /// Drawing in: colored on `[0, until)`, transparent from `until` on
    DrawIn { color: Rgba, until: f64 },
    /// Erasing out: transparent on `[0, from)`, colored from `from` on
    EraseOut { color: Rgba, from: f64 },
}

impl ArcPaint {
    /// Color at position `t` along the arc.
    pub fn color_at(&self, t: f64) -> Rgba {
        match *self {
            ArcPaint::Transparent => Rgba::TRANSPARENT,
            ArcPaint::Solid(color) => color,
            ArcPaint::DrawIn { color, until } => {
                if t < until {
                    color
                } else {
                    Rgba::TRANSPARENT
                }
            }
            ArcPaint::EraseOut { color, from } => {
                if t < from {
                    Rgba::TRANSPARENT
                } else {
                    color
                }
            }
        }
    }
}

/// A great-circle arc between two points.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcData {
    pub common: CommonData,
    pub custom: ArcCustomization,
}

impl ArcData {
    pub fn new(fields: CommonFields, custom: ArcCustomization, now: f64) -> Self {
        Self {
            common: CommonData::from_fields(fields, Some(DEFAULT_ARC_LIFETIME), now),
            custom,
        }
    }

    /// Paint for the current lifetime, given the fallback color.
    pub fn paint(&self, default_color: Rgba) -> ArcPaint {
        if !self.visible() {
            return ArcPaint::Transparent;
        }
        let color = self.custom.color.unwrap_or(default_color);
        let duration = self.custom.draw_duration();
        if duration == 0.0 {
            return ArcPaint::Solid(color);
        }

        let life = &self.common.life;
        let factor = life.lifetime / duration;
        let rev_factor = (life.total_lifetime - life.lifetime) / duration;
        if factor < 1.0 {
            ArcPaint::DrawIn {
                color,
                until: factor,
            }
        } else if rev_factor < 1.0 {
            ArcPaint::EraseOut {
                color,
                from: 1.0 - rev_factor,
            }
        } else {
            ArcPaint::Solid(color)
        }
    }

    /// Apex altitude in world units, `None` for automatic scaling.
    pub fn altitude(&self) -> Option<f64> {
        match self.custom.max_height {
            Some(h) if h != 0.0 => Some(h / UNIT_KMS),
            _ => None,
        }
    }

    pub fn dash_animate_time(&self) -> f64 {
        if self.custom.animated.unwrap_or(false) {
            ARC_DASH_ANIMATE_TIME
        } else {
            0.0
        }
    }

    /// Derives the label riding at the arc's midpoint.
    ///
    /// The label appears halfway through the draw-in and disappears when the
    /// erase-out starts.
    pub fn produce_label(&self) -> ArcLabel {
        let (mid_lat, mid_lon) = geo_midpoint(
            self.common.lat,
            self.common.lon,
            self.custom.point2_lat,
            self.custom.point2_lon,
        );
        let distance = geo_distance(
            self.common.lat,
            self.common.lon,
            self.custom.point2_lat,
            self.custom.point2_lon,
        );
        let default_height = distance / 2.0 * ARC_ALTITUDE_AUTO_SCALE * DEFAULT_GLOBE_RADIUS;

        let draw = self.custom.draw_duration();
        let life = &self.common.life;
        let mut common = self.common.clone();
        common.id = Default::default();
        common.lat = mid_lat;
        common.lon = mid_lon;
        common.life = Lifecycle {
            start_time: life.start_time + draw / 2.0,
            lifetime: life.lifetime - draw / 2.0,
            total_lifetime: life.total_lifetime - draw,
            fade_duration: life.fade_duration,
        };

        ArcLabel {
            common,
            custom: self.custom.clone(),
            default_height,
        }
    }
}

impl PointData for ArcData {
    fn common(&self) -> &CommonData {
        &self.common
    }
    fn common_mut(&mut self) -> &mut CommonData {
        &mut self.common
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Arc
    }
}

/// The label of an arc, placed above the arc's midpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcLabel {
    pub common: CommonData,
    pub custom: ArcCustomization,
    /// Automatic apex height in world units
    pub default_height: f64,
}

impl PointData for ArcLabel {
    fn common(&self) -> &CommonData {
        &self.common
    }
    fn common_mut(&mut self) -> &mut CommonData {
        &mut self.common
    }
    fn kind(&self) -> EntityKind {
        EntityKind::ArcLabel
    }
    fn height_offset(&self) -> f64 {
        match self.custom.max_height {
            Some(h) if h != 0.0 => (h + 5.0) / UNIT_KMS,
            _ => self.default_height + 1.0 / UNIT_KMS,
        }
    }
}

/// Mean earth radius in meters, matching geo's private `MEAN_EARTH_RADIUS`
/// used by `haversine_distance`.
const MEAN_EARTH_RADIUS: f64 = 6371008.8;

/// Great-circle distance in radians.
pub fn geo_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    a.haversine_distance(&b) / MEAN_EARTH_RADIUS
}

/// Great-circle midpoint as `(lat, lon)`.
pub fn geo_midpoint(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> (f64, f64) {
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    let mid = a.haversine_intermediate(&b, 0.5);
    (mid.y(), mid.x())
}

// ============================================================================
// ANALYSIS SAMPLE
// ============================================================================

/// A weighted sample feeding the analysis-mode hex bins.
///
/// Always "visible"; only its expiry matters.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisModeData {
    pub common: CommonData,
}

impl AnalysisModeData {
    /// Samples `point` with the given decay window.
    pub fn from_point<P: PointData + ?Sized>(point: &P, decay_ms: f64, now: f64) -> Self {
        let source = point.common();
        let mut common = CommonData::at(source.lat, source.lon, Some(decay_ms), now);
        common.id = source.id;
        common.counter = source.counter;
        Self { common }
    }

    pub fn weight(&self) -> f64 {
        self.common.weight()
    }
}

impl PointData for AnalysisModeData {
    fn common(&self) -> &CommonData {
        &self.common
    }
    fn common_mut(&mut self) -> &mut CommonData {
        &mut self.common
    }
    fn kind(&self) -> EntityKind {
        EntityKind::AnalysisBin
    }
    fn visible(&self) -> bool {
        true
    }
    fn time_left(&self) -> f64 {
        self.common.life.total_lifetime
    }
    fn fade_factor(&self) -> Option<f64> {
        None
    }
    fn face_camera(&self) -> bool {
        false
    }
    fn apply_global_scale(&self) -> bool {
        false
    }
}

// ============================================================================
// ENTITY UNION
// ============================================================================

/// Every entity the engine handles, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Explosion(ExplosionData),
    Circle(CircleData),
    Pointer(PointerData),
    Bar(BarData),
    Downloaded(DownloadedData),
    Arc(ArcData),
    ArcLabel(ArcLabel),
    AnalysisBin(AnalysisModeData),
}

macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Entity::Explosion($inner) => $body,
            Entity::Circle($inner) => $body,
            Entity::Pointer($inner) => $body,
            Entity::Bar($inner) => $body,
            Entity::Downloaded($inner) => $body,
            Entity::Arc($inner) => $body,
            Entity::ArcLabel($inner) => $body,
            Entity::AnalysisBin($inner) => $body,
        }
    };
}

impl PointData for Entity {
    fn common(&self) -> &CommonData {
        dispatch!(self, e => e.common())
    }
    fn common_mut(&mut self) -> &mut CommonData {
        dispatch!(self, e => e.common_mut())
    }
    fn kind(&self) -> EntityKind {
        dispatch!(self, e => e.kind())
    }
    fn update(&mut self, now: f64) -> Liveness {
        dispatch!(self, e => e.update(now))
    }
    fn visible(&self) -> bool {
        dispatch!(self, e => e.visible())
    }
    fn expired(&self) -> bool {
        dispatch!(self, e => e.expired())
    }
    fn time_left(&self) -> f64 {
        dispatch!(self, e => e.time_left())
    }
    fn fade_factor(&self) -> Option<f64> {
        dispatch!(self, e => e.fade_factor())
    }
    fn scale(&self) -> f64 {
        dispatch!(self, e => e.scale())
    }
    fn label_scale(&self) -> f64 {
        dispatch!(self, e => e.label_scale())
    }
    fn label_offset(&self) -> Vector3<f64> {
        dispatch!(self, e => e.label_offset())
    }
    fn height_offset(&self) -> f64 {
        dispatch!(self, e => e.height_offset())
    }
    fn face_camera(&self) -> bool {
        dispatch!(self, e => e.face_camera())
    }
    fn scale_z(&self) -> bool {
        dispatch!(self, e => e.scale_z())
    }
    fn apply_global_scale(&self) -> bool {
        dispatch!(self, e => e.apply_global_scale())
    }
    fn variable_scale(&self) -> bool {
        dispatch!(self, e => e.variable_scale())
    }
    fn label_expired(&self) -> bool {
        dispatch!(self, e => e.label_expired())
    }
    fn label_face_camera(&self) -> bool {
        dispatch!(self, e => e.label_face_camera())
    }
}

/// A concrete variant that can be projected out of, and back into, [`Entity`].
pub trait EntityVariant: PointData + Clone + 'static {
    const KIND: EntityKind;

    fn from_entity(entity: Entity) -> Option<Self>;
    fn into_entity(self) -> Entity;
}

macro_rules! entity_variant {
    ($ty:ty, $variant:ident, $kind:expr) => {
        impl EntityVariant for $ty {
            const KIND: EntityKind = $kind;

            fn from_entity(entity: Entity) -> Option<Self> {
                match entity {
                    Entity::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_entity(self) -> Entity {
                Entity::$variant(self)
            }
        }

        impl From<$ty> for Entity {
            fn from(value: $ty) -> Self {
                Entity::$variant(value)
            }
        }
    };
}

entity_variant!(ExplosionData, Explosion, EntityKind::Explosion);
entity_variant!(CircleData, Circle, EntityKind::Circle);
entity_variant!(PointerData, Pointer, EntityKind::Pointer);
entity_variant!(BarData, Bar, EntityKind::Bar);
entity_variant!(DownloadedData, Downloaded, EntityKind::Downloaded);
entity_variant!(ArcData, Arc, EntityKind::Arc);
entity_variant!(ArcLabel, ArcLabel, EntityKind::ArcLabel);
entity_variant!(AnalysisModeData, AnalysisBin, EntityKind::AnalysisBin);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::QUAD9_COLOR;
    use crate::globe_explosion::ExplosionCustomization;
    use approx::assert_relative_eq;

    fn fields(lat: f64, lon: f64, ttl: Option<f64>) -> CommonFields {
        CommonFields {
            lat,
            lon,
            ttl,
            ..Default::default()
        }
    }

    fn arc(ttl: f64, draw: Option<f64>) -> ArcData {
        ArcData::new(
            fields(0.0, 0.0, Some(ttl)),
            ArcCustomization {
                point2_lat: 0.0,
                point2_lon: 90.0,
                draw_duration: draw,
                ..Default::default()
            },
            0.0,
        )
    }

    #[test]
    fn test_circle_and_pointer_scale() {
        let circle = CircleData::new(
            fields(1.0, 2.0, None),
            CircleCustomization {
                radius: Some(3.0),
                ..Default::default()
            },
            0.0,
        );
        assert_relative_eq!(circle.scale(), 3.0);
        assert!(circle.lifecycle().total_lifetime.is_infinite());

        let pointer = PointerData::new(
            fields(1.0, 2.0, None),
            PointerCustomization {
                scale: Some(2.0),
                ..Default::default()
            },
            0.0,
        );
        assert_relative_eq!(pointer.label_offset().y, 7.0);
        assert_relative_eq!(pointer.label_scale(), 2.0);
    }

    #[test]
    fn test_bar_presentation() {
        let mut f = fields(1.0, 2.0, None);
        f.always_faces_viewer = Some(true);
        let bar = BarData::new(
            f,
            BarCustomization {
                height: UNIT_KMS * 4.0,
                ..Default::default()
            },
            0.0,
        );
        assert_relative_eq!(bar.label_offset().z, 4.0, epsilon = 1e-12);
        assert!(!bar.face_camera());
        assert!(bar.scale_z());
    }

    #[test]
    fn test_downloaded_invisible_without_image() {
        let mut d = DownloadedData::new(
            fields(1.0, 2.0, Some(1000.0)),
            DownloadedCustomization {
                url: "https://example.org/a.png".into(),
                scale: None,
            },
            0.0,
        );
        assert!(!d.visible());
        d.image = Some(ImageBitmap::new(1, 1, vec![0; 4]));
        assert!(d.visible());
    }

    #[test]
    fn test_arc_paint_phases() {
        let mut a = arc(1000.0, Some(200.0));

        let _ = a.update(100.0);
        match a.paint(QUAD9_COLOR) {
            ArcPaint::DrawIn { until, .. } => assert_relative_eq!(until, 0.5),
            other => panic!("unexpected paint {:?}", other),
        }
        let paint = a.paint(QUAD9_COLOR);
        assert_eq!(paint.color_at(0.25), QUAD9_COLOR);
        assert_eq!(paint.color_at(0.5), Rgba::TRANSPARENT);

        let _ = a.update(500.0);
        assert_eq!(a.paint(QUAD9_COLOR), ArcPaint::Solid(QUAD9_COLOR));

        let _ = a.update(900.0);
        let paint = a.paint(QUAD9_COLOR);
        assert_eq!(paint.color_at(0.25), Rgba::TRANSPARENT);
        assert_eq!(paint.color_at(0.75), QUAD9_COLOR);

        let _ = a.update(1001.0);
        assert_eq!(a.paint(QUAD9_COLOR), ArcPaint::Transparent);
    }

    #[test]
    fn test_arc_zero_draw_duration_is_solid() {
        let mut a = arc(1000.0, Some(0.0));
        let _ = a.update(0.0);
        assert_eq!(a.paint(QUAD9_COLOR), ArcPaint::Solid(QUAD9_COLOR));
    }

    #[test]
    fn test_arc_defaults_and_dashes() {
        let a = ArcData::new(
            fields(0.0, 0.0, None),
            ArcCustomization {
                point2_lon: 10.0,
                line_type: Some(ArcLineType::Dots),
                animated: Some(true),
                ..Default::default()
            },
            0.0,
        );
        assert_relative_eq!(a.lifecycle().total_lifetime, DEFAULT_ARC_LIFETIME);
        let line = a.custom.line_type.unwrap_or_default();
        assert_relative_eq!(line.dash_length(), 0.0025);
        assert_relative_eq!(line.dash_gap(), 0.01);
        assert_relative_eq!(a.dash_animate_time(), ARC_DASH_ANIMATE_TIME);
        assert_eq!(a.altitude(), None);
        assert_eq!("dashed_small".parse::<ArcLineType>(), Ok(ArcLineType::DashedSmall));
    }

    #[test]
    fn test_arc_label_timing_and_position() {
        let a = arc(1000.0, Some(200.0));
        let label = a.produce_label();

        assert_ne!(label.id(), a.id());
        assert_relative_eq!(label.lat(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(label.lon(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(label.lifecycle().start_time, 100.0);
        assert_relative_eq!(label.lifecycle().total_lifetime, 800.0);
        assert!(!label.visible());

        // Quarter of the globe apart: pi/2 radians
        let expected = std::f64::consts::FRAC_PI_2 / 2.0 * 0.5 * DEFAULT_GLOBE_RADIUS;
        assert_relative_eq!(label.default_height, expected, epsilon = 1e-9);
        assert_relative_eq!(label.height_offset(), expected + 1.0 / UNIT_KMS, epsilon = 1e-9);
    }

    #[test]
    fn test_arc_label_explicit_height() {
        let mut a = arc(1000.0, None);
        a.custom.max_height = Some(95.0);
        let label = a.produce_label();
        assert_relative_eq!(label.height_offset(), 100.0 / UNIT_KMS, epsilon = 1e-12);
        assert_relative_eq!(a.altitude().unwrap(), 95.0 / UNIT_KMS, epsilon = 1e-12);
    }

    #[test]
    fn test_analysis_sample_lifecycle() {
        let circle = CircleData::new(
            CommonFields {
                counter: Some(7.0),
                ..fields(5.0, 6.0, None)
            },
            CircleCustomization::default(),
            0.0,
        );
        let mut sample = AnalysisModeData::from_point(&circle, 60_000.0, 1000.0);
        assert!(sample.visible());
        assert_relative_eq!(sample.weight(), 7.0);
        assert_relative_eq!(sample.time_left(), 60_000.0);
        assert_eq!(sample.update(61_000.0), Liveness::Alive);
        assert_eq!(sample.update(61_000.1), Liveness::Expired);
        assert!(sample.visible());
    }

    #[test]
    fn test_entity_dispatch_matches_variant() {
        let explosion = ExplosionData::new(
            fields(1.0, 2.0, None),
            ExplosionCustomization::default(),
            Some(2.0),
            0.0,
        );
        let mut entity: Entity = explosion.clone().into();
        assert_eq!(entity.kind(), EntityKind::Explosion);
        assert_eq!(entity.id(), explosion.id());
        assert!(!entity.apply_global_scale());
        let _ = entity.update(300.0);
        let mut direct = explosion;
        let _ = direct.update(300.0);
        assert_relative_eq!(entity.scale(), direct.scale());

        assert!(ExplosionData::from_entity(entity.clone()).is_some());
        assert!(CircleData::from_entity(entity).is_none());
    }

    #[test]
    fn test_clone_is_independent() {
        let original: Entity = arc(1000.0, None).into();
        let mut copy = original.clone();
        let _ = copy.update(2000.0);
        assert!(copy.expired());
        assert!(!original.expired());
        assert_eq!(copy.id(), original.id());
    }
}
