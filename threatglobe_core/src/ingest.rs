//! Ingestion: inbound JSON event records to queued entities.
//!
//! ```text
//!   raw JSON ──▶ ServiceRecord::parse ──▶ view_command? ──▶ camera queue
//!                    │ (warn + drop on error)
//!                    ▼
//!             filter keys / layers ──▶ regex filters ──▶ counter queue
//!                                                            │
//!                                  sentinel (0,0)/NaN? ◀─────┘
//!                                          │ no
//!                                          ▼
//!                                    entity ──▶ points queue
//! ```

use crate::color::Rgba;
use crate::globe_entities::{
    ArcCustomization, ArcData, ArcLineType, BarCustomization, BarData, CircleCustomization,
    CircleData, DownloadedCustomization, DownloadedData, Entity, PointerCustomization,
    PointerData,
};
use crate::globe_explosion::{ExplosionCustomization, ExplosionData};
use crate::globe_lifecycle::{
    CommonFields, EntityKind, HoverSpec, LabelSpec, LayerSpec, LinkSpec, PointData, ScaleSpec,
};
use crate::globe_view::CameraPosition;
use crate::settings::Settings;
use crate::state::AppState;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Keys of every record type that never become filters.
pub const COMMON_NON_FILTER_KEYS: &[&str] = &[
    "lat",
    "lon",
    "ttl",
    "fade_duration",
    "draw_delay",
    "opacity",
    "counter",
    "counter_include",
    "always_faces_viewer",
    "display_text_interval",
    "display_text_font",
    "display_text_font_size",
    "display_text_font_style",
    "display_text_color",
    "display_text_outline_color",
    "display_text_always_faces_viewer",
    "display_text_hover_only",
    "layer_id",
    "layer_name",
    "ignore_zoom",
];

const EXPLOSION_KEYS: &[&str] = &[
    "explosion_initial_color",
    "explosion_initial_radius_interval",
    "explosion_initial_radius_size",
    "explosion_fallback_color",
    "explosion_fallback_radius_interval",
    "explosion_fallback_radius_size",
];
const CIRCLE_KEYS: &[&str] = &[
    "circle_radius",
    "circle_color",
    "circle_outline_color",
    "circle_outline_thickness",
];
const POINTER_KEYS: &[&str] = &[
    "pointer_background_color",
    "pointer_border_color",
    "pointer_scale",
    "pointer_glyph_color",
];
const BAR_KEYS: &[&str] = &["bar_height", "bar_diameter", "bar_bottom_color", "bar_top_color"];
const DOWNLOADED_KEYS: &[&str] = &["downloaded_object_url", "downloaded_object_scale"];
const ARC_KEYS: &[&str] = &[
    "point2_lon",
    "point2_lat",
    "arc_color",
    "arc_line_type",
    "arc_line_width",
    "arc_animated",
    "arc_draw_duration",
    "arc_max_height",
];

/// Errors that reject an inbound record.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Record is not a JSON object")]
    NotAnObject,

    #[error("Missing required {kind} field: {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl IngestError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// The `type` of an inbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Explosion,
    Circle,
    Pointer,
    Bar,
    Downloaded,
    Arc,
    ViewCommand,
}

impl RecordKind {
    /// Unknown or absent types are explosions.
    fn from_type(tag: Option<&str>) -> Self {
        match tag {
            Some("circle") => RecordKind::Circle,
            Some("pointer") => RecordKind::Pointer,
            Some("bar") => RecordKind::Bar,
            Some("downloaded") => RecordKind::Downloaded,
            Some("arc") => RecordKind::Arc,
            Some("view_command") => RecordKind::ViewCommand,
            _ => RecordKind::Explosion,
        }
    }

    fn name(self) -> &'static str {
        match self {
            RecordKind::Explosion => "explosion",
            RecordKind::Circle => "circle",
            RecordKind::Pointer => "pointer",
            RecordKind::Bar => "bar",
            RecordKind::Downloaded => "downloaded",
            RecordKind::Arc => "arc",
            RecordKind::ViewCommand => "view_command",
        }
    }

    fn non_filter_keys(self) -> &'static [&'static str] {
        match self {
            RecordKind::Explosion => EXPLOSION_KEYS,
            RecordKind::Circle => CIRCLE_KEYS,
            RecordKind::Pointer => POINTER_KEYS,
            RecordKind::Bar => BAR_KEYS,
            RecordKind::Downloaded => DOWNLOADED_KEYS,
            RecordKind::Arc => ARC_KEYS,
            RecordKind::ViewCommand => &[],
        }
    }

    fn required_keys(self) -> &'static [&'static str] {
        match self {
            RecordKind::Downloaded => &["downloaded_object_url"],
            RecordKind::Arc => &["point2_lat", "point2_lon"],
            RecordKind::Bar => &["bar_height"],
            RecordKind::ViewCommand => &["view_lat", "view_lon"],
            _ => &[],
        }
    }

    /// Whether `key` is a filter candidate for this record type.
    pub fn is_filter_key(self, key: &str) -> bool {
        !COMMON_NON_FILTER_KEYS.contains(&key) && !self.non_filter_keys().contains(&key)
    }
}

/// A parsed inbound record with typed field access.
///
/// A JSON `null` reads as an absent field.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub kind: RecordKind,
    fields: Map<String, Value>,
}

impl ServiceRecord {
    /// Parses and validates one record.
    ///
    /// # Errors
    /// Invalid JSON, a non-object document, or a missing type-required field.
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let Value::Object(fields) = serde_json::from_str::<Value>(raw)? else {
            return Err(IngestError::NotAnObject);
        };
        let kind = RecordKind::from_type(fields.get("type").and_then(Value::as_str));
        let record = Self { kind, fields };

        for &field in kind.required_keys() {
            if !record.has(field) {
                return Err(IngestError::MissingField {
                    kind: kind.name(),
                    field,
                });
            }
        }
        Ok(record)
    }

    fn value(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    pub fn has(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// Keys present in the record, in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Field rendered as text, for filter matching.
    pub fn text(&self, key: &str) -> Option<String> {
        self.value(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.value(key).and_then(Value::as_str).map(str::to_string)
    }

    /// Number or numeric string.
    pub fn float(&self, key: &str) -> Result<Option<f64>, IngestError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|e| IngestError::invalid(key, e.to_string())),
            Some(other) => Err(IngestError::invalid(key, format!("not a number: {}", other))),
        }
    }

    /// Integer part of a number or numeric string.
    pub fn int(&self, key: &str) -> Result<Option<i64>, IngestError> {
        Ok(self.float(key)?.map(|v| v.trunc() as i64))
    }

    /// Event weight; must be finite when present.
    pub fn counter(&self) -> Result<Option<f64>, IngestError> {
        match self.float("counter")? {
            Some(v) if !v.is_finite() => Err(IngestError::invalid("counter", "not finite")),
            other => Ok(other),
        }
    }

    /// Booleans, `"true"`/`"false"`, or numbers (non-zero is true).
    pub fn boolean(&self, key: &str) -> Result<Option<bool>, IngestError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Number(n)) => Ok(Some(n.as_f64().is_some_and(|v| v != 0.0))),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" | "" => Ok(Some(false)),
                other => Err(IngestError::invalid(key, format!("not a boolean: {}", other))),
            },
            Some(other) => Err(IngestError::invalid(key, format!("not a boolean: {}", other))),
        }
    }

    /// Color string; `"none"` and `"<null>"` read as absent.
    pub fn color(&self, key: &str) -> Result<Option<Rgba>, IngestError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::String(s)) if s == "none" || s == "<null>" => Ok(None),
            Some(Value::String(s)) => s
                .parse::<Rgba>()
                .map(Some)
                .map_err(|e| IngestError::invalid(key, e.to_string())),
            Some(other) => Err(IngestError::invalid(key, format!("not a color: {}", other))),
        }
    }

    /// Latitude or longitude; anything unreadable is NaN, i.e. no location.
    fn coordinate(&self, key: &str) -> f64 {
        self.float(key).ok().flatten().unwrap_or(f64::NAN)
    }

    fn required_float(&self, key: &'static str) -> Result<f64, IngestError> {
        self.float(key)?.ok_or(IngestError::MissingField {
            kind: self.kind.name(),
            field: key,
        })
    }

    /// `(0, 0)` and NaN coordinates mean "no location".
    pub fn has_location(&self) -> bool {
        let (lat, lon) = (self.coordinate("lat"), self.coordinate("lon"));
        !(lat.is_nan() || lon.is_nan() || (lat == 0.0 && lon == 0.0))
    }

    /// Fields shared by every entity type.
    pub fn common_fields(&self) -> Result<CommonFields, IngestError> {
        Ok(CommonFields {
            lat: self.coordinate("lat"),
            lon: self.coordinate("lon"),
            ttl: self.int("ttl")?.map(|v| v as f64),
            fade_duration: self.float("fade_duration")?,
            draw_delay: self.float("draw_delay")?,
            always_faces_viewer: self.boolean("always_faces_viewer")?,
            counter: self.counter()?,
            counter_include: self.boolean("counter_include")?,
            label: LabelSpec {
                text: self.string("display_text"),
                interval: self.float("display_text_interval")?,
                font: self.string("display_text_font"),
                font_size: self.float("display_text_font_size")?,
                font_style: self.string("display_text_font_style"),
                color: self.color("display_text_color")?,
                outline_color: self.color("display_text_outline_color")?,
                always_faces_viewer: self.boolean("display_text_always_faces_viewer")?,
                hover_only: self.boolean("display_text_hover_only")?,
            },
            link: LinkSpec {
                url: self.string("link_url"),
                new_window: self.boolean("new_window")?,
            },
            layer: LayerSpec {
                opacity: self.int("opacity")?.map(|v| v.clamp(0, 100) as f64),
                layer_id: self.int("layer_id")?,
                layer_name: self.string("layer_name"),
            },
            scaling: ScaleSpec {
                ignore_zoom: self.boolean("ignore_zoom")?,
            },
            hover: HoverSpec {
                text: self.string("hover_text"),
            },
        })
    }

    /// Builds the entity this record describes.
    ///
    /// # Arguments
    /// * `settings` - Counter-scaling settings for explosions
    /// * `now` - Creation time (ms)
    pub fn to_entity(&self, settings: &Settings, now: f64) -> Result<Entity, IngestError> {
        let fields = self.common_fields()?;
        let entity = match self.kind {
            RecordKind::Circle => CircleData::new(
                fields,
                CircleCustomization {
                    radius: self.float("circle_radius")?,
                    color: self.color("circle_color")?,
                    outline_color: self.color("circle_outline_color")?,
                    outline_thickness: self.float("circle_outline_thickness")?,
                },
                now,
            )
            .into(),
            RecordKind::Pointer => PointerData::new(
                fields,
                PointerCustomization {
                    background_color: self.color("pointer_background_color")?,
                    border_color: self.color("pointer_border_color")?,
                    scale: self.float("pointer_scale")?,
                    glyph_color: self.color("pointer_glyph_color")?,
                },
                now,
            )
            .into(),
            RecordKind::Bar => BarData::new(
                fields,
                BarCustomization {
                    height: self.required_float("bar_height")?,
                    diameter: self.float("bar_diameter")?,
                    bottom_color: self.color("bar_bottom_color")?,
                    top_color: self.color("bar_top_color")?,
                },
                now,
            )
            .into(),
            RecordKind::Downloaded => DownloadedData::new(
                fields,
                DownloadedCustomization {
                    url: self.string("downloaded_object_url").ok_or(IngestError::MissingField {
                        kind: "downloaded",
                        field: "downloaded_object_url",
                    })?,
                    scale: self.float("downloaded_object_scale")?,
                },
                now,
            )
            .into(),
            RecordKind::Arc => ArcData::new(
                fields,
                ArcCustomization {
                    point2_lat: self.required_float("point2_lat")?,
                    point2_lon: self.required_float("point2_lon")?,
                    color: self.color("arc_color")?,
                    line_type: self
                        .string("arc_line_type")
                        .map(|s| s.parse::<ArcLineType>())
                        .transpose()
                        .map_err(|e| IngestError::invalid("arc_line_type", e))?,
                    line_width: self.float("arc_line_width")?,
                    animated: self.boolean("arc_animated")?,
                    draw_duration: self.float("arc_draw_duration")?,
                    max_height: self.float("arc_max_height")?,
                },
                now,
            )
            .into(),
            RecordKind::Explosion | RecordKind::ViewCommand => ExplosionData::with_settings(
                fields,
                ExplosionCustomization {
                    initial_color: self.color("explosion_initial_color")?,
                    initial_radius_interval: self.float("explosion_initial_radius_interval")?,
                    initial_radius_size: self.float("explosion_initial_radius_size")?,
                    fallback_color: self.color("explosion_fallback_color")?,
                    fallback_radius_interval: self.float("explosion_fallback_radius_interval")?,
                    fallback_radius_size: self.float("explosion_fallback_radius_size")?,
                },
                settings,
                now,
            )
            .into(),
        };
        Ok(entity)
    }

    /// Camera move of a `view_command` record.
    pub fn to_camera_position(&self) -> Result<CameraPosition, IngestError> {
        Ok(CameraPosition {
            lat: self.required_float("view_lat")?,
            lon: self.required_float("view_lon")?,
            zoom: self.float("view_zoom")?,
            speed: self.float("view_speed")?,
            instant_move: false,
        }
        .normalize())
    }
}

// ============================================================================
// INGESTOR
// ============================================================================

/// What happened to an accepted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// An entity of this kind was queued
    Queued(EntityKind),
    /// A camera move was queued
    Camera,
    /// Rejected by a filter
    Filtered,
    /// Counted, but without a usable location
    NoLocation,
}

/// Stateful front door of the engine.
///
/// Filter keys are discovered from the first event record; compiled filter
/// patterns are cached by source text.
#[derive(Debug, Default)]
pub struct Ingestor {
    filters_configured: bool,
    patterns: HashMap<String, Option<Regex>>,
}

impl Ingestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one raw record.
    ///
    /// # Errors
    /// Any [`IngestError`]; the record is dropped and nothing was queued.
    pub fn ingest(
        &mut self,
        raw: &str,
        settings: &mut Settings,
        state: &AppState,
        now: f64,
    ) -> Result<Ingested, IngestError> {
        let record = ServiceRecord::parse(raw)?;

        if record.kind == RecordKind::ViewCommand {
            state.new_camera_positions.push(record.to_camera_position()?);
            return Ok(Ingested::Camera);
        }

        if !self.filters_configured {
            let keys: Vec<String> = record
                .keys()
                .filter(|key| record.kind.is_filter_key(key))
                .map(str::to_string)
                .collect();
            debug!("Discovered filter keys: {:?}", keys);
            settings.update_filter_keys(&keys);
            self.filters_configured = true;
        }

        if let Some(layer_id) = record.int("layer_id")? {
            if settings.register_layer(layer_id, record.string("layer_name").as_deref()) {
                debug!("Registered opacity layer {}", layer_id);
            }
        }

        if !self.passes_filters(&record, settings) {
            return Ok(Ingested::Filtered);
        }

        // Build before counting so a record with a bad field is not half-applied
        let entity = record
            .has_location()
            .then(|| record.to_entity(settings, now))
            .transpose()?;

        if record.boolean("counter_include")?.unwrap_or(true) {
            state.new_events.push(record.counter()?.unwrap_or(1.0));
        }

        match entity {
            Some(entity) => {
                let kind = entity.kind();
                state.new_points.push(entity);
                Ok(Ingested::Queued(kind))
            }
            None => Ok(Ingested::NoLocation),
        }
    }

    fn passes_filters(&mut self, record: &ServiceRecord, settings: &Settings) -> bool {
        for key in record.keys() {
            if !record.kind.is_filter_key(key) {
                continue;
            }
            let Some(pattern) = settings.filters.get(key).filter(|p| !p.is_empty()) else {
                continue;
            };
            let value = record.text(key).unwrap_or_default();
            let matched = self
                .pattern(pattern)
                .is_some_and(|regex| regex.is_match(&value));
            if !matched {
                return false;
            }
        }
        true
    }

    fn pattern(&mut self, source: &str) -> Option<&Regex> {
        self.patterns
            .entry(source.to_string())
            .or_insert_with(|| {
                match RegexBuilder::new(source).case_insensitive(true).build() {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        warn!("Filter {:?} does not compile, matching nothing: {}", source, e);
                        None
                    }
                }
            })
            .as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn setup() -> (Ingestor, Settings, AppState) {
        (Ingestor::new(), Settings::default(), AppState::new())
    }

    #[test]
    fn test_explosion_is_default_type() {
        let (mut ingestor, mut settings, state) = setup();
        let outcome = ingestor
            .ingest(r#"{"lat": 48.85, "lon": 2.35, "counter": 4}"#, &mut settings, &state, 0.0)
            .unwrap();
        assert_eq!(outcome, Ingested::Queued(EntityKind::Explosion));
        assert_eq!(state.new_events.take_all(), vec![4.0]);
        let points = state.new_points.take_all();
        assert_eq!(points.len(), 1);
        assert_relative_eq!(points[0].lat(), 48.85);
    }

    #[test]
    fn test_numeric_strings_and_colors() {
        let record = ServiceRecord::parse(
            r##"{"type": "circle", "lat": "10.5", "lon": "-3", "circle_radius": "250",
                "circle_color": "#ff0000", "circle_outline_color": "none", "opacity": 150}"##,
        )
        .unwrap();
        assert_eq!(record.kind, RecordKind::Circle);
        let Entity::Circle(circle) = record.to_entity(&Settings::default(), 0.0).unwrap() else {
            panic!("expected a circle");
        };
        assert_relative_eq!(circle.lat(), 10.5);
        assert_eq!(circle.custom.radius, Some(250.0));
        assert_eq!(circle.custom.color, Some(Rgba::rgb(255, 0, 0)));
        assert_eq!(circle.custom.outline_color, None);
        assert_eq!(circle.common.layer.opacity, Some(100.0));
    }

    #[test]
    fn test_downloaded_without_url_is_dropped() {
        let (mut ingestor, mut settings, state) = setup();
        let result = ingestor.ingest(
            r#"{"type": "downloaded", "lat": 1.0, "lon": 1.0}"#,
            &mut settings,
            &state,
            0.0,
        );
        assert!(matches!(
            result,
            Err(IngestError::MissingField {
                field: "downloaded_object_url",
                ..
            })
        ));
        assert!(state.new_points.is_empty());
        assert!(state.new_events.is_empty());
    }

    #[test]
    fn test_required_fields_per_type() {
        assert!(ServiceRecord::parse(r#"{"type": "arc", "lat": 1, "lon": 1, "point2_lat": 2}"#).is_err());
        assert!(ServiceRecord::parse(r#"{"type": "bar", "lat": 1, "lon": 1}"#).is_err());
        assert!(ServiceRecord::parse(r#"{"type": "bar", "lat": 1, "lon": 1, "bar_height": 300}"#).is_ok());
        assert!(matches!(ServiceRecord::parse("[1, 2]"), Err(IngestError::NotAnObject)));
        assert!(matches!(ServiceRecord::parse("{oops"), Err(IngestError::InvalidJson(_))));
    }

    #[test]
    fn test_sentinel_location_is_counted_not_drawn() {
        let (mut ingestor, mut settings, state) = setup();
        let outcome = ingestor
            .ingest(r#"{"lat": 0, "lon": 0}"#, &mut settings, &state, 0.0)
            .unwrap();
        assert_eq!(outcome, Ingested::NoLocation);
        assert_eq!(state.new_events.take_all(), vec![1.0]);
        assert!(state.new_points.is_empty());

        let outcome = ingestor
            .ingest(r#"{"lat": "north", "lon": 3}"#, &mut settings, &state, 0.0)
            .unwrap();
        assert_eq!(outcome, Ingested::NoLocation);
    }

    #[test]
    fn test_fractional_counter_is_kept() {
        let (mut ingestor, mut settings, state) = setup();
        ingestor
            .ingest(r#"{"lat": 5, "lon": 5, "counter": 1.5}"#, &mut settings, &state, 0.0)
            .unwrap();
        ingestor
            .ingest(r#"{"lat": 0, "lon": 0, "counter": "0.25"}"#, &mut settings, &state, 0.0)
            .unwrap();
        assert_eq!(state.new_events.take_all(), vec![1.5, 0.25]);
        let points = state.new_points.take_all();
        assert_eq!(points[0].common().counter, Some(1.5));
    }

    #[test]
    fn test_non_finite_counter_is_rejected() {
        let (mut ingestor, mut settings, state) = setup();
        let result = ingestor.ingest(r#"{"lat": 5, "lon": 5, "counter": "inf"}"#, &mut settings, &state, 0.0);
        assert!(matches!(result, Err(IngestError::InvalidValue { .. })));
        assert!(state.new_events.is_empty());
        assert!(state.new_points.is_empty());
    }

    #[test]
    fn test_counter_include_false_skips_counter() {
        let (mut ingestor, mut settings, state) = setup();
        ingestor
            .ingest(
                r#"{"lat": 5, "lon": 5, "counter_include": false}"#,
                &mut settings,
                &state,
                0.0,
            )
            .unwrap();
        assert!(state.new_events.is_empty());
        assert_eq!(state.new_points.len(), 1);
    }

    #[test]
    fn test_filter_keys_discovered_once() {
        let (mut ingestor, mut settings, state) = setup();
        ingestor
            .ingest(
                r#"{"lat": 5, "lon": 5, "source": "scanner", "ttl": 100}"#,
                &mut settings,
                &state,
                0.0,
            )
            .unwrap();
        assert!(settings.filters.contains_key("source"));
        assert!(!settings.filters.contains_key("ttl"));
        assert!(!settings.filters.contains_key("lat"));

        ingestor
            .ingest(r#"{"lat": 5, "lon": 5, "proto": "dns"}"#, &mut settings, &state, 0.0)
            .unwrap();
        assert!(!settings.filters.contains_key("proto"));
    }

    #[test]
    fn test_filters_are_case_insensitive_regex() {
        let (mut ingestor, mut settings, state) = setup();
        ingestor
            .ingest(r#"{"lat": 5, "lon": 5, "source": "x"}"#, &mut settings, &state, 0.0)
            .unwrap();
        settings.set_filter("source", "^scan");

        let pass = ingestor
            .ingest(r#"{"lat": 5, "lon": 5, "source": "SCANNER"}"#, &mut settings, &state, 0.0)
            .unwrap();
        assert_eq!(pass, Ingested::Queued(EntityKind::Explosion));

        let fail = ingestor
            .ingest(r#"{"lat": 5, "lon": 5, "source": "botnet"}"#, &mut settings, &state, 0.0)
            .unwrap();
        assert_eq!(fail, Ingested::Filtered);

        settings.set_filter("source", "([");
        let broken = ingestor
            .ingest(r#"{"lat": 5, "lon": 5, "source": "scanner"}"#, &mut settings, &state, 0.0)
            .unwrap();
        assert_eq!(broken, Ingested::Filtered);
    }

    #[test]
    fn test_layers_registered_from_records() {
        let (mut ingestor, mut settings, state) = setup();
        ingestor
            .ingest(
                r#"{"lat": 5, "lon": 5, "layer_id": 3, "layer_name": "Honeypots"}"#,
                &mut settings,
                &state,
                0.0,
            )
            .unwrap();
        assert_eq!(settings.layers.get(&3).map(|l| l.name.as_str()), Some("Honeypots"));
    }

    #[test]
    fn test_view_command_normalized() {
        let (mut ingestor, mut settings, state) = setup();
        let outcome = ingestor
            .ingest(
                r#"{"type": "view_command", "view_lat": 95, "view_lon": 190, "view_zoom": 40}"#,
                &mut settings,
                &state,
                0.0,
            )
            .unwrap();
        assert_eq!(outcome, Ingested::Camera);
        let position = state.new_camera_positions.pop_front().unwrap();
        assert_relative_eq!(position.lat, 90.0);
        assert_relative_eq!(position.lon, -170.0);
        assert_eq!(position.zoom, Some(10.0));
        assert!(!position.instant_move);
        assert!(state.new_events.is_empty());
    }

    #[test]
    fn test_arc_line_type_parsed() {
        let record = ServiceRecord::parse(
            r#"{"type": "arc", "lat": 1, "lon": 1, "point2_lat": 5, "point2_lon": 5,
                "arc_line_type": "dots", "arc_animated": "true"}"#,
        )
        .unwrap();
        let Entity::Arc(arc) = record.to_entity(&Settings::default(), 0.0).unwrap() else {
            panic!("expected an arc");
        };
        assert_eq!(arc.custom.line_type, Some(ArcLineType::Dots));
        assert_eq!(arc.custom.animated, Some(true));

        let bad = ServiceRecord::parse(
            r#"{"type": "arc", "lat": 1, "lon": 1, "point2_lat": 5, "point2_lon": 5,
                "arc_line_type": "zigzag"}"#,
        )
        .unwrap();
        assert!(matches!(
            bad.to_entity(&Settings::default(), 0.0),
            Err(IngestError::InvalidValue { .. })
        ));
    }
}
