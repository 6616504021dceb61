//! Headless globe model.
//!
//! Records what a renderer would draw: one [`SceneNode`] per custom object,
//! arc draw descriptors, heatmap points, hexagonal bins, the camera and the
//! globe rotation. Layers write into it; tests and the simulation read it.

use crate::color::Rgba;
use crate::globe_entities::ArcPaint;
use crate::globe_lifecycle::{EntityId, EntityKind, PointData};
use h3o::CellIndex;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// CAMERA
// ============================================================================

pub const DEFAULT_CAMERA_DISTANCE: f64 = 300.0;
pub const MIN_CAMERA_DISTANCE: f64 = 101.0;
pub const MAX_CAMERA_DISTANCE: f64 = 750.0;

/// Zoom range accepted by camera commands.
pub const MAX_ZOOM: f64 = 10.0;

/// Maps a zoom level in [-10, 10] to a camera distance.
///
/// Piecewise linear: 0 is the default distance, 10 the closest and -10 the
/// farthest.
pub fn zoom_to_distance(zoom: f64) -> f64 {
    let zoom = zoom.clamp(-MAX_ZOOM, MAX_ZOOM);
    if zoom >= 0.0 {
        DEFAULT_CAMERA_DISTANCE - zoom / MAX_ZOOM * (DEFAULT_CAMERA_DISTANCE - MIN_CAMERA_DISTANCE)
    } else {
        DEFAULT_CAMERA_DISTANCE - zoom / MAX_ZOOM * (MAX_CAMERA_DISTANCE - DEFAULT_CAMERA_DISTANCE)
    }
}

/// Inverse of [`zoom_to_distance`].
pub fn distance_to_zoom(distance: f64) -> f64 {
    let distance = distance.clamp(MIN_CAMERA_DISTANCE, MAX_CAMERA_DISTANCE);
    if distance <= DEFAULT_CAMERA_DISTANCE {
        (DEFAULT_CAMERA_DISTANCE - distance) / (DEFAULT_CAMERA_DISTANCE - MIN_CAMERA_DISTANCE)
            * MAX_ZOOM
    } else {
        (DEFAULT_CAMERA_DISTANCE - distance) / (MAX_CAMERA_DISTANCE - DEFAULT_CAMERA_DISTANCE)
            * MAX_ZOOM
    }
}

/// Wraps a longitude into [-180, 180].
pub fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Where the camera looks and from how far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub lat: f64,
    pub lon: f64,
    /// Distance from the globe center in world units
    pub distance: f64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            distance: DEFAULT_CAMERA_DISTANCE,
        }
    }
}

impl CameraState {
    pub fn zoom(&self) -> f64 {
        distance_to_zoom(self.distance)
    }

    /// `MIN_CAMERA_DISTANCE / distance`: 1 fully zoomed in, smaller further out.
    pub fn zoom_factor(&self) -> f64 {
        MIN_CAMERA_DISTANCE / self.distance
    }
}

/// A queued camera move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPosition {
    pub lat: f64,
    pub lon: f64,
    /// Target zoom; `None` keeps the current distance
    pub zoom: Option<f64>,
    /// Multiplier of the default movement speeds
    pub speed: Option<f64>,
    /// Jump directly instead of animating
    pub instant_move: bool,
}

impl CameraPosition {
    /// Clamps zoom and latitude, wraps longitude.
    pub fn normalize(self) -> Self {
        Self {
            lat: self.lat.clamp(-90.0, 90.0),
            lon: wrap_longitude(self.lon),
            zoom: self.zoom.map(|z| z.clamp(-MAX_ZOOM, MAX_ZOOM)),
            ..self
        }
    }
}

/// Camera projection and viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scene {
    /// Vertical field of view in degrees
    pub fov: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            fov: 50.0,
            width: 1920,
            height: 1080,
        }
    }
}

// ============================================================================
// NODES
// ============================================================================

/// Geometry a build layer attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeShape {
    /// Nothing built (e.g. arc labels, which only carry text)
    Empty,
    Dot {
        start_color: Rgba,
        end_color: Rgba,
        lerp_factor: f64,
        outline: bool,
    },
    Disc {
        color: Rgba,
        outline_color: Option<Rgba>,
        outline_thickness: Option<f64>,
    },
    Pin {
        background: Rgba,
        border: Rgba,
        glyph: Rgba,
    },
    Bar {
        /// World units
        height: f64,
        diameter: f64,
        bottom_color: Rgba,
        top_color: Rgba,
    },
    Image {
        width: u32,
        height: u32,
    },
}

/// Text label state of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelState {
    pub text: String,
    pub visible: bool,
    pub scale: f64,
    pub offset: Vector3<f64>,
    pub face_camera: bool,
    pub hover_only: bool,
}

/// One custom object as a renderer would hold it.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub id: EntityId,
    pub kind: EntityKind,
    pub visible: bool,
    /// Set by the opacity pass; keeps the node hidden even when its entity is visible
    pub do_not_show: bool,
    pub lat: f64,
    pub lon: f64,
    /// Altitude above the surface in world units
    pub height: f64,
    pub scale: Vector3<f64>,
    /// 0..=1
    pub opacity: f64,
    pub transparent: bool,
    pub face_camera: bool,
    pub shape: NodeShape,
    pub label: Option<LabelState>,
}

impl SceneNode {
    /// Fresh node for `object`: placed, hidden, nothing built yet.
    pub fn for_object<P: PointData + ?Sized>(object: &P) -> Self {
        Self {
            id: object.id(),
            kind: object.kind(),
            visible: false,
            do_not_show: false,
            lat: object.lat(),
            lon: object.lon(),
            height: object.height_offset(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            opacity: 1.0,
            transparent: false,
            face_camera: object.face_camera(),
            shape: NodeShape::Empty,
            label: None,
        }
    }

    pub fn set_uniform_scale(&mut self, scale: f64) {
        self.scale = Vector3::new(scale, scale, scale);
    }

    /// Whether a renderer would draw the node this frame.
    pub fn shown(&self) -> bool {
        self.visible && !self.do_not_show
    }
}

// ============================================================================
// GLOBE-NATIVE PRIMITIVES
// ============================================================================

/// One arc to draw between two points.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcDescriptor {
    pub id: EntityId,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub paint: ArcPaint,
    /// Apex altitude in world units; `None` for automatic
    pub altitude: Option<f64>,
    pub dash_length: f64,
    pub dash_gap: f64,
    pub dash_animate_time: f64,
    pub stroke: Option<f64>,
}

/// One weighted heatmap point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatPoint {
    pub lat: f64,
    pub lon: f64,
    pub weight: f64,
}

/// One hexagonal analysis bin.
#[derive(Debug, Clone, PartialEq)]
pub struct HexBin {
    pub cell: CellIndex,
    /// Cell center
    pub lat: f64,
    pub lon: f64,
    /// Sum of the weights of the live samples in the cell
    pub weight: f64,
    pub color: Rgba,
    /// Altitude in globe radii
    pub altitude: f64,
}

// ============================================================================
// GLOBE
// ============================================================================

/// Everything the renderer would show.
#[derive(Debug, Default)]
pub struct GlobeView {
    pub nodes: HashMap<EntityId, SceneNode>,
    pub arcs: Vec<ArcDescriptor>,
    pub heatmap: Vec<HeatPoint>,
    pub hex_bins: Vec<HexBin>,
    pub camera: CameraState,
    /// Rotation around the polar axis in radians
    pub rotation_y: f64,
}

impl GlobeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &EntityId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Number of nodes a renderer would draw.
    pub fn shown_nodes(&self) -> usize {
        self.nodes.values().filter(|n| n.shown()).count()
    }

    /// Shown node count per kind.
    pub fn shown_by_kind(&self) -> HashMap<EntityKind, usize> {
        let mut counts = HashMap::new();
        for node in self.nodes.values().filter(|n| n.shown()) {
            *counts.entry(node.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Moves the camera to `position` at once.
    pub fn jump_camera(&mut self, position: &CameraPosition) {
        self.camera.lat = position.lat;
        self.camera.lon = position.lon;
        if let Some(zoom) = position.zoom {
            self.camera.distance = zoom_to_distance(zoom);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globe_lifecycle::CommonData;
    use approx::assert_relative_eq;

    #[test]
    fn test_zoom_mapping_anchors() {
        assert_relative_eq!(zoom_to_distance(0.0), DEFAULT_CAMERA_DISTANCE);
        assert_relative_eq!(zoom_to_distance(10.0), MIN_CAMERA_DISTANCE);
        assert_relative_eq!(zoom_to_distance(-10.0), MAX_CAMERA_DISTANCE);
        assert_relative_eq!(zoom_to_distance(25.0), MIN_CAMERA_DISTANCE);
    }

    #[test]
    fn test_zoom_mapping_inverse() {
        for zoom in [-10.0, -7.5, -1.0, 0.0, 0.5, 3.0, 9.9, 10.0] {
            assert_relative_eq!(distance_to_zoom(zoom_to_distance(zoom)), zoom, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_normalize_camera_position() {
        let p = CameraPosition {
            lat: 120.0,
            lon: 190.0,
            zoom: Some(-30.0),
            speed: None,
            instant_move: false,
        }
        .normalize();
        assert_relative_eq!(p.lat, 90.0);
        assert_relative_eq!(p.lon, -170.0);
        assert_eq!(p.zoom, Some(-10.0));
        assert_relative_eq!(wrap_longitude(180.0), 180.0);
        assert_relative_eq!(wrap_longitude(-540.0), -180.0);
    }

    #[test]
    fn test_jump_camera_keeps_distance_without_zoom() {
        let mut globe = GlobeView::new();
        globe.camera.distance = 400.0;
        globe.jump_camera(&CameraPosition {
            lat: 10.0,
            lon: 20.0,
            zoom: None,
            speed: None,
            instant_move: true,
        });
        assert_relative_eq!(globe.camera.distance, 400.0);
        assert_relative_eq!(globe.camera.lon, 20.0);
        assert_relative_eq!(GlobeView::new().camera.zoom_factor(), 101.0 / 300.0);
    }

    #[test]
    fn test_node_shown_respects_do_not_show() {
        struct Probe(CommonData);
        impl PointData for Probe {
            fn common(&self) -> &CommonData {
                &self.0
            }
            fn common_mut(&mut self) -> &mut CommonData {
                &mut self.0
            }
            fn kind(&self) -> EntityKind {
                EntityKind::Circle
            }
        }

        let mut node = SceneNode::for_object(&Probe(CommonData::at(1.0, 2.0, None, 0.0)));
        assert!(!node.shown());
        node.visible = true;
        assert!(node.shown());
        node.do_not_show = true;
        assert!(!node.shown());
    }
}
