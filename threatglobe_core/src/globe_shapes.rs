//! Build layers: turn an entity into node geometry.
//!
//! Each layer only reacts to its own entity kind; every other object passes
//! through untouched. The explosion sub-layers live here too, since they are
//! the geometry side of the explosion group.

use crate::color::{Rgba, DEFAULT_CRITICAL_COLOR, QUAD9_COLOR};
use crate::globe_entities::Entity;
use crate::globe_explosion::ExplosionData;
use crate::globe_lifecycle::{PointData, UNIT_KMS};
use crate::globe_registry::{
    ExplosionSubLayer, GlobeLayer, ObjectBuildHook, ObjectFrame, ObjectUpdateHook,
};
use crate::globe_view::{GlobeView, HeatPoint, NodeShape, SceneNode};
use crate::settings::Settings;

/// Heatmap refresh period (ms).
pub const HEATMAP_REFRESH_INTERVAL: f64 = 3000.0;

const CIRCLE_COLOR: Rgba = Rgba::rgb(0x00, 0xff, 0x00);
const CIRCLE_OUTLINE_COLOR: Rgba = Rgba::rgb(0x00, 0x00, 0x00);
const POINTER_ACCENT_COLOR: Rgba = Rgba::rgb(0xba, 0x10, 0x3b);

// ============================================================================
// EXPLOSIONS
// ============================================================================

/// Draws explosions as dots blending between their start and end colors.
#[derive(Debug, Default)]
pub struct ExplosionsLayer;

impl ExplosionsLayer {
    pub fn new() -> Self {
        Self
    }

    fn paint(node: &mut SceneNode, explosion: &ExplosionData, settings: &Settings) {
        let (inflating, deflated) = settings.explosion_colors();
        node.shape = NodeShape::Dot {
            start_color: explosion.start_color(inflating),
            end_color: explosion.end_color(deflated),
            lerp_factor: explosion.color_lerp_factor(),
            outline: explosion.needs_outline(),
        };
    }
}

impl GlobeLayer for ExplosionsLayer {
    fn layer_name(&self) -> &str {
        "Explosions"
    }
}

impl ExplosionSubLayer for ExplosionsLayer {
    fn update_explosion_data(
        &mut self,
        _globe: &mut GlobeView,
        _settings: &Settings,
        _data: &[ExplosionData],
        _now: f64,
    ) {
    }

    fn needs_custom_objects(&self, settings: &Settings) -> bool {
        settings.enable_event_explosions
    }
}

impl ObjectBuildHook for ExplosionsLayer {
    fn build_object(&mut self, node: &mut SceneNode, object: &Entity, frame: &ObjectFrame<'_>) {
        if let Entity::Explosion(explosion) = object {
            Self::paint(node, explosion, frame.settings);
            node.set_uniform_scale(explosion.scale());
        }
    }
}

impl ObjectUpdateHook for ExplosionsLayer {
    fn update_object_frame(
        &mut self,
        node: &mut SceneNode,
        object: &Entity,
        frame: &ObjectFrame<'_>,
    ) {
        if let Entity::Explosion(explosion) = object {
            Self::paint(node, explosion, frame.settings);
            if explosion.variable_scale() {
                node.set_uniform_scale(explosion.scale());
            }
        }
    }
}

// ============================================================================
// HEATMAP
// ============================================================================

/// Publishes explosions as heat points weighted by their inflation factor.
///
/// The heatmap is refreshed every [`HEATMAP_REFRESH_INTERVAL`] ms, and
/// immediately when it is switched on or off.
#[derive(Debug, Default)]
pub struct HeatmapLayer {
    last_refresh: Option<f64>,
    enabled: bool,
}

impl HeatmapLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GlobeLayer for HeatmapLayer {
    fn layer_name(&self) -> &str {
        "HeatMap"
    }
}

impl ExplosionSubLayer for HeatmapLayer {
    fn update_explosion_data(
        &mut self,
        globe: &mut GlobeView,
        settings: &Settings,
        data: &[ExplosionData],
        now: f64,
    ) {
        let toggled = settings.enable_heatmaps != self.enabled;
        let due = self
            .last_refresh
            .map_or(true, |at| now - at >= HEATMAP_REFRESH_INTERVAL);
        if !toggled && !due {
            return;
        }

        self.enabled = settings.enable_heatmaps;
        self.last_refresh = Some(now);
        if self.enabled {
            globe.heatmap = data
                .iter()
                .map(|e| HeatPoint {
                    lat: e.lat(),
                    lon: e.lon(),
                    weight: e.inflation_factor,
                })
                .collect();
        } else {
            globe.heatmap.clear();
        }
    }

    fn needs_custom_objects(&self, _settings: &Settings) -> bool {
        false
    }
}

// ============================================================================
// CIRCLES / POINTERS / BARS / IMAGES
// ============================================================================

#[derive(Debug, Default)]
pub struct CirclesLayer;

impl GlobeLayer for CirclesLayer {
    fn layer_name(&self) -> &str {
        "Circles"
    }
}

impl ObjectBuildHook for CirclesLayer {
    fn build_object(&mut self, node: &mut SceneNode, object: &Entity, _frame: &ObjectFrame<'_>) {
        let Entity::Circle(circle) = object else {
            return;
        };
        node.shape = NodeShape::Disc {
            color: circle.custom.color.unwrap_or(CIRCLE_COLOR),
            outline_color: circle.custom.outline_color.or(Some(CIRCLE_OUTLINE_COLOR)),
            outline_thickness: circle.custom.outline_thickness,
        };
        if let Some(radius) = circle.custom.radius {
            node.set_uniform_scale(radius / UNIT_KMS);
        }
    }
}

#[derive(Debug, Default)]
pub struct PointersLayer;

impl GlobeLayer for PointersLayer {
    fn layer_name(&self) -> &str {
        "Pointers"
    }
}

impl ObjectBuildHook for PointersLayer {
    fn build_object(&mut self, node: &mut SceneNode, object: &Entity, _frame: &ObjectFrame<'_>) {
        let Entity::Pointer(pointer) = object else {
            return;
        };
        node.shape = NodeShape::Pin {
            background: pointer.custom.background_color.unwrap_or(QUAD9_COLOR),
            border: pointer.custom.border_color.unwrap_or(POINTER_ACCENT_COLOR),
            glyph: pointer.custom.glyph_color.unwrap_or(POINTER_ACCENT_COLOR),
        };
        node.set_uniform_scale(pointer.scale());
    }
}

/// Bars stand on the surface; only the footprint is scaled by zoom.
#[derive(Debug, Default)]
pub struct BarsLayer;

impl GlobeLayer for BarsLayer {
    fn layer_name(&self) -> &str {
        "Bars"
    }
}

impl ObjectBuildHook for BarsLayer {
    fn build_object(&mut self, node: &mut SceneNode, object: &Entity, _frame: &ObjectFrame<'_>) {
        let Entity::Bar(bar) = object else {
            return;
        };
        node.shape = NodeShape::Bar {
            height: bar.custom.height / UNIT_KMS,
            diameter: bar.custom.diameter.map_or(1.0, |d| d / UNIT_KMS),
            bottom_color: bar.custom.bottom_color.unwrap_or(DEFAULT_CRITICAL_COLOR),
            top_color: bar.custom.top_color.unwrap_or(DEFAULT_CRITICAL_COLOR),
        };
    }
}

#[derive(Debug, Default)]
pub struct DownloadedObjectsLayer;

impl GlobeLayer for DownloadedObjectsLayer {
    fn layer_name(&self) -> &str {
        "DownloadedObjects"
    }
}

impl ObjectBuildHook for DownloadedObjectsLayer {
    fn build_object(&mut self, node: &mut SceneNode, object: &Entity, _frame: &ObjectFrame<'_>) {
        let Entity::Downloaded(downloaded) = object else {
            return;
        };
        let Some(image) = &downloaded.image else {
            return;
        };
        node.shape = NodeShape::Image {
            width: image.width,
            height: image.height,
        };
        node.scale.x *= downloaded.scale();
        node.scale.y *= downloaded.scale();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globe_entities::{BarCustomization, BarData, CircleCustomization, CircleData};
    use crate::globe_explosion::{ExplosionCustomization, EXPLOSION_COLOR_DARK};
    use crate::globe_lifecycle::CommonFields;
    use crate::globe_view::CameraState;
    use approx::assert_relative_eq;

    fn frame(settings: &Settings) -> ObjectFrame<'_> {
        ObjectFrame {
            settings,
            camera: CameraState::default(),
            now: 0.0,
        }
    }

    fn explosion(lat: f64, factor: f64) -> ExplosionData {
        ExplosionData::new(
            CommonFields {
                lat,
                ..Default::default()
            },
            ExplosionCustomization::default(),
            Some(factor),
            0.0,
        )
    }

    #[test]
    fn test_explosion_dot_uses_theme_colors() {
        let settings = Settings::default();
        let e: Entity = explosion(0.0, 1.0).into();
        let mut node = SceneNode::for_object(&e);
        ExplosionsLayer::new().build_object(&mut node, &e, &frame(&settings));

        match node.shape {
            NodeShape::Dot {
                end_color,
                lerp_factor,
                outline,
                ..
            } => {
                assert_eq!(end_color, EXPLOSION_COLOR_DARK);
                assert_relative_eq!(lerp_factor, 1.0);
                assert!(outline);
            }
            ref other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_explosions_need_objects_only_when_enabled() {
        let layer = ExplosionsLayer::new();
        let mut settings = Settings::default();
        assert!(layer.needs_custom_objects(&settings));
        settings.set_enable_event_explosions(false);
        assert!(!layer.needs_custom_objects(&settings));
    }

    #[test]
    fn test_heatmap_refreshes_on_interval_and_toggle() {
        let mut layer = HeatmapLayer::new();
        let mut settings = Settings::default();
        settings.set_enable_heatmaps(true);
        let mut globe = GlobeView::new();

        layer.update_explosion_data(&mut globe, &settings, &[explosion(1.0, 2.5)], 0.0);
        assert_eq!(globe.heatmap.len(), 1);
        assert_relative_eq!(globe.heatmap[0].weight, 2.5);

        // Within the interval nothing changes
        let two = [explosion(1.0, 1.0), explosion(2.0, 1.0)];
        layer.update_explosion_data(&mut globe, &settings, &two, 1000.0);
        assert_eq!(globe.heatmap.len(), 1);

        layer.update_explosion_data(&mut globe, &settings, &two, 3000.0);
        assert_eq!(globe.heatmap.len(), 2);

        settings.set_enable_heatmaps(false);
        layer.update_explosion_data(&mut globe, &settings, &two, 3100.0);
        assert!(globe.heatmap.is_empty());
    }

    #[test]
    fn test_circle_radius_in_world_units() {
        let settings = Settings::default();
        let c: Entity = CircleData::new(
            CommonFields::default(),
            CircleCustomization {
                radius: Some(UNIT_KMS * 3.0),
                ..Default::default()
            },
            0.0,
        )
        .into();
        let mut node = SceneNode::for_object(&c);
        CirclesLayer.build_object(&mut node, &c, &frame(&settings));
        assert_relative_eq!(node.scale.x, 3.0, epsilon = 1e-9);
        assert!(matches!(node.shape, NodeShape::Disc { color, .. } if color == CIRCLE_COLOR));
    }

    #[test]
    fn test_build_layers_ignore_foreign_kinds() {
        let settings = Settings::default();
        let bar: Entity = BarData::new(
            CommonFields::default(),
            BarCustomization {
                height: 500.0,
                ..Default::default()
            },
            0.0,
        )
        .into();
        let mut node = SceneNode::for_object(&bar);
        CirclesLayer.build_object(&mut node, &bar, &frame(&settings));
        PointersLayer.build_object(&mut node, &bar, &frame(&settings));
        assert_eq!(node.shape, NodeShape::Empty);

        BarsLayer.build_object(&mut node, &bar, &frame(&settings));
        match node.shape {
            NodeShape::Bar { height, diameter, .. } => {
                assert_relative_eq!(height, 500.0 / UNIT_KMS);
                assert_relative_eq!(diameter, 1.0);
            }
            ref other => panic!("unexpected shape {:?}", other),
        }
    }
}
