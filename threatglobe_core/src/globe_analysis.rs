//! Analysis mode: aggregates recent events into H3 hexagonal bins.
//!
//! Every accepted entity leaves a sample that lives for the configured decay
//! window. When analysis mode is on, the data tick sums live samples per H3
//! cell and publishes one [`HexBin`] per occupied cell.

use crate::globe_entities::{AnalysisModeData, Entity};
use crate::globe_lifecycle::{EntityKind, PointData, DEFAULT_GLOBE_RADIUS, UNIT_KMS};
use crate::globe_registry::{
    DataUpdateHook, GlobeLayer, NewDataHook, PreUpdateHook, SettingsHook,
};
use crate::globe_sorted::{map_and_filter_with, FilterOptions};
use crate::globe_view::{GlobeView, HexBin};
use crate::settings::Settings;
use h3o::{CellIndex, LatLng, Resolution};
use std::collections::BTreeMap;
use tracing::warn;

/// Holds the decaying samples and bins them on demand.
#[derive(Debug, Default)]
pub struct AnalysisModeLayer {
    samples: Vec<AnalysisModeData>,
    decay_ms: f64,
    total_weight: f64,
    last_tick: f64,
}

impl AnalysisModeLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[AnalysisModeData] {
        &self.samples
    }

    /// Sum of the weights of every live sample, as of the last pre-update.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Bins the live samples at `settings.analysis_mode_resolution`.
    ///
    /// Samples at invalid coordinates are skipped.
    pub fn bin(&self, settings: &Settings) -> Vec<HexBin> {
        let resolution = match Resolution::try_from(settings.analysis_mode_resolution) {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!("Analysis mode disabled: {}", e);
                return Vec::new();
            }
        };

        let mut sums: BTreeMap<CellIndex, f64> = BTreeMap::new();
        for sample in &self.samples {
            match LatLng::new(sample.lat(), sample.lon()) {
                Ok(position) => *sums.entry(position.to_cell(resolution)).or_insert(0.0) += sample.weight(),
                Err(e) => warn!("Analysis sample {} skipped: {}", sample.id(), e),
            }
        }

        sums.into_iter()
            .map(|(cell, weight)| {
                let center = LatLng::from(cell);
                let intensity = intensity(weight, settings.analysis_mode_max_height_count);
                HexBin {
                    cell,
                    lat: center.lat(),
                    lon: center.lng(),
                    weight,
                    color: settings
                        .analysis_mode_start_color
                        .lerp(settings.analysis_mode_end_color, intensity.min(1.0)),
                    altitude: bin_altitude(intensity, settings.analysis_mode_max_height_kms),
                }
            })
            .collect()
    }
}

/// `ln(sum) / ln(max_count)`; the scale saturates at `max_count`.
fn intensity(sum: f64, max_count: f64) -> f64 {
    if max_count <= 1.0 {
        return 1.0;
    }
    sum.ln() / max_count.ln()
}

/// Altitude in globe-radius units, never below a hairline.
fn bin_altitude(intensity: f64, max_height_kms: f64) -> f64 {
    (intensity * max_height_kms / UNIT_KMS / DEFAULT_GLOBE_RADIUS)
        .max(0.01 / UNIT_KMS / DEFAULT_GLOBE_RADIUS)
}

impl GlobeLayer for AnalysisModeLayer {
    fn layer_name(&self) -> &str {
        "AnalysisMode"
    }
}

impl SettingsHook for AnalysisModeLayer {
    fn attach_to_settings(&mut self, settings: &mut Settings) {
        self.decay_ms = settings.analysis_decay_ms();
    }
}

impl PreUpdateHook for AnalysisModeLayer {
    fn pre_update(&mut self, now: f64) {
        self.last_tick = now;
        let mut total = 0.0;
        map_and_filter_with(&mut self.samples, now, FilterOptions::default(), |sample| {
            total += sample.weight();
        });
        self.total_weight = total;
    }
}

impl NewDataHook for AnalysisModeLayer {
    fn should_take_point(&self, point: &Entity) -> bool {
        !matches!(
            point.kind(),
            EntityKind::Arc | EntityKind::ArcLabel | EntityKind::AnalysisBin
        )
    }

    fn take_new_point(&mut self, point: Entity) {
        self.samples
            .push(AnalysisModeData::from_point(&point, self.decay_ms, self.last_tick));
    }
}

impl DataUpdateHook for AnalysisModeLayer {
    fn update_data(&mut self, globe: &mut GlobeView, settings: &Settings, _now: f64) {
        self.decay_ms = settings.analysis_decay_ms();
        if settings.enable_analysis_mode {
            globe.hex_bins = self.bin(settings);
        } else {
            globe.hex_bins.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globe_entities::{ArcCustomization, ArcData, CircleData};
    use crate::globe_lifecycle::CommonFields;
    use approx::assert_relative_eq;

    fn circle(lat: f64, lon: f64, counter: f64) -> Entity {
        CircleData::new(
            CommonFields {
                lat,
                lon,
                counter: Some(counter),
                ..Default::default()
            },
            Default::default(),
            0.0,
        )
        .into()
    }

    fn layer(settings: &mut Settings) -> AnalysisModeLayer {
        let mut layer = AnalysisModeLayer::new();
        layer.attach_to_settings(settings);
        layer
    }

    #[test]
    fn test_samples_share_a_cell() {
        let mut settings = Settings::default();
        settings.set_enable_analysis_mode(true);
        let mut layer = layer(&mut settings);

        layer.take_new_point(circle(48.8566, 2.3522, 3.0));
        layer.take_new_point(circle(48.8567, 2.3523, 4.0));
        layer.take_new_point(circle(-33.8688, 151.2093, 1.0));

        let mut globe = GlobeView::new();
        layer.update_data(&mut globe, &settings, 0.0);
        assert_eq!(globe.hex_bins.len(), 2);

        let paris = globe
            .hex_bins
            .iter()
            .find(|b| b.weight == 7.0)
            .expect("merged bin");
        assert_relative_eq!(paris.lat, 48.8566, epsilon = 1.0);
        assert_eq!(paris.cell.resolution(), Resolution::Three);

        let sydney = globe.hex_bins.iter().find(|b| b.weight == 1.0).expect("single bin");
        assert_eq!(sydney.color, settings.analysis_mode_start_color);
        assert_relative_eq!(sydney.altitude, 0.01 / UNIT_KMS / DEFAULT_GLOBE_RADIUS);
    }

    #[test]
    fn test_samples_decay() {
        let mut settings = Settings::default();
        settings.set_analysis_mode_decay(1.0);
        let mut layer = layer(&mut settings);
        layer.take_new_point(circle(10.0, 10.0, 2.0));
        layer.pre_update(500.0);
        assert_relative_eq!(layer.total_weight(), 2.0);
        layer.pre_update(1500.0);
        assert!(layer.samples().is_empty());
        assert_relative_eq!(layer.total_weight(), 0.0);
    }

    #[test]
    fn test_bins_hidden_when_disabled() {
        let mut settings = Settings::default();
        settings.set_enable_analysis_mode(false);
        let mut layer = layer(&mut settings);
        layer.take_new_point(circle(10.0, 10.0, 1.0));
        let mut globe = GlobeView::new();
        layer.update_data(&mut globe, &settings, 0.0);
        assert!(globe.hex_bins.is_empty());
    }

    #[test]
    fn test_arcs_are_not_sampled() {
        let mut settings = Settings::default();
        let layer = layer(&mut settings);
        let arc: Entity = ArcData::new(
            CommonFields::default(),
            ArcCustomization::default(),
            0.0,
        )
        .into();
        assert!(!layer.should_take_point(&arc));
        assert!(layer.should_take_point(&circle(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_intensity_saturates_color() {
        let mut settings = Settings::default();
        settings.set_analysis_mode_max_height_count(10.0);
        let mut layer = layer(&mut settings);
        layer.take_new_point(circle(10.0, 10.0, 100.0));
        let bins = layer.bin(&settings);
        assert_eq!(bins[0].color, settings.analysis_mode_end_color);
        assert_relative_eq!(
            bins[0].altitude,
            2.0 * settings.analysis_mode_max_height_kms / UNIT_KMS / DEFAULT_GLOBE_RADIUS,
            epsilon = 1e-9
        );
    }
}
