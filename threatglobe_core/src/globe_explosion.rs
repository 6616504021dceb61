//! Explosion entities - the default visualization of a threat event.
//!
//! An explosion is a dot whose size follows a non-monotonic curve over its
//! lifetime fraction `f`:
//!
//! ```text
//!  scale
//!    ▲         max = 2·initial_radius·IF
//!    │        ╱╲
//!    │       ╱  ╲  quick deflate
//!    │      ╱    ╲________________ held = 0.5·IF·fallback_radius
//!    │  ___╱ inflate              ╲
//!    │ 1                           ╲  slow deflate
//!    │                              ╲
//!    └─────┬────┬────────────────┬────╲───▶ f
//!          0  infl  infl+defl   0.5    1
//! ```
//!
//! Inflation only happens when the inflation factor `IF` exceeds 1, i.e. the
//! event's counter exceeds 1 and counter scaling is enabled. Otherwise the
//! dot starts at its maximum and deflates straight away.

use crate::color::{Rgba, DEFAULT_CRITICAL_COLOR, QUAD9_COLOR};
use crate::globe_lifecycle::{
    lerp, CommonData, CommonFields, EntityKind, PointData, KM_TO_LATITUDE, KM_TO_LONGITUDE,
    UNIT_KMS,
};
use crate::settings::Settings;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximum random spawn delay (ms).
pub const MAX_SPAWN_DELAY_MS: f64 = 5000.0;

/// Maximum random location offset (km) in each axis.
pub const RANDOM_OFFSET_MAX_KM: f64 = 20.0;

/// Default share of the lifetime spent inflating.
pub const DEFAULT_INFLATION_LIFETIME_FRACTION: f64 = 0.02;

/// Default share of the lifetime spent in the quick deflation.
pub const DEFAULT_DEFLATION_LIFETIME_FRACTION: f64 = 0.07;

/// Total lifetime (ms) when no fallback interval is given.
pub const DEFAULT_TOTAL_POINT_LIFETIME: f64 = 15000.0;

/// Label lifetime (ms) for an explosion of default total lifetime.
pub const DEFAULT_LABEL_LIFETIME: f64 = 5000.0;

pub const EXPLOSION_COLOR_DARK: Rgba = QUAD9_COLOR;
pub const EXPLOSION_INFLATING_COLOR_DARK: Rgba = DEFAULT_CRITICAL_COLOR;
pub const EXPLOSION_COLOR_LIGHT: Rgba = Rgba::rgb(0x32, 0x87, 0x08);
pub const EXPLOSION_INFLATING_COLOR_LIGHT: Rgba = Rgba::rgb(0x5e, 0xdc, 0x20);

const INITIAL_LIFETIME_FRACTION: f64 =
    DEFAULT_INFLATION_LIFETIME_FRACTION + DEFAULT_DEFLATION_LIFETIME_FRACTION;

// ============================================================================
// DATA
// ============================================================================

/// Explosion-specific inbound fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplosionCustomization {
    /// Color while inflating
    pub initial_color: Option<Rgba>,
    /// Length of inflation + quick deflation (ms)
    pub initial_radius_interval: Option<f64>,
    /// Peak radius (km)
    pub initial_radius_size: Option<f64>,
    /// Color once deflated
    pub fallback_color: Option<Rgba>,
    /// Length of the held + slow deflation phases (ms)
    pub fallback_radius_interval: Option<f64>,
    /// Held radius (km)
    pub fallback_radius_size: Option<f64>,
}

/// Phase of the explosion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplosionPhase {
    Scheduled,
    Inflating,
    QuickDeflate,
    Held,
    SlowDeflate,
    Expired,
}

/// A threat event drawn as an inflating/deflating dot.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplosionData {
    pub common: CommonData,
    pub custom: ExplosionCustomization,

    /// Scale multiplier derived from the event counter (1 = no inflation)
    pub inflation_factor: f64,

    /// Lifetime fraction after which the label disappears
    pub label_expiry_fraction: f64,

    /// Lifetime fraction spent inflating
    pub inflation_fraction: f64,

    /// Lifetime fraction spent in the quick deflation
    pub deflation_fraction: f64,

    /// Peak radius in world units
    pub initial_radius: f64,

    /// Held radius in world units
    pub fallback_radius: f64,
}

impl ExplosionData {
    /// Creates an explosion starting at `now`.
    ///
    /// The record's `ttl` is ignored: the total lifetime is derived from the
    /// radius intervals.
    ///
    /// # Arguments
    /// * `fields` - Shared inbound fields
    /// * `custom` - Explosion-specific fields
    /// * `inflation_factor` - `None` means 1 (no inflation)
    /// * `now` - Current time (ms)
    pub fn new(
        fields: CommonFields,
        custom: ExplosionCustomization,
        inflation_factor: Option<f64>,
        now: f64,
    ) -> Self {
        let mut common = CommonData::from_fields(fields, None, now);

        let total = match custom.fallback_radius_interval {
            Some(fallback) if fallback != 0.0 => {
                fallback
                    + custom
                        .initial_radius_interval
                        .unwrap_or(fallback * INITIAL_LIFETIME_FRACTION)
            }
            _ => DEFAULT_TOTAL_POINT_LIFETIME,
        };
        common.life.total_lifetime = total;

        let label_expiry_fraction = common
            .label
            .interval
            .unwrap_or(DEFAULT_LABEL_LIFETIME / DEFAULT_TOTAL_POINT_LIFETIME * total)
            / total;

        let initial_lifetime_fraction = match custom.initial_radius_interval {
            Some(interval) if interval != 0.0 => interval / total,
            _ => INITIAL_LIFETIME_FRACTION,
        };

        let initial_radius = radius_from_km(custom.initial_radius_size);
        let fallback_radius = radius_from_km(custom.fallback_radius_size);

        Self {
            common,
            custom,
            inflation_factor: inflation_factor.unwrap_or(1.0),
            label_expiry_fraction,
            inflation_fraction: initial_lifetime_fraction * DEFAULT_INFLATION_LIFETIME_FRACTION
                / INITIAL_LIFETIME_FRACTION,
            deflation_fraction: initial_lifetime_fraction * DEFAULT_DEFLATION_LIFETIME_FRACTION
                / INITIAL_LIFETIME_FRACTION,
            initial_radius,
            fallback_radius,
        }
    }

    /// Creates an explosion whose inflation factor follows the counter-scaling settings.
    pub fn with_settings(
        fields: CommonFields,
        custom: ExplosionCustomization,
        settings: &Settings,
        now: f64,
    ) -> Self {
        let factor = inflation_factor_for(fields.counter.unwrap_or(1.0), settings);
        Self::new(fields, custom, Some(factor), now)
    }

    fn fraction(&self) -> f64 {
        self.common.life.fraction()
    }

    /// Shifts the location by up to [`RANDOM_OFFSET_MAX_KM`] in each axis.
    ///
    /// # Arguments
    /// * `r_lat`, `r_lon` - Uniform samples in `[0, 1)`
    pub fn randomize_location(&mut self, r_lat: f64, r_lon: f64) {
        self.common.lat += r_lat * 2.0 * RANDOM_OFFSET_MAX_KM * KM_TO_LATITUDE
            - RANDOM_OFFSET_MAX_KM * KM_TO_LATITUDE;
        self.common.lon += r_lon * 2.0 * RANDOM_OFFSET_MAX_KM * KM_TO_LONGITUDE
            - RANDOM_OFFSET_MAX_KM * KM_TO_LONGITUDE;
    }

    /// Postpones the appearance by up to [`MAX_SPAWN_DELAY_MS`].
    ///
    /// # Arguments
    /// * `r` - Uniform sample in `[0, 1)`
    pub fn randomize_spawn_time(&mut self, r: f64) {
        self.common.life.postpone(r * MAX_SPAWN_DELAY_MS);
    }

    /// Current phase of the state machine.
    pub fn phase(&self) -> ExplosionPhase {
        let f = self.fraction();
        let inflates = self.inflation_factor > 1.0;
        let infl_offset = if inflates { self.inflation_fraction } else { 0.0 };

        if self.common.life.expired() {
            ExplosionPhase::Expired
        } else if f < 0.0 {
            ExplosionPhase::Scheduled
        } else if inflates && f < self.inflation_fraction {
            ExplosionPhase::Inflating
        } else if f > 0.5 {
            ExplosionPhase::SlowDeflate
        } else if f > self.deflation_fraction + infl_offset {
            ExplosionPhase::Held
        } else {
            ExplosionPhase::QuickDeflate
        }
    }

    /// True while inflating or in the quick deflation.
    pub fn needs_outline(&self) -> bool {
        self.fraction() < self.inflation_fraction + self.deflation_fraction
    }

    pub fn needs_color_lerp(&self) -> bool {
        self.inflation_factor > 1.0
            && self.fraction() < self.deflation_fraction + self.inflation_fraction
    }

    /// Blend factor from the start color (0) to the end color (1).
    pub fn color_lerp_factor(&self) -> f64 {
        if !self.needs_color_lerp() {
            1.0
        } else if self.fraction() < self.inflation_fraction {
            0.0
        } else {
            self.fraction() / (self.deflation_fraction + self.inflation_fraction)
        }
    }

    pub fn start_color(&self, default: Rgba) -> Rgba {
        self.custom.initial_color.unwrap_or(default)
    }

    pub fn end_color(&self, default: Rgba) -> Rgba {
        self.custom.fallback_color.unwrap_or(default)
    }

    /// Color to draw right now, given the scheme defaults.
    pub fn current_color(&self, default_start: Rgba, default_end: Rgba) -> Rgba {
        self.start_color(default_start)
            .lerp(self.end_color(default_end), self.color_lerp_factor())
    }
}

impl PointData for ExplosionData {
    fn common(&self) -> &CommonData {
        &self.common
    }
    fn common_mut(&mut self) -> &mut CommonData {
        &mut self.common
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Explosion
    }

    fn scale(&self) -> f64 {
        let f = self.fraction();
        let factor = self.inflation_factor;
        let infl_offset = if factor > 1.0 { self.inflation_fraction } else { 0.0 };
        let peak = 2.0 * self.initial_radius * factor;
        let held = 0.5 * factor * self.fallback_radius;

        if factor > 1.0 && f < self.inflation_fraction {
            lerp(1.0, peak, (f / self.inflation_fraction).powi(2))
        } else if f > 0.5 {
            (1.0 - f) * factor * self.fallback_radius
        } else if f > self.deflation_fraction + infl_offset {
            held
        } else {
            let deflation_progress = f - infl_offset;
            lerp(held, peak, 1.0 - deflation_progress / self.deflation_fraction)
        }
    }

    fn label_scale(&self) -> f64 {
        1.0 / self.scale()
    }

    fn scale_z(&self) -> bool {
        true
    }

    fn apply_global_scale(&self) -> bool {
        // Explosions provide their own scale
        false
    }

    fn variable_scale(&self) -> bool {
        true
    }

    fn label_expired(&self) -> bool {
        self.fraction() > self.label_expiry_fraction
    }
}

/// Inflation factor for an event weight under the given settings.
pub fn inflation_factor_for(counter: f64, settings: &Settings) -> f64 {
    if counter == 1.0 || !settings.enable_counter_scaling {
        return 1.0;
    }
    let max_counter = settings.maximum_scale_counter;
    lerp(
        1.0,
        settings.maximum_scale,
        counter.clamp(1.0, max_counter) / max_counter,
    )
}

fn radius_from_km(size: Option<f64>) -> f64 {
    match size {
        Some(km) if km != 0.0 => km / UNIT_KMS,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn explosion(inflation_factor: f64) -> ExplosionData {
        ExplosionData::new(
            CommonFields {
                lat: 10.0,
                lon: 10.0,
                ..Default::default()
            },
            ExplosionCustomization::default(),
            Some(inflation_factor),
            0.0,
        )
    }

    fn at_fraction(e: &mut ExplosionData, f: f64) {
        let t = f * e.common.life.total_lifetime;
        let _ = e.update(t);
    }

    #[test]
    fn test_default_timing() {
        let e = explosion(1.0);
        assert_relative_eq!(e.common.life.total_lifetime, DEFAULT_TOTAL_POINT_LIFETIME);
        assert_relative_eq!(e.inflation_fraction, 0.02, epsilon = 1e-12);
        assert_relative_eq!(e.deflation_fraction, 0.07, epsilon = 1e-12);
        assert_relative_eq!(e.label_expiry_fraction, 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(e.initial_radius, 1.0);
        assert_relative_eq!(e.fallback_radius, 1.0);
    }

    #[test]
    fn test_ttl_ignored_for_explosions() {
        let e = ExplosionData::new(
            CommonFields {
                ttl: Some(100.0),
                ..Default::default()
            },
            ExplosionCustomization::default(),
            None,
            0.0,
        );
        assert_relative_eq!(e.common.life.total_lifetime, DEFAULT_TOTAL_POINT_LIFETIME);
    }

    #[test]
    fn test_custom_intervals() {
        let custom = ExplosionCustomization {
            initial_radius_interval: Some(1000.0),
            fallback_radius_interval: Some(9000.0),
            initial_radius_size: Some(UNIT_KMS * 3.0),
            fallback_radius_size: Some(UNIT_KMS * 2.0),
            ..Default::default()
        };
        let e = ExplosionData::new(CommonFields::default(), custom, None, 0.0);
        assert_relative_eq!(e.common.life.total_lifetime, 10000.0);
        // 0.1 of the lifetime split 2:7
        assert_relative_eq!(e.inflation_fraction, 0.1 * 2.0 / 9.0, epsilon = 1e-12);
        assert_relative_eq!(e.deflation_fraction, 0.1 * 7.0 / 9.0, epsilon = 1e-12);
        assert_relative_eq!(e.initial_radius, 3.0, epsilon = 1e-12);
        assert_relative_eq!(e.fallback_radius, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fallback_interval_without_initial() {
        let custom = ExplosionCustomization {
            fallback_radius_interval: Some(10000.0),
            ..Default::default()
        };
        let e = ExplosionData::new(CommonFields::default(), custom, None, 0.0);
        assert_relative_eq!(e.common.life.total_lifetime, 10900.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inflating_scale_curve() {
        let mut e = explosion(2.0);

        at_fraction(&mut e, 0.0);
        assert_relative_eq!(e.scale(), 1.0);
        assert_eq!(e.phase(), ExplosionPhase::Inflating);

        let f = e.inflation_fraction;
        at_fraction(&mut e, f);
        let peak = e.scale();
        assert_relative_eq!(peak, 4.0, epsilon = 1e-9);

        // Local maximum: slightly before and after are smaller
        let f = e.inflation_fraction;
        at_fraction(&mut e, f * 0.95);
        assert!(e.scale() < peak);
        at_fraction(&mut e, f * 1.05);
        assert!(e.scale() < peak);

        at_fraction(&mut e, 0.3);
        assert_relative_eq!(e.scale(), 1.0, epsilon = 1e-9);
        assert_eq!(e.phase(), ExplosionPhase::Held);

        at_fraction(&mut e, 0.75);
        assert_relative_eq!(e.scale(), 0.5, epsilon = 1e-9);
        assert_eq!(e.phase(), ExplosionPhase::SlowDeflate);

        at_fraction(&mut e, 1.0);
        assert_relative_eq!(e.scale(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_inflation_starts_at_peak() {
        let mut e = explosion(1.0);
        at_fraction(&mut e, 0.0);
        assert_relative_eq!(e.scale(), 2.0, epsilon = 1e-9);
        assert_eq!(e.phase(), ExplosionPhase::QuickDeflate);

        let f = e.deflation_fraction;
        at_fraction(&mut e, f);
        assert_relative_eq!(e.scale(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_scheduled_phase_and_visibility() {
        let mut e = explosion(1.0);
        e.randomize_spawn_time(0.5);
        assert_relative_eq!(e.common.life.start_time, 2500.0);
        assert_eq!(e.phase(), ExplosionPhase::Scheduled);
        assert!(!e.visible());

        let _ = e.update(2500.0);
        assert!(e.visible());
    }

    #[test]
    fn test_color_lerp() {
        let mut e = explosion(2.0);
        at_fraction(&mut e, 0.01);
        assert!(e.needs_color_lerp());
        assert_relative_eq!(e.color_lerp_factor(), 0.0);
        assert_eq!(
            e.current_color(EXPLOSION_INFLATING_COLOR_DARK, EXPLOSION_COLOR_DARK),
            EXPLOSION_INFLATING_COLOR_DARK
        );

        at_fraction(&mut e, 0.045);
        assert_relative_eq!(e.color_lerp_factor(), 0.5, epsilon = 1e-9);

        at_fraction(&mut e, 0.2);
        assert!(!e.needs_color_lerp());
        assert!(!e.needs_outline());
        assert_relative_eq!(e.color_lerp_factor(), 1.0);
    }

    #[test]
    fn test_label_expiry_and_scale() {
        let mut e = explosion(1.0);
        at_fraction(&mut e, 0.3);
        assert!(!e.label_expired());
        assert_relative_eq!(e.label_scale(), 1.0 / e.scale());
        at_fraction(&mut e, 0.34);
        assert!(e.label_expired());
    }

    #[test]
    fn test_randomize_location_bounds() {
        let mut e = explosion(1.0);
        e.randomize_location(0.0, 0.9999);
        assert_relative_eq!(e.common.lat, 10.0 - 20.0 * KM_TO_LATITUDE, epsilon = 1e-12);
        assert!(e.common.lon < 10.0 + 20.0 * KM_TO_LONGITUDE);
        assert!(e.common.lon > 10.0);
    }

    #[test]
    fn test_inflation_factor_settings() {
        let mut settings = Settings::default();
        assert_relative_eq!(inflation_factor_for(1.0, &settings), 1.0);
        assert_relative_eq!(inflation_factor_for(20.0, &settings), 2.5);
        assert_relative_eq!(inflation_factor_for(100.0, &settings), 2.5);
        assert_relative_eq!(inflation_factor_for(10.0, &settings), 1.75);

        settings.set_enable_counter_scaling(false);
        assert_relative_eq!(inflation_factor_for(10.0, &settings), 1.0);
    }

    #[test]
    fn test_fractional_counter_inflates() {
        let settings = Settings::default();
        assert_relative_eq!(inflation_factor_for(1.5, &settings), 1.1125, epsilon = 1e-12);
        // Below one clamps to the bottom of the ramp
        assert_relative_eq!(inflation_factor_for(0.5, &settings), 1.075, epsilon = 1e-12);

        let e = ExplosionData::with_settings(
            CommonFields {
                counter: Some(1.5),
                ..CommonFields::default()
            },
            ExplosionCustomization::default(),
            &settings,
            0.0,
        );
        assert_relative_eq!(e.inflation_factor, 1.1125, epsilon = 1e-12);
        assert!(e.inflation_factor > 1.0);
    }

    #[test]
    fn test_update_idempotent() {
        let mut e = explosion(2.0);
        let _ = e.update(123.0);
        let first = (e.visible(), e.scale());
        let _ = e.update(123.0);
        assert_eq!(first, (e.visible(), e.scale()));
    }
}
