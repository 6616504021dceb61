//! Ground truth event stream for simulation.
//!
//! The oracle plays the event service: it emits raw JSON records the way
//! the live feed would and remembers what it emitted, so the runner can
//! check the engine's counters against the truth.
//! - Poisson arrivals at a configurable rate
//! - Locations clustered around weighted hotspots
//! - A configurable mix of record types
//! - Malformed and location-less records at a configurable rate

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Poisson, StandardNormal};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Event sources, used as a filterable field.
pub const SOURCES: &[&str] = &["dns", "scanner", "botnet", "phishing"];

/// A cluster of activity.
#[derive(Debug, Clone, Serialize)]
pub struct Hotspot {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
    /// Standard deviation of the scatter, in degrees
    pub spread_deg: f64,
    /// Relative share of the clustered events
    pub weight: f64,
}

impl Hotspot {
    /// A handful of busy regions.
    pub fn defaults() -> Vec<Hotspot> {
        vec![
            Hotspot { name: "frankfurt", lat: 50.11, lon: 8.68, spread_deg: 2.0, weight: 3.0 },
            Hotspot { name: "virginia", lat: 38.95, lon: -77.45, spread_deg: 3.0, weight: 3.0 },
            Hotspot { name: "singapore", lat: 1.35, lon: 103.82, spread_deg: 1.5, weight: 2.0 },
            Hotspot { name: "sao_paulo", lat: -23.55, lon: -46.63, spread_deg: 2.5, weight: 1.0 },
        ]
    }
}

/// Relative weights of the record types.
#[derive(Debug, Clone, Serialize)]
pub struct TypeMix {
    pub explosion: f64,
    pub circle: f64,
    pub pointer: f64,
    pub bar: f64,
    pub downloaded: f64,
    pub arc: f64,
}

impl TypeMix {
    /// Explosions only.
    pub fn explosions() -> Self {
        Self {
            explosion: 1.0,
            circle: 0.0,
            pointer: 0.0,
            bar: 0.0,
            downloaded: 0.0,
            arc: 0.0,
        }
    }

    /// Every type, explosions dominant.
    pub fn mixed() -> Self {
        Self {
            explosion: 5.0,
            circle: 1.0,
            pointer: 1.0,
            bar: 1.0,
            downloaded: 0.5,
            arc: 1.0,
        }
    }

    fn weights(&self) -> [f64; 6] {
        [
            self.explosion,
            self.circle,
            self.pointer,
            self.bar,
            self.downloaded,
            self.arc,
        ]
    }
}

const TYPE_NAMES: [&str; 6] = ["explosion", "circle", "pointer", "bar", "downloaded", "arc"];

/// Oracle configuration.
#[derive(Debug, Clone, Serialize)]
pub struct OracleConfig {
    /// Mean records per second
    pub rate_per_sec: f64,

    /// Share of events drawn from hotspots; the rest is uniform
    pub hotspot_share: f64,

    pub hotspots: Vec<Hotspot>,

    pub type_mix: TypeMix,

    /// Probability that a record is malformed
    pub malformed_rate: f64,

    /// Probability that a well-formed record carries the (0, 0) sentinel
    pub no_location_rate: f64,

    /// Counters are drawn uniformly from `1..=max_counter`
    pub max_counter: i64,

    /// Record time-to-live in ms
    pub ttl_ms: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 20.0,
            hotspot_share: 0.7,
            hotspots: Hotspot::defaults(),
            type_mix: TypeMix::explosions(),
            malformed_rate: 0.0,
            no_location_rate: 0.0,
            max_counter: 5,
            ttl_ms: 8000.0,
        }
    }
}

/// One record handed to the engine.
#[derive(Debug, Clone)]
pub struct EmittedRecord {
    /// Raw JSON, exactly as the engine receives it
    pub raw: String,
    /// Record type, `None` when malformed
    pub kind: Option<&'static str>,
    /// Event weight the engine should count, 0 when malformed
    pub counter: i64,
    pub source: &'static str,
    pub has_location: bool,
}

impl EmittedRecord {
    pub fn is_malformed(&self) -> bool {
        self.kind.is_none()
    }
}

/// What the oracle has emitted so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OracleTotals {
    pub records: u64,
    pub malformed: u64,
    pub no_location: u64,
    /// Sum of the counters of every well-formed record
    pub counter_sum: i64,
}

/// The Oracle - generates the synthetic event feed.
pub struct EventOracle {
    rng: ChaCha8Rng,
    config: OracleConfig,
    totals: OracleTotals,
    current_time_ms: f64,
}

impl EventOracle {
    /// Creates a new oracle with the given seed.
    ///
    /// Note: keep this seed apart from the context seed, so changing the
    /// jitter does not change the event stream.
    pub fn new(seed: u64, config: OracleConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            totals: OracleTotals::default(),
            current_time_ms: 0.0,
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Changes the arrival rate, e.g. for a burst.
    pub fn set_rate(&mut self, rate_per_sec: f64) {
        self.config.rate_per_sec = rate_per_sec;
    }

    pub fn totals(&self) -> OracleTotals {
        self.totals
    }

    /// Simulation time of the last step (ms).
    pub fn time_ms(&self) -> f64 {
        self.current_time_ms
    }

    /// Advances by `dt_ms` and returns the records that arrived meanwhile.
    pub fn step(&mut self, dt_ms: f64) -> Vec<EmittedRecord> {
        self.current_time_ms += dt_ms;
        let lambda = self.config.rate_per_sec * dt_ms / 1000.0;
        let arrivals = match Poisson::new(lambda) {
            Ok(poisson) => {
                let n: f64 = poisson.sample(&mut self.rng);
                n as usize
            }
            // Zero or negative rate
            Err(_) => 0,
        };
        (0..arrivals).map(|_| self.emit()).collect()
    }

    /// Produces one record and books it.
    pub fn emit(&mut self) -> EmittedRecord {
        let record = if self.rng.gen_bool(self.config.malformed_rate.clamp(0.0, 1.0)) {
            self.malformed()
        } else {
            self.well_formed()
        };

        self.totals.records += 1;
        if record.is_malformed() {
            self.totals.malformed += 1;
        } else {
            self.totals.counter_sum += record.counter;
            if !record.has_location {
                self.totals.no_location += 1;
            }
        }
        record
    }

    fn location(&mut self) -> (f64, f64) {
        let hotspots = &self.config.hotspots;
        let clustered = !hotspots.is_empty() && self.rng.gen_bool(self.config.hotspot_share.clamp(0.0, 1.0));
        if clustered {
            let weights = hotspots.iter().map(|h| h.weight.max(0.0));
            if let Ok(index) = WeightedIndex::new(weights) {
                let spot = &hotspots[index.sample(&mut self.rng)];
                let dlat: f64 = self.rng.sample(StandardNormal);
                let dlon: f64 = self.rng.sample(StandardNormal);
                return (
                    (spot.lat + dlat * spot.spread_deg).clamp(-89.9, 89.9),
                    wrap(spot.lon + dlon * spot.spread_deg),
                );
            }
        }
        (
            self.rng.gen_range(-60.0..70.0),
            self.rng.gen_range(-180.0..180.0),
        )
    }

    fn well_formed(&mut self) -> EmittedRecord {
        let kind = match WeightedIndex::new(self.config.type_mix.weights()) {
            Ok(index) => TYPE_NAMES[index.sample(&mut self.rng)],
            Err(_) => "explosion",
        };
        let has_location = !self.rng.gen_bool(self.config.no_location_rate.clamp(0.0, 1.0));
        let (lat, lon) = if has_location { self.location() } else { (0.0, 0.0) };
        let counter = self.rng.gen_range(1..=self.config.max_counter.max(1));
        let source = SOURCES[self.rng.gen_range(0..SOURCES.len())];

        let mut record = Map::new();
        record.insert("lat".into(), json!(lat));
        record.insert("lon".into(), json!(lon));
        record.insert("counter".into(), json!(counter));
        record.insert("source".into(), json!(source));
        if kind != "explosion" {
            record.insert("type".into(), json!(kind));
            record.insert("ttl".into(), json!(self.config.ttl_ms));
        }
        match kind {
            "circle" => {
                record.insert("circle_radius".into(), json!(self.rng.gen_range(50.0..400.0)));
            }
            "pointer" => {
                record.insert("display_text".into(), json!(format!("{} alert", source)));
            }
            "bar" => {
                record.insert("bar_height".into(), json!(self.rng.gen_range(100.0..1500.0)));
            }
            "downloaded" => {
                record.insert(
                    "downloaded_object_url".into(),
                    json!(format!("https://img.example/{}.png", source)),
                );
            }
            "arc" => {
                let (lat2, lon2) = self.location();
                record.insert("point2_lat".into(), json!(lat2));
                record.insert("point2_lon".into(), json!(lon2));
                record.insert("arc_line_type".into(), json!("dashed_small"));
            }
            _ => {}
        }

        EmittedRecord {
            raw: Value::Object(record).to_string(),
            kind: Some(kind),
            counter,
            source,
            has_location,
        }
    }

    fn malformed(&mut self) -> EmittedRecord {
        let raw = match self.rng.gen_range(0..4) {
            0 => "{\"lat\": 12.5, \"lon\": ".to_string(),
            1 => json!({"type": "bar", "lat": 10.0, "lon": 10.0}).to_string(),
            2 => json!({"type": "downloaded", "lat": 10.0, "lon": 10.0}).to_string(),
            _ => json!(["not", "an", "object"]).to_string(),
        };
        EmittedRecord {
            raw,
            kind: None,
            counter: 0,
            source: "",
            has_location: false,
        }
    }
}

fn wrap(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = EventOracle::new(9, OracleConfig::default());
        let mut b = EventOracle::new(9, OracleConfig::default());
        let ra: Vec<String> = a.step(5000.0).into_iter().map(|r| r.raw).collect();
        let rb: Vec<String> = b.step(5000.0).into_iter().map(|r| r.raw).collect();
        assert!(!ra.is_empty());
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_rate_roughly_respected() {
        let mut oracle = EventOracle::new(1, OracleConfig::default());
        let mut total = 0;
        for _ in 0..100 {
            total += oracle.step(1000.0).len();
        }
        // 20/s over 100 s
        assert!((1600..2400).contains(&total), "got {}", total);
        assert_eq!(oracle.time_ms(), 100_000.0);
    }

    #[test]
    fn test_zero_rate_is_silent() {
        let mut oracle = EventOracle::new(1, OracleConfig::default());
        oracle.set_rate(0.0);
        assert!(oracle.step(10_000.0).is_empty());
    }

    #[test]
    fn test_totals_track_malformed() {
        let config = OracleConfig {
            malformed_rate: 1.0,
            ..Default::default()
        };
        let mut oracle = EventOracle::new(3, config);
        for _ in 0..10 {
            assert!(oracle.emit().is_malformed());
        }
        let totals = oracle.totals();
        assert_eq!(totals.records, 10);
        assert_eq!(totals.malformed, 10);
        assert_eq!(totals.counter_sum, 0);
    }

    proptest! {
        #[test]
        fn test_records_are_valid_json_objects(seed in any::<u64>()) {
            let config = OracleConfig {
                type_mix: TypeMix::mixed(),
                ..Default::default()
            };
            let mut oracle = EventOracle::new(seed, config);
            for _ in 0..20 {
                let record = oracle.emit();
                let value: Value = serde_json::from_str(&record.raw).unwrap();
                let lat = value["lat"].as_f64().unwrap();
                let lon = value["lon"].as_f64().unwrap();
                prop_assert!((-90.0..=90.0).contains(&lat));
                prop_assert!((-180.0..=180.0).contains(&lon));
                prop_assert!(record.counter >= 1);
            }
        }
    }
}
