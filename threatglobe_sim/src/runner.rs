//! Scenario runner - drives a globe runtime on virtual time against the oracle.
//!
//! Every scenario shares one loop: the oracle feeds records at each
//! ingestion tick, the counter and render ticks follow at their own
//! periods, and after the feed stops the runner keeps ticking until every
//! entity must have expired. Along the way it checks:
//! - every ingest outcome matches what the oracle knows about the record
//! - no kind shows more nodes than it has live entities
//! - live entities never outnumber the records sent
//! - the counter total equals the oracle's counted sum
//! - everything has drained once the feed has been quiet long enough

use crate::context::SimContext;
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::fetcher::SimImageFetcher;
use crate::oracle::{EmittedRecord, EventOracle, OracleConfig, TypeMix};
use crate::scenarios::ScenarioId;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use threatglobe_core::{EntityKind, GlobeRuntime, Ingested, RuntimeConfig, Settings};
use threatglobe_env::GlobeContext;
use tracing::{debug, info, warn};

#[cfg(feature = "dashboard")]
use crossbeam::channel::Sender;
#[cfg(feature = "dashboard")]
use threatglobe_core::RuntimeSnapshot;

/// Longest an entity can outlive its record: spawn delay plus explosion lifetime.
const DRAIN_SECS: f64 = 25.0;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    #[serde(serialize_with = "serialize_scenario")]
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Number of live entities at end
    pub final_entity_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

fn serialize_scenario<S: serde::Serializer>(id: &ScenarioId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(id.name())
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioMetrics {
    /// Records handed to the runtime
    pub records_sent: u64,

    /// Records the runtime refused
    pub records_rejected: u64,

    /// Records dropped by a filter
    pub records_filtered: u64,

    /// Records counted but not drawn
    pub records_without_location: u64,

    /// Entities queued for the layers
    pub entities_queued: u64,

    /// Image fetch callbacks delivered
    pub downloads_delivered: u64,

    /// Counter resets triggered by filter changes
    pub counter_resets: u64,

    pub peak_live_entities: usize,
    pub peak_shown_nodes: usize,
    pub peak_hex_bins: usize,
}

/// What a scenario changes on top of the common loop.
struct ScenarioPlan {
    oracle: OracleConfig,
    /// `(start, end, rate)`; start and end as fractions of the feed duration
    burst: Option<(f64, f64, f64)>,
    analysis: bool,
    /// Source the filter selects halfway through the feed
    filter_source: Option<&'static str>,
    download_failure_rate: f64,
}

impl ScenarioPlan {
    fn for_scenario(scenario: ScenarioId) -> Self {
        let base = Self {
            oracle: OracleConfig::default(),
            burst: None,
            analysis: false,
            filter_source: None,
            download_failure_rate: 0.0,
        };
        match scenario {
            ScenarioId::Steady => base,
            ScenarioId::Burst => Self {
                oracle: OracleConfig {
                    rate_per_sec: 5.0,
                    ..Default::default()
                },
                burst: Some((0.4, 0.6, 50.0)),
                ..base
            },
            ScenarioId::Mixed => Self {
                oracle: OracleConfig {
                    type_mix: TypeMix::mixed(),
                    ..Default::default()
                },
                download_failure_rate: 0.2,
                ..base
            },
            ScenarioId::Malformed => Self {
                oracle: OracleConfig {
                    type_mix: TypeMix::mixed(),
                    malformed_rate: 0.2,
                    no_location_rate: 0.15,
                    ..Default::default()
                },
                ..base
            },
            ScenarioId::Analysis => Self {
                oracle: OracleConfig {
                    type_mix: TypeMix::mixed(),
                    ..Default::default()
                },
                analysis: true,
                ..base
            },
            ScenarioId::FilterReset => Self {
                filter_source: Some("dns"),
                ..base
            },
        }
    }
}

/// Runs feed scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Render tick rate in Hz
    tick_rate_hz: u32,

    /// Feed duration in seconds; the drain phase comes on top
    max_duration_secs: f64,

    /// Sleep through each tick in wall-clock time
    realtime: bool,

    #[cfg(feature = "dashboard")]
    snapshots: Option<Sender<RuntimeSnapshot>>,
}

/// Mutable bookkeeping of one run.
#[derive(Default)]
struct RunState {
    metrics: ScenarioMetrics,
    /// Counter total the runtime should show
    expected_counter: i64,
    active_filter: Option<&'static str>,
    failure: Option<String>,
}

impl RunState {
    fn fail(&mut self, reason: String) {
        if self.failure.is_none() {
            warn!("  ✗ {}", reason);
            self.failure = Some(reason);
        }
    }
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_rate_hz: 60,
            max_duration_secs: 30.0,
            realtime: false,
            #[cfg(feature = "dashboard")]
            snapshots: None,
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the feed duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Paces the loop at wall-clock speed, for watching a run live.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Forwards a runtime snapshot on every counter tick.
    #[cfg(feature = "dashboard")]
    pub fn with_snapshot_feed(mut self, tx: Sender<RuntimeSnapshot>) -> Self {
        self.snapshots = Some(tx);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_with_export(scenario).0
    }

    /// Runs a scenario, recording one export frame per counter tick.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        info!("  {}", scenario.description());

        let plan = ScenarioPlan::for_scenario(scenario);

        // Setup
        let context_seed = self.seed;
        let feed_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let fetch_seed = self.seed.rotate_left(17);

        let context = SimContext::new(context_seed);
        let fetcher = Arc::new(
            SimImageFetcher::new(context.clone(), fetch_seed)
                .with_failure_rate(plan.download_failure_rate),
        );

        let mut settings = Settings::default();
        if plan.analysis {
            settings.set_enable_analysis_mode(true);
            settings.set_analysis_mode_decay(10.0);
        }
        let config = RuntimeConfig::default();
        let ingest_ms = config.ingestion_interval_ms as f64;
        let counter_ms = config.counter_interval_ms as f64;

        let runtime = GlobeRuntime::new(Arc::new(context.clone()), fetcher.clone(), settings, config);
        #[cfg(feature = "dashboard")]
        let runtime = match &self.snapshots {
            Some(tx) => runtime.with_snapshot_feed(tx.clone()),
            None => runtime,
        };
        let mut runtime = runtime;

        let mut oracle = EventOracle::new(feed_seed, plan.oracle.clone());
        let mut export = SimExport::new(scenario.name(), self.seed);
        let mut run = RunState::default();
        let mut events: Vec<SimEvent> = Vec::new();

        let hz = self.tick_rate_hz as f64;
        let dt = Duration::from_secs_f64(1.0 / hz);
        let feed_ticks = (self.max_duration_secs * hz) as u64;
        let total_ticks = ((self.max_duration_secs + DRAIN_SECS) * hz) as u64;
        let filter_tick = feed_ticks / 2;
        let burst_ticks = plan.burst.map(|(start, end, rate)| {
            (
                (start * feed_ticks as f64) as u64,
                (end * feed_ticks as f64) as u64,
                rate,
            )
        });

        let mut next_ingest = ingest_ms;
        let mut next_counter = counter_ms;
        let mut last_ingest = 0.0;

        for tick in 0..total_ticks {
            context.advance_time(dt);
            let now = context.now_ms();
            run.metrics.downloads_delivered += fetcher.deliver_due() as u64;

            // Scenario events
            if let Some((start, end, rate)) = burst_ticks {
                if tick == start {
                    info!("  ⚡ Burst to {}/s at t={:.1}s", rate, now / 1000.0);
                    oracle.set_rate(rate);
                    events.push(SimEvent::info(format!("burst to {}/s", rate)));
                }
                if tick == end {
                    info!("  ✓ Burst over at t={:.1}s", now / 1000.0);
                    oracle.set_rate(plan.oracle.rate_per_sec);
                    events.push(SimEvent::info("burst over"));
                }
            }
            if let Some(source) = plan.filter_source {
                if tick == filter_tick {
                    self.apply_filter(&mut runtime, &mut run, source, now);
                    events.push(SimEvent::info(format!("filter source=^{}$", source)));
                }
            }
            if tick == feed_ticks {
                info!("  Feed stopped at t={:.1}s, draining", now / 1000.0);
                oracle.set_rate(0.0);
                events.push(SimEvent::info("feed stopped"));
            }

            if now >= next_ingest {
                for record in oracle.step(now - last_ingest) {
                    self.feed(&mut runtime, &mut run, &record, now);
                }
                last_ingest = now;
                next_ingest += ingest_ms;
                runtime.ingestion_tick(now);
                self.check_bounded(&runtime, &mut run, oracle.totals().records);
            }

            if now >= next_counter {
                next_counter += counter_ms;
                runtime.counter_tick(now);
                let snapshot = runtime.snapshot(now);
                run.metrics.peak_hex_bins = run.metrics.peak_hex_bins.max(snapshot.hex_bins);
                export.add_frame(SimFrame {
                    time_sec: now / 1000.0,
                    snapshot,
                    oracle: oracle.totals(),
                    events: std::mem::take(&mut events),
                });
                debug!(
                    "  t={:.1}s | sent={} | live={} | shown={}",
                    now / 1000.0,
                    oracle.totals().records,
                    live_entities(&runtime),
                    runtime.globe().shown_nodes()
                );
            }

            runtime.render_tick(now);
            self.check_shown(&runtime, &mut run, plan.analysis);

            if self.realtime {
                std::thread::sleep(dt);
            }
        }

        let now = context.now_ms();
        self.check_final(&mut runtime, &mut run, plan.analysis, now);

        let passed = run.failure.is_none();
        let final_entity_count = live_entities(&runtime);
        let totals = oracle.totals();
        info!(
            "{} {} complete: {} records ({} rejected, {} filtered), {} downloads, counter {}",
            if passed { "✓" } else { "✗" },
            scenario.name(),
            totals.records,
            run.metrics.records_rejected,
            run.metrics.records_filtered,
            run.metrics.downloads_delivered,
            run.expected_counter
        );

        export.finalize(passed, run.failure.clone());
        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks,
            final_time_secs: now / 1000.0,
            final_entity_count,
            failure_reason: run.failure,
            metrics: run.metrics,
        };
        (result, export)
    }

    /// Sets the source filter and resets the counters at once, so the reset
    /// does not swallow records ingested after the change.
    fn apply_filter(&self, runtime: &mut GlobeRuntime, run: &mut RunState, source: &'static str, now: f64) {
        if !runtime.settings().filters.contains_key("source") {
            run.fail("source was not discovered as a filter key".to_string());
            return;
        }
        info!("  Filtering on source={} at t={:.1}s", source, now / 1000.0);
        runtime
            .settings_mut()
            .set_filter("source", &format!("^{}$", source));
        runtime.counter_tick(now);
        run.metrics.counter_resets += 1;
        run.expected_counter = 0;
        run.active_filter = Some(source);

        let total = runtime.counters(now + runtime.config().counter_interval_ms as f64).total;
        if total != 0.0 {
            run.fail(format!("counter total {} after a filter change", total));
        }
    }

    /// Ingests one record and checks the outcome against the oracle.
    fn feed(&self, runtime: &mut GlobeRuntime, run: &mut RunState, record: &EmittedRecord, now: f64) {
        run.metrics.records_sent += 1;
        let outcome = runtime.ingest_at(&record.raw, now);

        let Some(kind) = record.kind else {
            match outcome {
                Err(_) => run.metrics.records_rejected += 1,
                Ok(outcome) => run.fail(format!(
                    "malformed record {} accepted as {:?}",
                    record.raw, outcome
                )),
            }
            return;
        };

        let filtered = run
            .active_filter
            .is_some_and(|source| source != record.source);
        if !filtered {
            run.expected_counter += record.counter;
        }

        match outcome {
            Ok(Ingested::Filtered) if filtered => run.metrics.records_filtered += 1,
            Ok(Ingested::NoLocation) if !filtered && !record.has_location => {
                run.metrics.records_without_location += 1
            }
            Ok(Ingested::Queued(queued))
                if !filtered && record.has_location && queued.name() == kind =>
            {
                run.metrics.entities_queued += 1
            }
            other => run.fail(format!(
                "record {} (filtered: {}) ingested as {:?}",
                record.raw, filtered, other
            )),
        }
    }

    fn check_bounded(&self, runtime: &GlobeRuntime, run: &mut RunState, records_sent: u64) {
        let live = live_entities(runtime);
        run.metrics.peak_live_entities = run.metrics.peak_live_entities.max(live);
        if live as u64 > records_sent {
            run.fail(format!("{} live entities from {} records", live, records_sent));
        }
    }

    fn check_shown(&self, runtime: &GlobeRuntime, run: &mut RunState, analysis: bool) {
        let globe = runtime.globe();
        run.metrics.peak_shown_nodes = run.metrics.peak_shown_nodes.max(globe.shown_nodes());

        let counts = runtime.entity_counts();
        for (kind, shown) in globe.shown_by_kind() {
            let live = counts.get(&kind).copied().unwrap_or(0);
            if shown > live {
                run.fail(format!("{} {} nodes shown for {} live entities", shown, kind, live));
            }
        }

        if !analysis && !globe.hex_bins.is_empty() {
            run.fail("hex bins drawn with analysis mode off".to_string());
        }
    }

    fn check_final(&self, runtime: &mut GlobeRuntime, run: &mut RunState, analysis: bool, now: f64) {
        // Flush the events of the last ingestion tick
        runtime.counter_tick(now);
        let counter_interval = runtime.config().counter_interval_ms as f64;
        let total = runtime.counters(now + counter_interval).total;
        if total != run.expected_counter as f64 {
            run.fail(format!(
                "counter total {} but the feed sent {}",
                total, run.expected_counter
            ));
        }

        for (kind, live) in runtime.entity_counts() {
            if kind == EntityKind::AnalysisBin && !analysis {
                continue;
            }
            if live > 0 {
                run.fail(format!("{} {} entities left after draining", live, kind));
            }
        }
        if runtime.globe().shown_nodes() > 0 {
            run.fail(format!(
                "{} nodes still shown after draining",
                runtime.globe().shown_nodes()
            ));
        }
        if !runtime.globe().hex_bins.is_empty() {
            run.fail("hex bins left after draining".to_string());
        }
        if runtime.downloads_in_flight() > 0 {
            run.fail(format!(
                "{} downloads still in flight",
                runtime.downloads_in_flight()
            ));
        }
    }
}

/// Live drawable entities; analysis samples and arc labels ride along with others.
fn live_entities(runtime: &GlobeRuntime) -> usize {
    runtime
        .entity_counts()
        .into_iter()
        .filter(|(kind, _)| !matches!(kind, EntityKind::AnalysisBin | EntityKind::ArcLabel))
        .map(|(_, live)| live)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(seed: u64) -> ScenarioRunner {
        ScenarioRunner::new(seed).with_duration(6.0).with_tick_rate(30)
    }

    #[test]
    fn test_steady_passes() {
        let result = runner(42).run(ScenarioId::Steady);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.entities_queued > 0);
        assert_eq!(result.final_entity_count, 0);
        assert_eq!(result.metrics.records_rejected, 0);
    }

    #[test]
    fn test_same_seed_same_metrics() {
        let a = runner(7).run(ScenarioId::Mixed);
        let b = runner(7).run(ScenarioId::Mixed);
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.passed, b.passed);
    }

    #[test]
    fn test_malformed_records_rejected() {
        let result = runner(3).run(ScenarioId::Malformed);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.records_rejected > 0);
        assert!(result.metrics.records_without_location > 0);
    }

    #[test]
    fn test_filter_reset_counts_only_matches() {
        let result = runner(11).run(ScenarioId::FilterReset);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.counter_resets, 1);
        assert!(result.metrics.records_filtered > 0);
    }

    #[test]
    fn test_analysis_draws_hex_bins() {
        let result = runner(5).run(ScenarioId::Analysis);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.peak_hex_bins > 0);
    }

    #[test]
    fn test_export_has_a_frame_per_second() {
        let (result, export) = runner(1).run_with_export(ScenarioId::Burst);
        assert!(result.passed, "{:?}", result.failure_reason);
        // Feed plus drain, one frame per counter tick
        assert!((30..=31).contains(&export.frames.len()));
        assert!(export.frames.iter().any(|f| !f.events.is_empty()));
        assert_eq!(export.passed, result.passed);
    }
}
