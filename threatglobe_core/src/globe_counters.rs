//! Rolling event counters: total, last 5 minutes, last minute, last 10 seconds.
//!
//! The aggregation tick turns the pending event weights into a timestamped
//! bucket and recomputes every window. Between ticks, [`EventCounter::display`]
//! interpolates from the previous snapshot to the latest one so the numbers
//! roll instead of jumping.

use crate::globe_lifecycle::lerp;
use crate::settings::{Settings, SettingsChanged};
use crossbeam::channel::Receiver;
use serde::Serialize;
use std::collections::VecDeque;
use threatglobe_env::InboundQueue;
use tracing::debug;

const SECOND_MS: f64 = 1000.0;
const MINUTE_MS: f64 = 60.0 * SECOND_MS;

/// Default aggregation period (ms); also the interpolation span.
pub const COUNTER_UPDATE_INTERVAL: f64 = SECOND_MS;

/// One snapshot of the four windows.
///
/// Weights may be fractional; only [`EventCounterData::lerp_to`] rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EventCounterData {
    pub last10s: f64,
    pub last1min: f64,
    pub last5min: f64,
    pub total: f64,
}

impl EventCounterData {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn add_to_all(&mut self, addition: f64) {
        self.last10s += addition;
        self.last1min += addition;
        self.last5min += addition;
        self.total += addition;
    }

    /// Per-window `round(lerp(self, other, factor))`.
    pub fn lerp_to(&self, other: &Self, factor: f64) -> Self {
        let mix = |a: f64, b: f64| lerp(a, b, factor).round();
        Self {
            last10s: mix(self.last10s, other.last10s),
            last1min: mix(self.last1min, other.last1min),
            last5min: mix(self.last5min, other.last5min),
            total: mix(self.total, other.total),
        }
    }
}

/// Windowed event counter fed by the inbound event-weight queue.
///
/// Buckets older than five minutes only matter for the total, so they are
/// folded into a running sum instead of being kept.
#[derive(Debug)]
pub struct EventCounter {
    buckets: VecDeque<(f64, f64)>,
    expired_total: f64,
    prev: EventCounterData,
    last: EventCounterData,
    last_update: f64,
    interval: f64,
    changes: Option<Receiver<SettingsChanged>>,
}

impl Default for EventCounter {
    fn default() -> Self {
        Self::new(COUNTER_UPDATE_INTERVAL)
    }
}

impl EventCounter {
    /// # Arguments
    /// * `interval` - Aggregation period in ms
    pub fn new(interval: f64) -> Self {
        Self {
            buckets: VecDeque::new(),
            expired_total: 0.0,
            prev: EventCounterData::default(),
            last: EventCounterData::default(),
            last_update: 0.0,
            interval,
            changes: None,
        }
    }

    /// Subscribes to settings so that filter changes restart the counts.
    pub fn attach_to_settings(&mut self, settings: &mut Settings) {
        self.changes = Some(settings.subscribe());
    }

    /// Latest aggregated snapshot.
    pub fn latest(&self) -> EventCounterData {
        self.last
    }

    /// Clears every count and drops the pending events.
    pub fn reset(&mut self, queue: &InboundQueue<f64>) {
        self.buckets.clear();
        self.expired_total = 0.0;
        self.prev.reset();
        self.last.reset();
        queue.clear();
    }

    /// Aggregation tick.
    ///
    /// Windows are recomputed from the buckets first; the weights drained
    /// from `queue` form a new bucket that is then added to every window.
    pub fn tick(&mut self, now: f64, queue: &InboundQueue<f64>) {
        let filter_changed = self
            .changes
            .as_ref()
            .is_some_and(|changes| changes.try_iter().any(|c| c.is_filter()));
        if filter_changed {
            debug!("Filter changed, resetting event counters");
            self.reset(queue);
        }

        while let Some(&(ts, count)) = self.buckets.front() {
            if ts + 5.0 * MINUTE_MS > now {
                break;
            }
            self.expired_total += count;
            self.buckets.pop_front();
        }

        let mut current = EventCounterData {
            total: self.expired_total,
            ..Default::default()
        };
        for &(ts, count) in &self.buckets {
            current.total += count;
            current.last5min += count;
            if ts + MINUTE_MS > now {
                current.last1min += count;
            }
            if ts + 10.0 * SECOND_MS > now {
                current.last10s += count;
            }
        }

        let new_sum: f64 = queue.take_all().into_iter().sum();
        if new_sum > 0.0 {
            self.buckets.push_back((now, new_sum));
            current.add_to_all(new_sum);
        }

        self.prev = self.last;
        self.last = current;
        self.last_update = now;
    }

    /// Values to show at `now`, rolling from the previous snapshot.
    pub fn display(&self, now: f64) -> EventCounterData {
        let factor = (now - self.last_update).clamp(0.0, self.interval) / self.interval;
        self.prev.lerp_to(&self.last, factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(values: &[f64]) -> InboundQueue<f64> {
        let queue = InboundQueue::new();
        for v in values {
            queue.push(*v);
        }
        queue
    }

    #[test]
    fn test_windows_over_time() {
        let mut counter = EventCounter::default();
        let queue = queue_with(&[2.0, 3.0]);
        counter.tick(0.0, &queue);
        queue.push(3.0);
        counter.tick(2000.0, &queue);
        counter.tick(3000.0, &queue);

        let all_eight = EventCounterData {
            last10s: 8.0,
            last1min: 8.0,
            last5min: 8.0,
            total: 8.0,
        };
        assert_eq!(counter.latest(), all_eight);

        counter.tick(12_000.0, &queue);
        assert_eq!(
            counter.latest(),
            EventCounterData {
                last10s: 0.0,
                ..all_eight
            }
        );

        counter.tick(62_001.0, &queue);
        assert_eq!(counter.latest().last1min, 0.0);
        assert_eq!(counter.latest().last5min, 8.0);

        counter.tick(302_001.0, &queue);
        assert_eq!(
            counter.latest(),
            EventCounterData {
                total: 8.0,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_display_interpolates() {
        let mut counter = EventCounter::default();
        counter.tick(0.0, &queue_with(&[10.0]));
        counter.tick(1000.0, &queue_with(&[10.0]));

        assert_eq!(counter.display(1000.0).total, 10.0);
        assert_eq!(counter.display(1500.0).total, 15.0);
        assert_eq!(counter.display(5000.0).total, 20.0);
    }

    #[test]
    fn test_filter_change_resets() {
        let mut settings = Settings::default();
        let mut counter = EventCounter::default();
        counter.attach_to_settings(&mut settings);

        let queue = queue_with(&[4.0]);
        counter.tick(0.0, &queue);
        assert_eq!(counter.latest().total, 4.0);

        queue.push(7.0);
        settings.set_filter("source", "scanner.*");
        counter.tick(1000.0, &queue);
        assert_eq!(counter.latest(), EventCounterData::default());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_tick_adds_nothing() {
        let mut counter = EventCounter::default();
        counter.tick(0.0, &queue_with(&[0.0]));
        assert_eq!(counter.latest(), EventCounterData::default());
    }

    #[test]
    fn test_fractional_weights_accumulate() {
        let mut counter = EventCounter::default();
        counter.tick(0.0, &queue_with(&[0.5, 0.5, 0.25]));
        assert_eq!(counter.latest().total, 1.25);
        assert_eq!(counter.latest().last10s, 1.25);

        // Rounded only for display
        counter.tick(1000.0, &queue_with(&[]));
        assert_eq!(counter.display(2000.0).total, 1.0);
    }

    #[test]
    fn test_huge_weights_do_not_overflow() {
        let mut counter = EventCounter::default();
        counter.tick(0.0, &queue_with(&[i64::MAX as f64, 1e300]));
        counter.tick(1000.0, &queue_with(&[1.0]));
        let latest = counter.latest();
        assert!(latest.total.is_finite());
        assert!(latest.total >= 1e300);
        assert_eq!(latest.total, latest.last10s);
        assert!(counter.display(5000.0).total > 0.0);
    }
}
