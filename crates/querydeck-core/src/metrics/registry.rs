//! Named-operation timers with full duration history

use crate::clock::{system_clock, SharedClock};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Aggregates for one operation, all durations in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OperationStats {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
}

impl OperationStats {
    fn from_samples(samples: &[Duration]) -> Self {
        let millis = samples.iter().map(|d| as_millis_f64(*d));
        let (min, max, total) = millis.fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, total), ms| (min.min(ms), max.max(ms), total + ms),
        );
        let count = samples.len();

        if count == 0 {
            return Self {
                count: 0,
                average: 0.0,
                min: 0.0,
                max: 0.0,
                total: 0.0,
            };
        }

        Self {
            count,
            average: total / count as f64,
            min,
            max,
            total,
        }
    }
}

/// Handle for a per-call timer started with [`MetricRegistry::start_scoped`]
///
/// Tokens are unique for the registry's lifetime, so concurrent calls of the
/// same operation never read each other's start time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerToken {
    id: u64,
    name: String,
}

impl TimerToken {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
struct ActiveTimers {
    /// One live start per operation name (last start wins)
    named: HashMap<String, Duration>,
    scoped: HashMap<u64, (String, Duration)>,
}

/// Tracks in-flight timers and historical duration samples per operation
///
/// Shared as `Arc<MetricRegistry>` across request handlers. Every method is
/// total: "nothing recorded" yields `None` or `0.0`, never an error.
pub struct MetricRegistry {
    clock: SharedClock,
    active: Mutex<ActiveTimers>,
    series: RwLock<HashMap<String, Vec<Duration>>>,
    next_token: AtomicU64,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            clock,
            active: Mutex::new(ActiveTimers::default()),
            series: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Start (or restart) the timer for `name`
    ///
    /// A second start before `end_timer` overwrites the first. Concurrent
    /// callers timing the same name race on this slot; use
    /// [`start_scoped`](Self::start_scoped) for per-call isolation.
    pub fn start_timer(&self, name: &str) {
        let now = self.clock.now();
        self.active.lock().named.insert(name.to_string(), now);
        trace!(operation = name, "Timer started");
    }

    /// Stop the timer for `name` and record its duration
    ///
    /// Returns `None` when no timer is active for `name`.
    pub fn end_timer(&self, name: &str) -> Option<Duration> {
        let start = self.active.lock().named.remove(name)?;
        let elapsed = self.clock.now().saturating_sub(start);
        self.record(name, elapsed);
        Some(elapsed)
    }

    /// Start an isolated timer for one call of `name`
    pub fn start_scoped(&self, name: &str) -> TimerToken {
        let id = self.next_token.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        self.active
            .lock()
            .scoped
            .insert(id, (name.to_string(), now));
        TimerToken {
            id,
            name: name.to_string(),
        }
    }

    /// Stop a scoped timer, recording under its operation name
    ///
    /// Returns `None` if the token was already ended or cleared by `reset`.
    pub fn end_scoped(&self, token: &TimerToken) -> Option<Duration> {
        let (name, start) = self.active.lock().scoped.remove(&token.id)?;
        let elapsed = self.clock.now().saturating_sub(start);
        self.record(&name, elapsed);
        Some(elapsed)
    }

    /// Discard a scoped timer without recording a sample
    pub fn cancel_scoped(&self, token: &TimerToken) -> bool {
        self.active.lock().scoped.remove(&token.id).is_some()
    }

    /// Append an externally measured sample
    pub fn record(&self, name: &str, duration: Duration) {
        self.series
            .write()
            .entry(name.to_string())
            .or_default()
            .push(duration);
        debug!(
            operation = name,
            duration_ms = as_millis_f64(duration),
            "Recorded duration"
        );
    }

    /// Mean duration of `name` in milliseconds, `0.0` without samples
    pub fn average_ms(&self, name: &str) -> f64 {
        self.series
            .read()
            .get(name)
            .map(|samples| OperationStats::from_samples(samples).average)
            .unwrap_or(0.0)
    }

    /// Aggregates over the entire history of every tracked operation
    pub fn snapshot(&self) -> BTreeMap<String, OperationStats> {
        self.series
            .read()
            .iter()
            .map(|(name, samples)| (name.clone(), OperationStats::from_samples(samples)))
            .collect()
    }

    /// Number of timers started and not yet ended
    pub fn active_timers(&self) -> usize {
        let active = self.active.lock();
        active.named.len() + active.scoped.len()
    }

    /// Clear active timers and all recorded history
    pub fn reset(&self) {
        {
            let mut active = self.active.lock();
            active.named.clear();
            active.scoped.clear();
        }
        self.series.write().clear();
        debug!("Metric registry reset");
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}
