use crate::executor::ScriptKind;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome label for a script killed at its time limit.
pub const TIMEOUT_OUTCOME: &str = "timeout";
/// Outcome label for a script that could not be run or fed its input.
pub const ERROR_OUTCOME: &str = "error";

const DEFAULT_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0];
const INSTALL_DATA_BUCKETS: &[f64] = &[
    5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0,
];

/// Cumulative duration histogram in seconds.
#[derive(Debug)]
struct Histogram {
    bounds: &'static [f64],
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
    sum_micros: AtomicU64,
}

impl Histogram {
    fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            buckets: bounds.iter().map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
        }
    }

    fn observe(&self, duration: Duration) {
        let seconds = duration.as_secs_f64();
        for (bound, bucket) in self.bounds.iter().zip(&self.buckets) {
            if seconds <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }
}

/// Per-script duration histograms and outcome counters.
#[derive(Debug)]
pub struct ScriptMetrics {
    durations: HashMap<ScriptKind, Histogram>,
    outcomes: Mutex<BTreeMap<(&'static str, String), u64>>,
}

impl Default for ScriptMetrics {
    fn default() -> Self {
        let durations = ScriptKind::ALL
            .into_iter()
            .map(|kind| {
                let bounds = match kind {
                    ScriptKind::InstallData => INSTALL_DATA_BUCKETS,
                    _ => DEFAULT_BUCKETS,
                };
                (kind, Histogram::new(bounds))
            })
            .collect();
        Self {
            durations,
            outcomes: Mutex::new(BTreeMap::new()),
        }
    }
}

impl ScriptMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: ScriptKind, duration: Duration, outcome: &str) {
        if let Some(histogram) = self.durations.get(&kind) {
            histogram.observe(duration);
        }
        let mut outcomes = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *outcomes
            .entry((kind.as_str(), outcome.to_string()))
            .or_insert(0) += 1;
    }

    #[cfg(test)]
    pub fn outcome_count(&self, kind: ScriptKind, outcome: &str) -> u64 {
        let outcomes = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        outcomes
            .get(&(kind.as_str(), outcome.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# HELP script_duration_seconds Plugin script wall-clock duration.");
        let _ = writeln!(out, "# TYPE script_duration_seconds histogram");
        for kind in ScriptKind::ALL {
            let Some(histogram) = self.durations.get(&kind) else {
                continue;
            };
            let script = kind.as_str();
            for (bound, bucket) in histogram.bounds.iter().zip(&histogram.buckets) {
                let _ = writeln!(
                    out,
                    "script_duration_seconds_bucket{{script=\"{}\",le=\"{}\"}} {}",
                    script,
                    bound,
                    bucket.load(Ordering::Relaxed)
                );
            }
            let count = histogram.count.load(Ordering::Relaxed);
            let _ = writeln!(
                out,
                "script_duration_seconds_bucket{{script=\"{}\",le=\"+Inf\"}} {}",
                script, count
            );
            let _ = writeln!(
                out,
                "script_duration_seconds_sum{{script=\"{}\"}} {}",
                script,
                histogram.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
            );
            let _ = writeln!(
                out,
                "script_duration_seconds_count{{script=\"{}\"}} {}",
                script, count
            );
        }

        let _ = writeln!(out, "# HELP script_calls_total Plugin script executions by outcome.");
        let _ = writeln!(out, "# TYPE script_calls_total counter");
        let outcomes = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for ((script, outcome), count) in outcomes.iter() {
            let _ = writeln!(
                out,
                "script_calls_total{{script=\"{}\",status=\"{}\"}} {}",
                script, outcome, count
            );
        }

        out
    }
}
