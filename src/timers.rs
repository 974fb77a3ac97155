//! Per-phase wall-clock accounting for a run.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::engine::RunPhase;

/// Accumulated time spent in each [`RunPhase`].
#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    totals: BTreeMap<RunPhase, Duration>,
}

impl PhaseTimings {
    pub fn get(&self, phase: RunPhase) -> Duration {
        self.totals.get(&phase).copied().unwrap_or_default()
    }

    /// Phase name → milliseconds, as stored in the run report.
    pub fn to_millis(&self) -> BTreeMap<String, f64> {
        self.totals
            .iter()
            .map(|(phase, total)| (phase.to_string(), total.as_secs_f64() * 1000.0))
            .collect()
    }
}

/// RAII timer that adds its lifetime to one phase of a [`PhaseTimings`] on Drop.
///
/// Timing is recorded on every exit path, including early returns through `?`.
pub struct PhaseTimer<'a> {
    phase: RunPhase,
    start: Instant,
    timings: &'a mut PhaseTimings,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(timings: &'a mut PhaseTimings, phase: RunPhase) -> Self {
        Self {
            phase,
            start: Instant::now(),
            timings,
        }
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        *self.timings.totals.entry(self.phase).or_default() += self.start.elapsed();
    }
}
