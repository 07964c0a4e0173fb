use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use superstep_core::Superstep;

/// Figures for one completed superstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuperstepStats {
    pub superstep: Superstep,
    pub active_vertices: u64,
    pub computed_vertices: u64,
    pub messages_sent: u64,
    pub duplicates_discarded: u64,
    pub duration: Duration,
}

/// Running totals for a job, updated at every barrier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobMetrics {
    pub supersteps_completed: u64,
    pub total_messages: u64,
    pub total_compute_calls: u64,
    pub total_duplicates_discarded: u64,
    /// Mean wall time of a superstep, compute through barrier.
    pub avg_superstep_duration: Duration,
    pub last_superstep: Option<SuperstepStats>,
    pub last_barrier_at: Option<DateTime<Utc>>,
}

impl JobMetrics {
    pub fn record_superstep(&mut self, stats: SuperstepStats) {
        self.supersteps_completed += 1;
        self.total_messages += stats.messages_sent;
        self.total_compute_calls += stats.computed_vertices;
        self.total_duplicates_discarded += stats.duplicates_discarded;
        self.last_barrier_at = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.supersteps_completed;
        self.avg_superstep_duration = if count == 1 {
            stats.duration
        } else {
            let prev = self.avg_superstep_duration.as_nanos() as f64;
            let cur = stats.duration.as_nanos() as f64;
            Duration::from_nanos((prev + (cur - prev) / count as f64) as u64)
        };
        self.last_superstep = Some(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(superstep: Superstep, millis: u64, messages: u64) -> SuperstepStats {
        SuperstepStats {
            superstep,
            active_vertices: 3,
            computed_vertices: 3,
            messages_sent: messages,
            duplicates_discarded: 0,
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn record_single_superstep() {
        let mut m = JobMetrics::default();
        m.record_superstep(stats(0, 100, 4));

        assert_eq!(m.supersteps_completed, 1);
        assert_eq!(m.total_messages, 4);
        assert_eq!(m.avg_superstep_duration, Duration::from_millis(100));
        assert_eq!(m.last_superstep.map(|s| s.superstep), Some(0));
        assert!(m.last_barrier_at.is_some());
    }

    #[test]
    fn record_multiple_supersteps_averages() {
        let mut m = JobMetrics::default();
        m.record_superstep(stats(0, 100, 1));
        m.record_superstep(stats(1, 200, 2));

        assert_eq!(m.total_messages, 3);
        assert_eq!(m.total_compute_calls, 6);
        let avg = m.avg_superstep_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }
}
