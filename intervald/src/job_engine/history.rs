// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::VecDeque;

use serde::Serialize;

use super::job::{JobRun, Outcome};

/// Runs kept per job. Older runs only survive in the counters.
pub const HISTORY_CAPACITY: usize = 256;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub completed: u64,
    pub failed: u64,
    pub misfired: u64,
    pub skipped: u64,
    pub aborted: u64,
}

impl OutcomeCounts {
    fn count(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Failed(_) => self.failed += 1,
            Outcome::Misfired => self.misfired += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Aborted => self.aborted += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.misfired + self.skipped + self.aborted
    }
}

#[derive(Debug)]
pub struct JobHistory {
    runs: VecDeque<JobRun>,
    counts: OutcomeCounts,
    capacity: usize,
}

impl JobHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            runs: VecDeque::with_capacity(capacity.min(HISTORY_CAPACITY)),
            counts: OutcomeCounts::default(),
            capacity,
        }
    }

    pub fn record(&mut self, run: JobRun) {
        self.counts.count(&run.outcome);
        if self.capacity == 0 {
            return;
        }
        if self.runs.len() == self.capacity {
            self.runs.pop_front();
        }
        self.runs.push_back(run);
    }

    pub fn runs(&self) -> Vec<JobRun> {
        self.runs.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&JobRun> {
        self.runs.back()
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }
}

impl Default for JobHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

/// Snapshot of one job for whoever embeds the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub interval_secs: f64,
    pub misfire_grace_time_secs: f64,
    pub max_instances: usize,
    pub running: usize,
    pub counts: OutcomeCounts,
    pub last_run: Option<JobRun>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn run(tick: u64, outcome: Outcome) -> JobRun {
        let now = OffsetDateTime::now_utc();
        JobRun {
            job_id: "job".into(),
            tick,
            scheduled_time: now,
            actual_start_time: None,
            finished_time: now,
            outcome,
        }
    }

    #[test]
    fn test_history_is_bounded_but_counts_everything() {
        let mut history = JobHistory::new(3);
        history.record(run(1, Outcome::Completed));
        history.record(run(2, Outcome::Skipped));
        history.record(run(3, Outcome::Failed("boom".into())));
        history.record(run(4, Outcome::Misfired));

        let ticks: Vec<u64> = history.runs().iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
        assert_eq!(history.last().unwrap().outcome, Outcome::Misfired);
        assert_eq!(
            history.counts(),
            OutcomeCounts {
                completed: 1,
                failed: 1,
                misfired: 1,
                skipped: 1,
                aborted: 0,
            }
        );
        assert_eq!(history.counts().total(), 4);
    }

    #[test]
    fn test_run_serializes_outcome() {
        let json = serde_json::to_value(run(7, Outcome::Failed("boom".into()))).unwrap();
        assert_eq!(json["tick"], 7);
        assert_eq!(json["outcome"]["kind"], "failed");
        assert_eq!(json["outcome"]["error"], "boom");
        assert!(json["actual_start_time"].is_null());
    }
}
