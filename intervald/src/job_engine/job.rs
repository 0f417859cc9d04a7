// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::SchedulerError;

/// Grace time used when a job does not set its own.
pub const DEFAULT_MISFIRE_GRACE_TIME: Duration = Duration::from_secs(1);

/// The work a job performs on every tick. Errors are caught at the worker
/// boundary and recorded; they never stop later ticks.
pub trait Job: Send + Sync + 'static {
    fn run(&self) -> anyhow::Result<()>;
}

impl<F> Job for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn run(&self) -> anyhow::Result<()> {
        self()
    }
}

/// Immutable definition of an interval job, identified by `id`.
#[derive(Clone)]
pub struct JobSpec {
    id: String,
    interval: Duration,
    misfire_grace_time: Duration,
    max_instances: usize,
    job: Arc<dyn Job>,
}

impl JobSpec {
    pub fn new<F>(id: impl Into<String>, interval: Duration, callable: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_arc(id, interval, Arc::new(callable))
    }

    pub fn from_job(id: impl Into<String>, interval: Duration, job: impl Job) -> Self {
        Self::from_arc(id, interval, Arc::new(job))
    }

    pub fn from_arc(id: impl Into<String>, interval: Duration, job: Arc<dyn Job>) -> Self {
        Self {
            id: id.into(),
            interval,
            misfire_grace_time: DEFAULT_MISFIRE_GRACE_TIME,
            max_instances: 1,
            job,
        }
    }

    pub fn with_misfire_grace_time(mut self, grace: Duration) -> Self {
        self.misfire_grace_time = grace;
        self
    }

    pub fn with_max_instances(mut self, max_instances: usize) -> Self {
        self.max_instances = max_instances;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn misfire_grace_time(&self) -> Duration {
        self.misfire_grace_time
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    pub fn run(&self) -> anyhow::Result<()> {
        self.job.run()
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.interval.is_zero() {
            return Err(SchedulerError::InvalidInterval {
                id: self.id.clone(),
            });
        }
        if self.max_instances == 0 {
            return Err(SchedulerError::InvalidMaxInstances {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSpec")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .field("misfire_grace_time", &self.misfire_grace_time)
            .field("max_instances", &self.max_instances)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "error", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    /// Error or panic message of the callable.
    Failed(String),
    /// Started too late, the callable was not invoked.
    Misfired,
    /// `max_instances` runs were already active.
    Skipped,
    /// Still pending when the scheduler's drain timeout ran out.
    Aborted,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed(_) => "failed",
            Outcome::Misfired => "misfired",
            Outcome::Skipped => "skipped",
            Outcome::Aborted => "aborted",
        }
    }
}

/// One tick of a job, recorded once its outcome is known.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub job_id: String,
    /// Per-job tick counter, starting at 1.
    pub tick: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub actual_start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_time: OffsetDateTime,
    pub outcome: Outcome,
}

/// A tick is misfired when it is picked up more than `grace` after its scheduled time.
pub fn is_misfire(scheduled: Instant, now: Instant, grace: Duration) -> bool {
    now.saturating_duration_since(scheduled) > grace
}
