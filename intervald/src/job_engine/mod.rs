// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Interval Job Scheduler
//!
//! ## Overview
//! Jobs are registered once at startup and then fired at a fixed interval.
//!
//! - One scheduling thread runs a tick loop per job on a `LocalPool`.
//! - A tick loop only decides: misfire, skip (concurrency cap) or dispatch.
//! - Dispatched runs go to a fixed pool of worker threads via an unbounded queue.
//! - Per-job concurrency is capped by an atomic running counter.
//! - Shutdown closes the tick loops, then drains in-flight runs with a timeout.
//!
//! ## Ticks
//! - `scheduled = previous + interval`, the first one is `start + interval`.
//! - A tick later than its misfire grace time is recorded as misfired. This is
//!   checked when the tick fires and again when a worker picks the run up.
//! - Missed ticks are evaluated one by one unless `coalesce` is set.
//!
//!
//! ```text
//!         +--------------------------------------+
//!         |          scheduling thread           |
//!         |  tick loop A   tick loop B   ...     |
//!         +----------+---------------------------+
//!                    |  run / skip / misfire
//!                    v
//!         +----------+-----------+
//!         |  unbounded run queue |
//!         +----+------+----+-----+
//!              |           |
//!         +----v----+  +---v----+
//!         | worker 0|  |worker 1|  ...  (max_workers)
//!         +---------+  +--------+
//! ```

pub mod history;
pub mod job;
pub mod running_set;
pub mod scheduler;
pub mod worker_pool;

pub use history::{JobHistory, JobStatus, OutcomeCounts};
pub use job::{Job, JobRun, JobSpec, Outcome, DEFAULT_MISFIRE_GRACE_TIME};
pub use scheduler::{SchedulerConfig, TaskScheduler, DEFAULT_MAX_WORKERS};
