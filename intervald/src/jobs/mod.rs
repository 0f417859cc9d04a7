// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::time::Duration;

use crate::error::SchedulerError;
use crate::job_engine::TaskScheduler;
use crate::logging::LogFacility;

pub mod test_command_job;

pub use test_command_job::{TestCommandJob, TEST_COMMAND_ID};

/// Registers the daemon's job set on a scheduler that has not been started yet.
pub fn define_jobs(
    scheduler: &mut TaskScheduler,
    logger: Arc<dyn LogFacility>,
) -> Result<(), SchedulerError> {
    scheduler.register_job(
        TEST_COMMAND_ID,
        Duration::from_secs(10),
        Duration::from_secs(900),
        1,
        Arc::new(TestCommandJob::new(logger)),
    )
}
