// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;

use crate::job_engine::Job;
use crate::logging::LogFacility;

pub const TEST_COMMAND_ID: &str = "test_command";

/// Heartbeat job: proves that the scheduler and the log sinks are alive.
pub struct TestCommandJob {
    logger: Arc<dyn LogFacility>,
}

impl TestCommandJob {
    pub fn new(logger: Arc<dyn LogFacility>) -> Self {
        Self { logger }
    }
}

impl Job for TestCommandJob {
    fn run(&self) -> anyhow::Result<()> {
        self.logger.info("Test command executed.");
        Ok(())
    }
}
