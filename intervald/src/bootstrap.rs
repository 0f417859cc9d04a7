// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::error::{BootstrapError, SchedulerError};
use crate::global_config::AppConfig;
use crate::job_engine::{JobStatus, TaskScheduler};
use crate::jobs::define_jobs;
use crate::logging::{install_log_bridge, LogFacility, LoggingService};
use crate::singleton::SingletonProvider;

/// The running application: configuration, the shared logger and the started scheduler.
#[derive(Debug)]
pub struct AppContext {
    config: AppConfig,
    logger: Arc<LoggingService>,
    scheduler: TaskScheduler,
}

impl AppContext {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn logger(&self) -> &Arc<LoggingService> {
        &self.logger
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn status(&self) -> Vec<JobStatus> {
        self.scheduler.status()
    }

    pub fn status_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.scheduler.status())
    }

    /// Stops the scheduler and returns the number of runs aborted at the drain deadline.
    pub fn shutdown(mut self, drain_timeout: Duration) -> usize {
        self.logger.info("Shutting down scheduler.");
        let aborted = self.scheduler.stop(drain_timeout);
        if aborted > 0 {
            self.logger.warning(&format!(
                "Scheduler stopped, {aborted} run(s) still pending were abandoned."
            ));
        } else {
            self.logger.info("Scheduler stopped.");
        }
        self.logger.flush();
        aborted
    }
}

/// Brings the daemon up with the process-wide singletons and the built-in job set.
pub fn bootstrap(config: AppConfig) -> Result<AppContext, BootstrapError> {
    bootstrap_with(SingletonProvider::global(), config, define_jobs)
}

/// Like `bootstrap`, with an explicit provider and job set.
pub fn bootstrap_with<D>(
    provider: &SingletonProvider,
    config: AppConfig,
    define: D,
) -> Result<AppContext, BootstrapError>
where
    D: FnOnce(&mut TaskScheduler, Arc<dyn LogFacility>) -> Result<(), SchedulerError>,
{
    config.validate()?;

    let logging_config = config.logging_config();
    let logger = provider.get_or_create(|| LoggingService::from_config(&logging_config))?;
    if let Err(e) = install_log_bridge(logger.clone()) {
        // another logger owns the `log` facade, e.g. a second bootstrap in one process
        debug!("log bridge not installed: {e}");
    }
    logger.info("Application created.");

    let facility: Arc<dyn LogFacility> = logger.clone();
    let mut scheduler = TaskScheduler::new(config.scheduler_config(), facility.clone());
    if let Err(e) = define(&mut scheduler, facility) {
        logger.critical(&format!("Failed to define jobs: {e}"));
        return Err(e.into());
    }
    if let Err(e) = scheduler.start() {
        logger.critical(&format!("Failed to start scheduler: {e}"));
        return Err(e.into());
    }
    logger.info(&format!(
        "Scheduler running with jobs: {} ({} worker(s), coalesce {})",
        scheduler.job_ids().join(", "),
        scheduler.config().max_workers,
        scheduler.config().coalesce
    ));

    Ok(AppContext {
        config,
        logger,
        scheduler,
    })
}
