// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Duplicate job: a job with id {0:?} is already registered")]
    DuplicateJob(String),

    #[error("Invalid interval for job {id:?}: must be a positive, finite number of seconds")]
    InvalidInterval { id: String },

    #[error("Invalid misfire grace time for job {id:?}: must be a non-negative, finite number of seconds")]
    InvalidMisfireGraceTime { id: String },

    #[error("Invalid max_instances for job {id:?}: must be at least 1")]
    InvalidMaxInstances { id: String },

    #[error("Invalid worker pool size: must be at least 1")]
    InvalidPoolSize,

    /// Jobs are registered at startup only.
    #[error("Scheduler already started: jobs can only be registered before start()")]
    AlreadyStarted,

    #[error("Scheduler has been stopped")]
    Stopped,

    #[error("Failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid worker pool size: max_workers must be at least 1")]
    NoWorkers,

    #[error("Invalid drain timeout: {0} is not a non-negative number of seconds")]
    InvalidDrainTimeout(f64),
}

/// Everything that can abort startup. All of these are fatal.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging service error: {0}")]
    Logging(#[from] std::io::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}
