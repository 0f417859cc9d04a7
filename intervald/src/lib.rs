// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod bootstrap;
pub mod error;
pub mod global_config;
pub mod job_engine;
pub mod jobs;
pub mod logging;
pub mod singleton;

pub use bootstrap::{bootstrap, bootstrap_with, AppContext};
pub use error::{BootstrapError, ConfigError, SchedulerError};
pub use global_config::AppConfig;
