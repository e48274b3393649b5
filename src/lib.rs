//! Update checks and name-collision-free restarts for a single-host compose stack.
pub mod config;
pub mod docker;
pub mod notifications;
pub mod restart;
pub mod runtime;
pub mod update_check;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("could not install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
