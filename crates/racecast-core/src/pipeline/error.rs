//! Pipeline errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Errors starting a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The configuration would stall or break the driver
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The connection manager could not be started
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
