//! CLI errors.

use std::io;

use rendezvous_app::RuntimeError;
use rendezvous_client::{ApiError, TokenStoreError};
use thiserror::Error;

use crate::{config::ConfigError, rest::RestError};

/// Errors that end the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Terminal I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// REST client could not be set up
    #[error("REST client error: {0}")]
    Rest(#[from] RestError),

    /// REST call made during startup failed
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Token file could not be written
    #[error("token store error: {0}")]
    TokenStore(#[from] TokenStoreError),

    /// The driver was used after `stop`
    #[error("driver stopped")]
    Stopped,
}

impl From<RuntimeError<Self>> for CliError {
    fn from(err: RuntimeError<Self>) -> Self {
        match err {
            RuntimeError::Driver(e) => e,
        }
    }
}
