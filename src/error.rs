use thiserror::Error;

use crate::callback::CallbackError;
use crate::command::{BuildError, ParseError};
use crate::config::ConfigError;
use crate::listener::ListenerError;
use crate::subprocess::ProcessError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command build error: {0}")]
    Build(#[from] BuildError),

    #[error("Command parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Folder listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Callback error: {0}")]
    Callback(#[from] CallbackError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Validation(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
