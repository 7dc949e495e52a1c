use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request must serialize to a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Incomplete docker command: {0}")]
    Incomplete(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Failed to tokenize command: {0}")]
    Tokenize(#[from] shell_words::ParseError),

    #[error("Invalid JSON payload: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("Missing value for option {0}")]
    MissingValue(String),

    #[error("Invalid {option} value '{value}': expected {expected}")]
    InvalidPair {
        option: String,
        value: String,
        expected: &'static str,
    },
}
