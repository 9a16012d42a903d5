use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocketError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Protocol anomaly: {0}")]
    Protocol(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Step '{step}' cannot advance while '{blocking}' is not completed")]
    StepOrder { step: String, blocking: String },

    #[error("Job {0} is already terminal")]
    JobTerminal(String),

    #[error("An extraction session is already active for document {0}")]
    SessionActive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DocketError>;
