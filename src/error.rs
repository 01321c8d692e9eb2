use thiserror::Error;

#[derive(Error, Debug)]
pub enum CuratorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Collaborator error: {message}")]
    Api { message: String },

    #[error("Ambiguous labeling result for '{subject}': candidates {candidates:?}")]
    AmbiguousMatch {
        subject: String,
        candidates: Vec<String>,
    },

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, CuratorError>;
