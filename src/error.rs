use thiserror::Error;

/// Main error type for repowiki operations
#[derive(Error, Debug)]
pub enum WikiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Request failed: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to parse wiki structure: {message}")]
    StructureParse { message: String, raw: String },

    #[error("Diagram render error: {0}")]
    Render(String),

    #[error("Invalid session state: {0}")]
    State(String),
}

impl From<reqwest::Error> for WikiError {
    fn from(err: reqwest::Error) -> Self {
        WikiError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WikiError>;
