use thiserror::Error;

/// Error types for Telegrify operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing or invalid settings)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Filesystem error while reading config or plugins
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed YAML document
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Malformed JSON document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API error from Telegram
    #[error("Telegram API error: {0}")]
    Api(String),

    /// Template failed to parse or render
    #[error("Template error: {0}")]
    Template(String),

    /// Error related to message formatting
    #[error("Formatting error: {0}")]
    Formatting(String),

    /// No formatter registered under the requested name
    #[error("Formatter '{0}' not found")]
    FormatterNotFound(String),

    /// Neither the request nor the endpoint named a destination chat
    #[error("No chat_id specified in config or request")]
    NoDestination,
}

impl Error {
    /// Create a new configuration error
    pub fn configuration<S: AsRef<str>>(message: S) -> Self {
        Error::Configuration(message.as_ref().to_string())
    }

    /// Create a new API error
    pub fn api<S: AsRef<str>>(message: S) -> Self {
        Error::Api(message.as_ref().to_string())
    }

    /// Create a new formatting error
    pub fn formatting<S: AsRef<str>>(message: S) -> Self {
        Error::Formatting(message.as_ref().to_string())
    }
}

impl From<minijinja::Error> for Error {
    fn from(err: minijinja::Error) -> Self {
        Error::Template(err.to_string())
    }
}
