use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Oracle(String),

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Language preference error: {0}")]
    Preference(String),
}

pub type Result<T> = std::result::Result<T, TranslateError>;
