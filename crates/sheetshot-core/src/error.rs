use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("malformed metadata store: {0}")]
    MalformedStore(String),

    #[error("invalid scope key: {0}")]
    InvalidScope(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
