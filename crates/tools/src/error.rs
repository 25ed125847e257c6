use jsonfy_browser::{BrowserError, ExtractError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Invalid value {value:?} for {key}: {reason}")]
    Config {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Empty selector")]
    EmptySelector,

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<ExtractError> for ToolError {
    fn from(err: ExtractError) -> Self {
        ToolError::Browser(BrowserError::Extract(err))
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;
