use thiserror::Error;

#[derive(Debug, Error)]
pub enum TmtError {
    #[error("no word bank registered for language `{0}`")]
    UnknownLanguage(String),
    #[error("unsupported duration {0}s (expected one of 15, 30, 60, 120)")]
    InvalidDuration(u32),
    #[error("word bank `{name}` is malformed: {reason}")]
    WordBank { name: String, reason: String },
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, TmtError>;
