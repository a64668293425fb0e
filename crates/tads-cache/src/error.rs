use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt row for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Cache not available: {0}")]
    Unavailable(String),
}
