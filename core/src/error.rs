use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cannot parse date/time '{value}': {source}")]
    DateTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Unknown value '{value}' in column '{column}'")]
    UnknownValue { column: &'static str, value: String },

    #[error("Missing value in required column '{column}' (row {row})")]
    MissingValue { column: &'static str, row: usize },

    #[error("Invalid number '{value}' in column '{column}'")]
    InvalidNumber { column: &'static str, value: String },

    #[error("Fetch of '{file}' from {origin} failed with status {status}")]
    FetchStatus { origin: String, file: String, status: u16 },

    #[error("Group '{group}' has {size} observations; at least 2 are required")]
    GroupTooSmall { group: String, size: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
