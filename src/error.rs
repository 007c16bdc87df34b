use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineAnalyticsError {
    #[error("Invalid forecast thresholds: commit ({commit}) and upside ({upside}) must lie in 0..=100 with upside <= commit")]
    InvalidThresholds { commit: f64, upside: f64 },

    #[error("Invalid fiscal year end month {0}: must be between 1 and 12")]
    InvalidFiscalYearEndMonth(u32),

    #[error("Invalid top-N size {0}: must be at least 1")]
    InvalidTopN(usize),

    #[error("Invalid keyword cap {0}: at least one keyword must be credited per record")]
    InvalidKeywordCap(usize),

    #[error("Keyword vocabulary contains a blank phrase at position {0}")]
    BlankKeyword(usize),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineAnalyticsError>;
