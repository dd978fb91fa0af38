use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayrollError {
    #[error("Invalid year filter '{value}': must be an integer between {min} and {max}")]
    InvalidYear { value: String, min: i32, max: i32 },

    #[error("Invalid origin '{0}': expected CAIXA or FUNCEF")]
    InvalidOrigin(String),

    #[error("Invalid reference '{0}': expected YYYY-MM, MM/YYYY or YYYY/MM")]
    InvalidReference(String),

    #[error("No entries found for {0}")]
    NoEntriesFound(String),

    #[error("Value overflow while totalling {code}")]
    ValueOverflow { code: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Text extraction failed on page {page}: {details}")]
    ExtractionError { page: u32, details: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PayrollError {
    /// True for the "nothing to consolidate" outcome, which callers usually render
    /// as an empty result rather than a failure.
    pub fn is_nothing_found(&self) -> bool {
        matches!(self, PayrollError::NoEntriesFound(_))
    }
}

pub type Result<T> = std::result::Result<T, PayrollError>;
