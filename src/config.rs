use crate::error::{PayrollError, Result};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MIN_NATIVE_TEXT_LENGTH: usize = 100;
pub const DEFAULT_EXTRA_PERIOD_FALLBACK_MONTH: u32 = 11;
pub const DEFAULT_MIN_YEAR: i32 = 2000;
pub const DEFAULT_MAX_YEAR: i32 = 2100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProcessingConfig {
    #[schemars(
        description = "Pages whose trimmed native text is shorter than this need image-based recovery. Decided on the first page of each document."
    )]
    pub min_native_text_length: usize,

    #[schemars(
        description = "Calendar month (1-12) assigned to an extra-period (YYYY-13) reference when no sibling on the same page resolves it."
    )]
    pub extra_period_fallback_month: u32,

    #[schemars(description = "Lowest year accepted as a consolidation filter")]
    pub min_year: i32,

    #[schemars(description = "Highest year accepted as a consolidation filter")]
    pub max_year: i32,

    #[schemars(
        description = "Size of the page worker pool. When absent, the global rayon pool is used."
    )]
    pub worker_threads: Option<usize>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            min_native_text_length: DEFAULT_MIN_NATIVE_TEXT_LENGTH,
            extra_period_fallback_month: DEFAULT_EXTRA_PERIOD_FALLBACK_MONTH,
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
            worker_threads: None,
        }
    }
}

impl ProcessingConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.extra_period_fallback_month) {
            return Err(PayrollError::InvalidConfig(format!(
                "extra_period_fallback_month {} must be between 1 and 12",
                self.extra_period_fallback_month
            )));
        }

        if self.min_year > self.max_year {
            return Err(PayrollError::InvalidConfig(format!(
                "min_year {} is after max_year {}",
                self.min_year, self.max_year
            )));
        }

        if self.worker_threads == Some(0) {
            return Err(PayrollError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schema_for!(ProcessingConfig)
    }
}
