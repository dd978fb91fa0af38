use crate::error::PayrollError;
use crate::normalize::normalize_reference;
use crate::utils::{is_calendar_month, period_key};
use std::fmt;
use std::str::FromStr;

/// A real calendar month. Unlike a raw reference, it can never hold the extra-period month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if is_calendar_month(year, month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Parses a canonical `YYYY-MM` string.
    pub fn parse(canonical: &str) -> Option<Self> {
        let (year, month) = canonical.split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn key(&self) -> String {
        period_key(self.year, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PayrollError;

    /// Accepts any reference shape the normalizer understands.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_reference(s)
            .as_deref()
            .and_then(Period::parse)
            .ok_or_else(|| PayrollError::InvalidReference(s.to_string()))
    }
}
