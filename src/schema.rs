use crate::error::PayrollError;
use crate::normalize::{extract_year, is_extra_period_reference};
use crate::period::Period;
use rust_decimal::Decimal;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Origin {
    #[schemars(
        description = "Payroll statement layout: code [description] [reference MM/YYYY] [3-digit intermediate code] value"
    )]
    Caixa,

    #[schemars(
        description = "Pension statement layout: code reference(YYYY/MM) description value. The reference month may be 13 for the extra period."
    )]
    Funcef,
}

impl Origin {
    pub const ALL: [Origin; 2] = [Origin::Caixa, Origin::Funcef];

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Caixa => "CAIXA",
            Origin::Funcef => "FUNCEF",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = PayrollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Origin::ALL
            .into_iter()
            .find(|origin| origin.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| PayrollError::InvalidOrigin(s.to_string()))
    }
}

/// One monetary item read from a statement page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Entry {
    #[schemars(description = "Item code with internal whitespace removed, e.g. \"4416\"")]
    pub code: String,

    #[schemars(description = "Whitespace-collapsed item description")]
    pub description: Option<String>,

    #[schemars(
        description = "Canonical YYYY-MM period the item refers to. YYYY-13 marks the extra period of that year."
    )]
    pub reference: Option<String>,

    #[schemars(
        description = "Canonical YYYY-MM month in which the item was paid. Overrides the reference when present."
    )]
    pub payment_month: Option<String>,

    #[schemars(
        description = "Resolved calendar month (YYYY-MM) used to place the item in the matrix. Absent when no period could be resolved."
    )]
    #[serde(default)]
    pub effective_period: Option<String>,

    #[schemars(description = "Exact monetary amount")]
    pub value: Decimal,

    pub origin: Origin,

    #[schemars(description = "1-based page number the item was read from")]
    pub page: u32,

    pub document_id: String,
}

impl Entry {
    pub fn has_extra_period_reference(&self) -> bool {
        self.reference
            .as_deref()
            .is_some_and(is_extra_period_reference)
    }

    /// Year carried by the raw reference, including the extra-period sentinel.
    pub fn reference_year(&self) -> Option<i32> {
        self.reference
            .as_deref()
            .and_then(extract_year)
            .and_then(|y| y.parse().ok())
    }

    pub fn effective(&self) -> Option<Period> {
        self.effective_period.as_deref().and_then(Period::parse)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PersonIdentity {
    #[schemars(description = "Taxpayer identifier (CPF)")]
    pub cpf: String,
    pub name: Option<String>,
}

impl PersonIdentity {
    pub fn new(cpf: impl Into<String>) -> Self {
        Self {
            cpf: cpf.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for PersonIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.cpf),
            None => f.write_str(&self.cpf),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidationRow {
    pub code: String,
    pub description: Option<String>,

    #[schemars(
        description = "One YYYY-MM key for each of the 12 months of every year in scope. Missing months are zero."
    )]
    pub values: BTreeMap<String, Decimal>,

    #[schemars(
        description = "Sum of the row's cells, less any extra-period duplicate correction"
    )]
    pub total: Decimal,
}

impl ConsolidationRow {
    pub fn value(&self, period_key: &str) -> Decimal {
        self.values.get(period_key).copied().unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidatedResponse {
    pub person: PersonIdentity,
    pub years: BTreeSet<i32>,

    #[schemars(description = "The fixed month columns \"01\" through \"12\"")]
    pub months: Vec<String>,

    #[schemars(description = "One row per item code, sorted by code")]
    pub rows: Vec<ConsolidationRow>,

    pub monthly_totals: BTreeMap<String, Decimal>,

    #[schemars(
        description = "Sum of the row totals. Differs from the sum of monthly_totals when a duplicate correction applied."
    )]
    pub grand_total: Decimal,
}

impl ConsolidatedResponse {
    pub fn row(&self, code: &str) -> Option<&ConsolidationRow> {
        self.rows.iter().find(|row| row.code == code)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schema_for!(ConsolidatedResponse)
    }
}

pub fn entry_json_schema() -> schemars::schema::RootSchema {
    schema_for!(Entry)
}
