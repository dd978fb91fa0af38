use crate::catalog::CodeCatalog;
use crate::config::ProcessingConfig;
use crate::error::{PayrollError, Result};
use crate::period::Period;
use crate::schema::{ConsolidatedResponse, ConsolidationRow, Entry, Origin, PersonIdentity};
use crate::utils::{month_keys_for_years, months};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationFilter {
    pub year: Option<i32>,
    pub origin: Option<Origin>,
}

impl ConsolidationFilter {
    /// Validates caller-supplied filters before any consolidation work starts.
    pub fn parse(
        year: Option<&str>,
        origin: Option<&str>,
        config: &ProcessingConfig,
    ) -> Result<Self> {
        let year = year
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                raw.parse::<i32>()
                    .ok()
                    .filter(|y| (config.min_year..=config.max_year).contains(y))
                    .ok_or_else(|| PayrollError::InvalidYear {
                        value: raw.to_string(),
                        min: config.min_year,
                        max: config.max_year,
                    })
            })
            .transpose()?;

        let origin = origin
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(str::parse::<Origin>)
            .transpose()?;

        Ok(Self { year, origin })
    }

    pub fn for_year(year: i32) -> Self {
        Self {
            year: Some(year),
            origin: None,
        }
    }

    fn accepts(&self, entry: &Entry) -> bool {
        if self.origin.is_some_and(|origin| origin != entry.origin) {
            return false;
        }
        match self.year {
            Some(year) => entry.effective().is_some_and(|p| p.year() == year),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationStats {
    pub entries_in: usize,
    pub inactive_code: usize,
    pub filtered_out: usize,
    /// Entries that passed the filters but have no effective period
    pub unplaced: usize,
    /// Codes whose total was reduced by the extra-period duplicate correction
    pub corrected_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationOutcome {
    pub response: ConsolidatedResponse,
    pub stats: ConsolidationStats,
}

/// Builds the per-code year×month matrix for one person.
///
/// Stateless apart from the borrowed catalog, so a single engine can serve concurrent requests.
pub struct ConsolidationEngine<'a, C: CodeCatalog + ?Sized> {
    catalog: &'a C,
}

impl<'a, C: CodeCatalog + ?Sized> ConsolidationEngine<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    pub fn consolidate(
        &self,
        person: &PersonIdentity,
        entries: &[Entry],
        filter: &ConsolidationFilter,
    ) -> Result<ConsolidatedResponse> {
        self.consolidate_with_stats(person, entries, filter)
            .map(|outcome| outcome.response)
    }

    pub fn consolidate_with_stats(
        &self,
        person: &PersonIdentity,
        entries: &[Entry],
        filter: &ConsolidationFilter,
    ) -> Result<ConsolidationOutcome> {
        let mut stats = ConsolidationStats {
            entries_in: entries.len(),
            ..Default::default()
        };

        let mut selected: Vec<&Entry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if !self.catalog.is_active(&entry.code) {
                stats.inactive_code += 1;
            } else if !filter.accepts(entry) {
                stats.filtered_out += 1;
            } else {
                selected.push(entry);
            }
        }

        if selected.is_empty() {
            info!(
                "Nothing to consolidate for {} ({} entries in, {} inactive, {} filtered)",
                person, stats.entries_in, stats.inactive_code, stats.filtered_out
            );
            return Err(PayrollError::NoEntriesFound(person.to_string()));
        }

        let mut placed: Vec<(&Entry, Period)> = Vec::with_capacity(selected.len());
        for entry in selected {
            match entry.effective() {
                Some(period) => placed.push((entry, period)),
                None => stats.unplaced += 1,
            }
        }

        let years: BTreeSet<i32> = match filter.year {
            Some(year) => BTreeSet::from([year]),
            None => placed.iter().map(|(_, period)| period.year()).collect(),
        };
        let cell_keys = month_keys_for_years(&years);

        let mut groups: BTreeMap<&str, Vec<(&Entry, Period)>> = BTreeMap::new();
        for (entry, period) in &placed {
            groups
                .entry(entry.code.as_str())
                .or_default()
                .push((*entry, *period));
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (code, group) in &groups {
            let (row, corrected) = build_row(code, group, &cell_keys)?;
            if corrected {
                stats.corrected_codes.push(code.to_string());
            }
            rows.push(row);
        }

        let mut monthly_totals: BTreeMap<String, Decimal> = BTreeMap::new();
        for key in &cell_keys {
            let total = checked_sum(key, rows.iter().map(|row| row.value(key)))?;
            monthly_totals.insert(key.clone(), total);
        }

        let grand_total = checked_sum("grand total", rows.iter().map(|row| row.total))?;

        info!(
            "Consolidated {} entries into {} rows across {} year(s) for {}",
            placed.len(),
            rows.len(),
            years.len(),
            person
        );
        debug!("Consolidation stats: {:?}", stats);

        Ok(ConsolidationOutcome {
            response: ConsolidatedResponse {
                person: person.clone(),
                years,
                months: months(),
                rows,
                monthly_totals,
                grand_total,
            },
            stats,
        })
    }
}

/// Sums without rust_decimal's panicking `+`; `label` names the row or cell in the error.
fn checked_sum(label: &str, values: impl IntoIterator<Item = Decimal>) -> Result<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(value))
        .ok_or_else(|| PayrollError::ValueOverflow {
            code: label.to_string(),
        })
}

/// Builds one matrix row; the flag reports whether the duplicate correction changed its total.
fn build_row(
    code: &str,
    group: &[(&Entry, Period)],
    cell_keys: &[String],
) -> Result<(ConsolidationRow, bool)> {
    let overflow = || PayrollError::ValueOverflow {
        code: code.to_string(),
    };

    let mut values: BTreeMap<String, Decimal> = cell_keys
        .iter()
        .map(|key| (key.clone(), Decimal::ZERO))
        .collect();

    for (entry, period) in group {
        if let Some(cell) = values.get_mut(&period.key()) {
            *cell = cell.checked_add(entry.value).ok_or_else(overflow)?;
        }
    }

    let cells = checked_sum(code, values.values().copied())?;
    let correction = duplicate_correction(group, &values).ok_or_else(overflow)?;
    let total = cells.checked_sub(correction).ok_or_else(overflow)?;

    let row = ConsolidationRow {
        code: code.to_string(),
        description: group.first().and_then(|(entry, _)| entry.description.clone()),
        values,
        total,
    };
    Ok((row, !correction.is_zero()))
}

/// Amount to take off a row total when one year's extra-period entries landed in
/// several months. The latest month is kept; every other colliding month with a
/// positive cell is removed in full. `None` on overflow.
fn duplicate_correction(
    group: &[(&Entry, Period)],
    values: &BTreeMap<String, Decimal>,
) -> Option<Decimal> {
    let mut collisions: BTreeMap<i32, BTreeSet<u32>> = BTreeMap::new();

    for (entry, period) in group {
        if !entry.has_extra_period_reference() {
            continue;
        }
        if entry.reference_year() == Some(period.year()) {
            collisions
                .entry(period.year())
                .or_default()
                .insert(period.month());
        }
    }

    let mut correction = Decimal::ZERO;
    for (year, months) in &collisions {
        if months.len() < 2 {
            continue;
        }
        let Some(&last) = months.iter().next_back() else {
            continue;
        };

        for &month in months.iter().filter(|&&m| m != last) {
            let Some(period) = Period::new(*year, month) else {
                continue;
            };
            let cell = values.get(&period.key()).copied().unwrap_or(Decimal::ZERO);
            if cell > Decimal::ZERO {
                debug!(
                    "Extra-period collision in {}: dropping {} from {} (keeping month {:02})",
                    year,
                    cell,
                    period.key(),
                    last
                );
                correction = correction.checked_add(cell)?;
            }
        }
    }

    Some(correction)
}

pub fn consolidate<C: CodeCatalog + ?Sized>(
    person: &PersonIdentity,
    entries: &[Entry],
    catalog: &C,
    filter: &ConsolidationFilter,
) -> Result<ConsolidatedResponse> {
    ConsolidationEngine::new(catalog).consolidate(person, entries, filter)
}
