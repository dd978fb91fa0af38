//! Normalizers for the raw tokens captured from statement lines: monetary values,
//! period references, item codes and descriptions.

use crate::utils::collapse_whitespace;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

/// Month component that marks the extra (13th) period of a year.
pub const EXTRA_PERIOD_MONTH: &str = "13";

fn canonical_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("canonical reference regex"))
}

fn month_first_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{4})$").expect("month-first reference regex"))
}

fn year_first_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})/(\d{1,2})$").expect("year-first reference regex"))
}

/// Parses a localized monetary literal ("R$ 1.234,56", "-131,81") into an exact decimal.
///
/// `.` is always a thousands separator and `,` the decimal separator. Returns `None`
/// for anything that is not a plain number after that rewrite.
pub fn parse_value(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let without_prefix = trimmed.strip_prefix("R$").unwrap_or(trimmed);

    let compact: String = without_prefix
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let digits = compact.strip_prefix('-').unwrap_or(&compact);
    if digits.is_empty() || !digits.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if digits.chars().filter(|c| *c == '.').count() > 1 {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    Decimal::from_str(&compact).ok()
}

/// Maps `YYYY-MM`, `MM/YYYY` and `YYYY/MM` onto canonical `YYYY-MM`.
///
/// Only the shape is checked: `2016-13` is a valid extra-period sentinel here.
pub fn normalize_reference(raw: &str) -> Option<String> {
    let token = raw.trim();

    if canonical_reference_re().is_match(token) {
        return Some(token.to_string());
    }

    if let Some(caps) = month_first_reference_re().captures(token) {
        return Some(format!("{}-{:0>2}", &caps[2], &caps[1]));
    }

    if let Some(caps) = year_first_reference_re().captures(token) {
        return Some(format!("{}-{:0>2}", &caps[1], &caps[2]));
    }

    None
}

pub fn is_valid_reference(reference: &str) -> bool {
    canonical_reference_re().is_match(reference)
}

pub fn extract_year(reference: &str) -> Option<&str> {
    if !is_valid_reference(reference) {
        return None;
    }
    Some(&reference[..4])
}

pub fn extract_month(reference: &str) -> Option<&str> {
    if !is_valid_reference(reference) {
        return None;
    }
    Some(&reference[5..])
}

pub fn is_extra_period_reference(reference: &str) -> bool {
    extract_month(reference) == Some(EXTRA_PERIOD_MONTH)
}

/// Strips whitespace that column bleed leaves inside item codes ("4 416" -> "4416").
pub fn normalize_code(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

pub fn normalize_description(raw: &str) -> Option<String> {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
