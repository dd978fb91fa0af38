use crate::config::ProcessingConfig;
use crate::grammar::ParsedLine;
use crate::normalize::{extract_year, is_extra_period_reference, normalize_reference};
use crate::period::Period;
use crate::schema::{Entry, Origin};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the surrounding document says about one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub document_id: String,
    pub page: u32,
    pub origin: Origin,
    /// Payment month declared for the page, in any reference shape.
    pub payment_month: Option<String>,
}

impl PageContext {
    pub fn new(document_id: impl Into<String>, page: u32, origin: Origin) -> Self {
        Self {
            document_id: document_id.into(),
            page,
            origin,
            payment_month: None,
        }
    }

    pub fn with_payment_month(mut self, payment_month: impl Into<String>) -> Self {
        self.payment_month = Some(payment_month.into());
        self
    }
}

/// Normal (non extra-period) references seen on each page, in encounter order.
#[derive(Debug, Clone, Default)]
pub struct SiblingIndex {
    periods: HashMap<(String, u32), Vec<Period>>,
}

impl SiblingIndex {
    pub fn build<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Self {
        let mut periods: HashMap<(String, u32), Vec<Period>> = HashMap::new();

        for entry in entries {
            let Some(period) = entry.reference.as_deref().and_then(Period::parse) else {
                continue;
            };
            periods
                .entry((entry.document_id.clone(), entry.page))
                .or_default()
                .push(period);
        }

        Self { periods }
    }

    /// First month found on the page for the given year.
    pub fn month_for(&self, document_id: &str, page: u32, year: i32) -> Option<u32> {
        self.periods
            .get(&(document_id.to_string(), page))?
            .iter()
            .find(|period| period.year() == year)
            .map(Period::month)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAssembly {
    pub entries: Vec<Entry>,
    /// Raw reference tokens that could not be normalized. Their entries are kept without a reference.
    pub unreadable_references: Vec<String>,
    /// Entries for which no effective period could be resolved.
    pub unplaced: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct EntryAssembler {
    fallback_month: u32,
}

impl Default for EntryAssembler {
    fn default() -> Self {
        Self::new(&ProcessingConfig::default())
    }
}

impl EntryAssembler {
    pub fn new(config: &ProcessingConfig) -> Self {
        Self {
            fallback_month: config.extra_period_fallback_month,
        }
    }

    pub fn assemble_page(&self, lines: &[ParsedLine], context: &PageContext) -> PageAssembly {
        let payment_month = context
            .payment_month
            .as_deref()
            .and_then(normalize_reference);

        let mut unreadable_references = Vec::new();
        let drafts: Vec<Entry> = lines
            .iter()
            .map(|line| {
                let reference = match line.reference.as_deref() {
                    Some(raw) => {
                        let normalized = normalize_reference(raw);
                        if normalized.is_none() {
                            unreadable_references.push(raw.to_string());
                        }
                        normalized
                    }
                    None => payment_month.clone(),
                };

                Entry {
                    code: line.code.clone(),
                    description: line.description.clone(),
                    reference,
                    payment_month: payment_month.clone(),
                    effective_period: None,
                    value: line.value,
                    origin: context.origin,
                    page: context.page,
                    document_id: context.document_id.clone(),
                }
            })
            .collect();

        let siblings = SiblingIndex::build(&drafts);

        let entries: Vec<Entry> = drafts
            .iter()
            .map(|draft| Entry {
                effective_period: self.resolve(draft, &siblings).map(|p| p.key()),
                ..draft.clone()
            })
            .collect();

        let unplaced = entries
            .iter()
            .filter(|entry| entry.effective_period.is_none())
            .count();

        debug!(
            "Assembled {} entries for document {} page {} ({} unplaced)",
            entries.len(),
            context.document_id,
            context.page,
            unplaced
        );

        PageAssembly {
            entries,
            unreadable_references,
            unplaced,
        }
    }

    /// Resolves the calendar month an entry is placed in.
    ///
    /// Payment month first, then the reference itself. An extra-period reference takes the
    /// month of the first same-year sibling on its page, or the configured fallback month.
    pub fn resolve(&self, entry: &Entry, siblings: &SiblingIndex) -> Option<Period> {
        if let Some(period) = entry.payment_month.as_deref().and_then(Period::parse) {
            return Some(period);
        }

        let reference = entry.reference.as_deref()?;

        if is_extra_period_reference(reference) {
            let year: i32 = extract_year(reference)?.parse().ok()?;
            let month = siblings
                .month_for(&entry.document_id, entry.page, year)
                .unwrap_or(self.fallback_month);
            return Period::new(year, month);
        }

        Period::parse(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarId;
    use rust_decimal::Decimal;

    fn line(code: &str, reference: Option<&str>, cents: i64) -> ParsedLine {
        ParsedLine {
            code: code.to_string(),
            description: Some(format!("ITEM {}", code)),
            reference: reference.map(str::to_string),
            value: Decimal::new(cents, 2),
            grammar: GrammarId::ReferenceFirst,
        }
    }

    fn context(page: u32) -> PageContext {
        PageContext::new("doc-1", page, Origin::Funcef)
    }

    #[test]
    fn test_reference_is_canonicalized() {
        let assembly = EntryAssembler::default()
            .assemble_page(&[line("2002", Some("01/2016"), 526900)], &context(1));
        let entry = &assembly.entries[0];
        assert_eq!(entry.reference.as_deref(), Some("2016-01"));
        assert_eq!(entry.effective_period.as_deref(), Some("2016-01"));
        assert_eq!(entry.origin, Origin::Funcef);
        assert_eq!(entry.page, 1);
        assert_eq!(entry.document_id, "doc-1");
    }

    #[test]
    fn test_payment_month_wins_over_extra_period() {
        let ctx = context(1).with_payment_month("2016-05");
        let assembly = EntryAssembler::default().assemble_page(
            &[
                line("2033", Some("2016/13"), 10000),
                line("2002", Some("2016/03"), 10000),
            ],
            &ctx,
        );
        assert_eq!(assembly.entries[0].reference.as_deref(), Some("2016-13"));
        assert_eq!(
            assembly.entries[0].effective_period.as_deref(),
            Some("2016-05")
        );
        assert_eq!(
            assembly.entries[1].effective_period.as_deref(),
            Some("2016-05")
        );
    }

    #[test]
    fn test_extra_period_takes_sibling_month() {
        let assembly = EntryAssembler::default().assemble_page(
            &[
                line("2033", Some("2016/13"), 10000),
                line("2002", Some("2015/12"), 10000),
                line("2004", Some("2016/02"), 10000),
                line("2005", Some("2016/07"), 10000),
            ],
            &context(3),
        );
        assert_eq!(
            assembly.entries[0].effective_period.as_deref(),
            Some("2016-02")
        );
    }

    #[test]
    fn test_extra_period_falls_back_to_november() {
        let assembly = EntryAssembler::default().assemble_page(
            &[
                line("2033", Some("2016/13"), 10000),
                line("2002", Some("2017/01"), 10000),
            ],
            &context(1),
        );
        assert_eq!(
            assembly.entries[0].effective_period.as_deref(),
            Some("2016-11")
        );
    }

    #[test]
    fn test_fallback_month_is_configurable() {
        let config = ProcessingConfig {
            extra_period_fallback_month: 12,
            ..Default::default()
        };
        let assembly = EntryAssembler::new(&config)
            .assemble_page(&[line("2033", Some("2016/13"), 10000)], &context(1));
        assert_eq!(
            assembly.entries[0].effective_period.as_deref(),
            Some("2016-12")
        );
    }

    #[test]
    fn test_siblings_are_scoped_to_their_page() {
        let assembler = EntryAssembler::default();
        let page_one = assembler.assemble_page(&[line("2002", Some("2016/04"), 100)], &context(1));
        let page_two = assembler.assemble_page(&[line("2033", Some("2016/13"), 100)], &context(2));

        let mut all = page_one.entries.clone();
        all.extend(page_two.entries.clone());
        let index = SiblingIndex::build(&all);
        assert_eq!(index.month_for("doc-1", 1, 2016), Some(4));
        assert_eq!(index.month_for("doc-1", 2, 2016), None);
        assert_eq!(
            page_two.entries[0].effective_period.as_deref(),
            Some("2016-11")
        );
    }

    #[test]
    fn test_line_without_reference_inherits_page_month() {
        let ctx = PageContext::new("doc-2", 1, Origin::Caixa).with_payment_month("JANEIRO");
        let assembly = EntryAssembler::default().assemble_page(&[line("4412", None, 11537)], &ctx);
        let entry = &assembly.entries[0];
        assert_eq!(entry.reference, None);
        assert_eq!(entry.payment_month, None);
        assert_eq!(entry.effective_period, None);
        assert_eq!(assembly.unplaced, 1);

        let ctx = PageContext::new("doc-2", 1, Origin::Caixa).with_payment_month("01/2016");
        let assembly = EntryAssembler::default().assemble_page(&[line("4412", None, 11537)], &ctx);
        let entry = &assembly.entries[0];
        assert_eq!(entry.reference.as_deref(), Some("2016-01"));
        assert_eq!(entry.payment_month.as_deref(), Some("2016-01"));
        assert_eq!(entry.effective_period.as_deref(), Some("2016-01"));
        assert_eq!(assembly.unplaced, 0);
    }

    #[test]
    fn test_unreadable_reference_is_reported() {
        let assembly = EntryAssembler::default()
            .assemble_page(&[line("2002", Some("13/20166"), 100)], &context(1));
        assert_eq!(assembly.entries.len(), 1);
        assert_eq!(assembly.entries[0].reference, None);
        assert_eq!(assembly.unreadable_references, vec!["13/20166".to_string()]);
        assert_eq!(assembly.unplaced, 1);
    }

    #[test]
    fn test_month_first_extra_period_stays_unplaced() {
        let assembly = EntryAssembler::default()
            .assemble_page(&[line("2002", Some("14/2016"), 100)], &context(1));
        assert_eq!(assembly.entries[0].reference.as_deref(), Some("2016-14"));
        assert_eq!(assembly.entries[0].effective_period, None);
    }
}
