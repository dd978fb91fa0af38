//! # Payroll History Builder
//!
//! A library for turning the text of payroll and pension statements into structured
//! line items, and those items into a per-code year×month matrix for one person.
//!
//! ## Core Concepts
//!
//! - **Layouts**: statements come in two layouts (`CAIXA` payroll slips and `FUNCEF`
//!   pension statements) whose columns appear in a different order
//! - **Line grammars**: each layout has a priority-ordered list of grammars; the first one
//!   that matches a whole line decides how it is read
//! - **Extra period**: a `YYYY-13` reference marks an end-of-year supplementary payment and
//!   is mapped onto a real month before consolidation
//! - **Consolidation**: entries are grouped by item code into a matrix with one column per
//!   month of every year in scope, with row, monthly and grand totals
//!
//! ## Example
//!
//! ```rust,ignore
//! use payroll_history_builder::*;
//!
//! let report = process_document(
//!     &DocumentDescriptor::new("statement-2016", Origin::Caixa),
//!     &my_text_source,
//!     &ProcessingConfig::default(),
//! );
//!
//! let catalog = ItemCatalog::new().with_item("2002", "SALARIO PADRAO", true);
//! let response = consolidate_entries(
//!     &PersonIdentity::new("12345678900"),
//!     &report.entries(),
//!     &catalog,
//!     Some("2016"),
//!     None,
//!     &ProcessingConfig::default(),
//! )?;
//! ```

pub mod assembler;
pub mod catalog;
pub mod config;
pub mod consolidation;
pub mod detection;
pub mod error;
pub mod grammar;
pub mod normalize;
pub mod period;
pub mod pipeline;
pub mod schema;
pub mod utils;

pub use assembler::{EntryAssembler, PageAssembly, PageContext, SiblingIndex};
pub use catalog::{CodeCatalog, ItemCatalog, ItemDefinition};
pub use config::ProcessingConfig;
pub use consolidation::{
    consolidate, ConsolidationEngine, ConsolidationFilter, ConsolidationOutcome,
    ConsolidationStats,
};
pub use detection::{detect_origin, detect_payment_month};
pub use error::{PayrollError, Result};
pub use grammar::{
    grammars_for, GrammarId, LineGrammar, LineOutcome, LineParser, PageParse, ParsedLine,
    SkipReason, SkippedLine,
};
pub use normalize::*;
pub use period::Period;
pub use pipeline::{
    DocumentDescriptor, DocumentProcessor, DocumentReport, ExecutionMode, PageReport,
    PageTextSource,
};
pub use schema::*;
pub use utils::*;

use log::{debug, info};

pub struct PayrollProcessor;

impl PayrollProcessor {
    pub fn process_document<S: PageTextSource + ?Sized>(
        document: &DocumentDescriptor,
        source: &S,
        config: &ProcessingConfig,
    ) -> Result<DocumentReport> {
        config.validate()?;

        let report = DocumentProcessor::new(config.clone()).process(document, source);
        debug!(
            "Document {} produced {} entries from {} lines",
            report.document_id,
            report.entry_count(),
            report.lines_seen()
        );

        Ok(report)
    }

    /// Validates the raw filters, then consolidates.
    ///
    /// Invalid filters are rejected before any entry is looked at.
    pub fn consolidate<C: CodeCatalog + ?Sized>(
        person: &PersonIdentity,
        entries: &[Entry],
        catalog: &C,
        year: Option<&str>,
        origin: Option<&str>,
        config: &ProcessingConfig,
    ) -> Result<ConsolidatedResponse> {
        config.validate()?;
        let filter = ConsolidationFilter::parse(year, origin, config)?;

        info!(
            "Consolidating {} entries for {} (year: {:?}, origin: {:?})",
            entries.len(),
            person,
            filter.year,
            filter.origin
        );

        ConsolidationEngine::new(catalog).consolidate(person, entries, &filter)
    }

    /// Parses every document and consolidates the combined entries in one call.
    pub fn build_history<S: PageTextSource>(
        person: &PersonIdentity,
        documents: &[(DocumentDescriptor, S)],
        catalog: &dyn CodeCatalog,
        year: Option<&str>,
        origin: Option<&str>,
        config: &ProcessingConfig,
    ) -> Result<ConsolidatedResponse> {
        config.validate()?;
        let filter = ConsolidationFilter::parse(year, origin, config)?;

        let processor = DocumentProcessor::new(config.clone());
        let entries: Vec<Entry> = documents
            .iter()
            .flat_map(|(descriptor, source)| processor.process(descriptor, source).into_entries())
            .collect();

        ConsolidationEngine::new(catalog).consolidate(person, &entries, &filter)
    }
}

pub fn process_document<S: PageTextSource + ?Sized>(
    document: &DocumentDescriptor,
    source: &S,
    config: &ProcessingConfig,
) -> Result<DocumentReport> {
    PayrollProcessor::process_document(document, source, config)
}

pub fn consolidate_entries<C: CodeCatalog + ?Sized>(
    person: &PersonIdentity,
    entries: &[Entry],
    catalog: &C,
    year: Option<&str>,
    origin: Option<&str>,
    config: &ProcessingConfig,
) -> Result<ConsolidatedResponse> {
    PayrollProcessor::consolidate(person, entries, catalog, year, origin, config)
}
