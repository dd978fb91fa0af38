use crate::assembler::{EntryAssembler, PageContext};
use crate::config::ProcessingConfig;
use crate::detection::{detect_origin, detect_payment_month};
use crate::error::Result;
use crate::grammar::{LineParser, SkippedLine};
use crate::schema::{Entry, Origin};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Text extraction collaborator for one document.
///
/// `extract_text` must be safe to call from several worker threads at once.
/// `recover_text` (image-based recovery) is only ever called from one thread.
pub trait PageTextSource: Sync {
    fn page_count(&self) -> u32;

    fn extract_text(&self, page: u32) -> Result<String>;

    fn recover_text(&self, _page: u32) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub document_id: String,
    /// Layout assumed for pages that are neither declared nor detected
    pub default_origin: Origin,
    /// Layout declared per page by an upstream detector
    #[serde(default)]
    pub page_origins: BTreeMap<u32, Origin>,
    /// Payment month used when a page header carries none
    #[serde(default)]
    pub payment_month: Option<String>,
}

impl DocumentDescriptor {
    pub fn new(document_id: impl Into<String>, default_origin: Origin) -> Self {
        Self {
            document_id: document_id.into(),
            default_origin,
            page_origins: BTreeMap::new(),
            payment_month: None,
        }
    }

    pub fn with_page_origin(mut self, page: u32, origin: Origin) -> Self {
        self.page_origins.insert(page, origin);
        self
    }

    pub fn with_payment_month(mut self, payment_month: impl Into<String>) -> Self {
        self.payment_month = Some(payment_month.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    pub page: u32,
    pub origin: Origin,
    pub payment_month: Option<String>,
    pub lines_seen: usize,
    pub skipped: Vec<SkippedLine>,
    pub unreadable_references: Vec<String>,
    pub entries: Vec<Entry>,
    pub used_recovery: bool,
    pub error: Option<String>,
}

impl PageReport {
    fn failed(page: u32, origin: Origin, error: String) -> Self {
        Self {
            page,
            origin,
            payment_month: None,
            lines_seen: 0,
            skipped: Vec::new(),
            unreadable_references: Vec::new(),
            entries: Vec::new(),
            used_recovery: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document_id: String,
    pub mode: ExecutionMode,
    pub pages: Vec<PageReport>,
}

impl DocumentReport {
    /// Every entry of the document, in page order.
    pub fn entries(&self) -> Vec<Entry> {
        self.pages
            .iter()
            .flat_map(|page| page.entries.iter().cloned())
            .collect()
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.pages
            .into_iter()
            .flat_map(|page| page.entries)
            .collect()
    }

    pub fn lines_seen(&self) -> usize {
        self.pages.iter().map(|page| page.lines_seen).sum()
    }

    pub fn entry_count(&self) -> usize {
        self.pages.iter().map(|page| page.entries.len()).sum()
    }

    pub fn skipped_lines(&self) -> usize {
        self.pages.iter().map(|page| page.skipped.len()).sum()
    }

    pub fn failed_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|page| page.error.is_some())
            .map(|page| page.page)
            .collect()
    }
}

pub struct DocumentProcessor {
    config: ProcessingConfig,
    assembler: EntryAssembler,
    pool: Option<rayon::ThreadPool>,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new(ProcessingConfig::default())
    }
}

impl DocumentProcessor {
    pub fn new(config: ProcessingConfig) -> Self {
        let assembler = EntryAssembler::new(&config);
        let pool = config.worker_threads.and_then(|threads| {
            match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(
                        "Could not build a {}-thread page pool ({}); using the global pool",
                        threads, e
                    );
                    None
                }
            }
        });

        Self {
            config,
            assembler,
            pool,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Threads in the dedicated page pool, or `None` when the global pool is used.
    pub fn worker_threads(&self) -> Option<usize> {
        self.pool.as_ref().map(|pool| pool.current_num_threads())
    }

    /// Picks the execution mode for a whole document from its first page.
    ///
    /// A first page with too little native text means image-based recovery will be needed,
    /// and recovery cannot run concurrently.
    pub fn choose_mode<S: PageTextSource + ?Sized>(&self, source: &S) -> ExecutionMode {
        self.sample_first_page(source).0
    }

    /// Returns the mode together with the first page's extraction, so it is not repeated.
    fn sample_first_page<S: PageTextSource + ?Sized>(
        &self,
        source: &S,
    ) -> (ExecutionMode, Option<Result<String>>) {
        if source.page_count() == 0 {
            return (ExecutionMode::Parallel, None);
        }

        let sample = source.extract_text(1);
        let mode = match &sample {
            Ok(text) if text.trim().chars().count() >= self.config.min_native_text_length => {
                ExecutionMode::Parallel
            }
            Ok(_) => ExecutionMode::Sequential,
            Err(e) => {
                warn!("Could not sample first page ({}); processing sequentially", e);
                ExecutionMode::Sequential
            }
        };

        (mode, Some(sample))
    }

    pub fn process<S: PageTextSource + ?Sized>(
        &self,
        document: &DocumentDescriptor,
        source: &S,
    ) -> DocumentReport {
        let page_count = source.page_count();
        let (mode, first_page) = self.sample_first_page(source);

        info!(
            "Processing document {} ({} pages, {:?})",
            document.document_id, page_count, mode
        );

        let pages = match (mode, first_page) {
            (_, None) => Vec::new(),
            (ExecutionMode::Sequential, Some(first_page)) => {
                let mut pages = Vec::with_capacity(page_count as usize);
                pages.push(self.process_page(document, source, 1, first_page, true));
                pages.extend((2..=page_count).map(|page| {
                    self.process_page(document, source, page, source.extract_text(page), true)
                }));
                pages
            }
            (ExecutionMode::Parallel, Some(first_page)) => {
                self.process_parallel(document, source, page_count, first_page)
            }
        };

        let report = DocumentReport {
            document_id: document.document_id.clone(),
            mode,
            pages,
        };

        info!(
            "Document {}: {} lines seen, {} entries, {} lines skipped, {} failed pages",
            report.document_id,
            report.lines_seen(),
            report.entry_count(),
            report.skipped_lines(),
            report.failed_pages().len()
        );

        report
    }

    fn process_parallel<S: PageTextSource + ?Sized>(
        &self,
        document: &DocumentDescriptor,
        source: &S,
        page_count: u32,
        first_page: Result<String>,
    ) -> Vec<PageReport> {
        let run = move || {
            let (first, rest) = rayon::join(
                || self.process_page(document, source, 1, first_page, false),
                || {
                    (2..=page_count)
                        .into_par_iter()
                        .map(|page| {
                            self.process_page(document, source, page, source.extract_text(page), false)
                        })
                        .collect::<Vec<_>>()
                },
            );

            let mut pages = Vec::with_capacity(rest.len() + 1);
            pages.push(first);
            pages.extend(rest);
            pages
        };

        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn process_page<S: PageTextSource + ?Sized>(
        &self,
        document: &DocumentDescriptor,
        source: &S,
        page: u32,
        extracted: Result<String>,
        allow_recovery: bool,
    ) -> PageReport {
        let declared_origin = document.page_origins.get(&page).copied();

        let mut text = match extracted {
            Ok(text) => text,
            Err(e) => {
                warn!("Page {} of {} failed: {}", page, document.document_id, e);
                return PageReport::failed(
                    page,
                    declared_origin.unwrap_or(document.default_origin),
                    e.to_string(),
                );
            }
        };

        let mut used_recovery = false;
        if allow_recovery && text.trim().chars().count() < self.config.min_native_text_length {
            match source.recover_text(page) {
                Ok(Some(recovered)) if !recovered.trim().is_empty() => {
                    debug!("Page {} of {} recovered from image", page, document.document_id);
                    text = recovered;
                    used_recovery = true;
                }
                Ok(_) => {}
                Err(e) => warn!(
                    "Recovery failed on page {} of {} ({}); keeping native text",
                    page, document.document_id, e
                ),
            }
        }

        let origin = declared_origin
            .or_else(|| detect_origin(&text))
            .unwrap_or(document.default_origin);
        let payment_month = detect_payment_month(&text).or_else(|| document.payment_month.clone());

        let parse = LineParser::new(origin).parse_page(&text);

        let context = PageContext {
            document_id: document.document_id.clone(),
            page,
            origin,
            payment_month: payment_month.clone(),
        };
        let assembly = self.assembler.assemble_page(&parse.parsed, &context);

        debug!(
            "Page {} of {}: {} lines, {} entries, {} skipped",
            page,
            document.document_id,
            parse.lines_seen,
            assembly.entries.len(),
            parse.skipped.len()
        );

        PageReport {
            page,
            origin,
            payment_month,
            lines_seen: parse.lines_seen,
            skipped: parse.skipped,
            unreadable_references: assembly.unreadable_references,
            entries: assembly.entries,
            used_recovery,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayrollError;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Pages {
        pages: Vec<String>,
        recovered: Option<String>,
        recoveries: AtomicUsize,
        first_page_reads: AtomicUsize,
        worker_threads_seen: AtomicUsize,
    }

    impl Pages {
        fn new(pages: &[&str]) -> Self {
            Self {
                pages: pages.iter().map(|p| p.to_string()).collect(),
                recovered: None,
                recoveries: AtomicUsize::new(0),
                first_page_reads: AtomicUsize::new(0),
                worker_threads_seen: AtomicUsize::new(0),
            }
        }
    }

    impl PageTextSource for Pages {
        fn page_count(&self) -> u32 {
            self.pages.len() as u32
        }

        fn extract_text(&self, page: u32) -> Result<String> {
            if page == 1 {
                self.first_page_reads.fetch_add(1, Ordering::SeqCst);
            } else {
                self.worker_threads_seen
                    .store(rayon::current_num_threads(), Ordering::SeqCst);
            }
            let text = self
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default();
            if text == "BROKEN" {
                return Err(PayrollError::ExtractionError {
                    page,
                    details: "corrupt stream".to_string(),
                });
            }
            Ok(text)
        }

        fn recover_text(&self, _page: u32) -> Result<Option<String>> {
            self.recoveries.fetch_add(1, Ordering::SeqCst);
            Ok(self.recovered.clone())
        }
    }

    fn long_caixa_page(line: &str) -> String {
        format!(
            "CAIXA ECONOMICA FEDERAL - DEMONSTRATIVO DE PAGAMENTO\nMês/Ano de Pagamento: JANEIRO/2016\nAgência 2789 Operação 001\n{}\n",
            line
        )
    }

    #[test]
    fn test_long_first_page_runs_in_parallel() {
        let pages = Pages::new(&[
            &long_caixa_page("2002 SALARIO PADRAO 01/2016 5.269,00"),
            &long_caixa_page("4412 115,37"),
        ]);
        let report = DocumentProcessor::default()
            .process(&DocumentDescriptor::new("doc-1", Origin::Caixa), &pages);

        assert_eq!(report.mode, ExecutionMode::Parallel);
        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.pages[0].page, 1);
        assert_eq!(report.pages[1].page, 2);

        let entries = report.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].code, "2002");
        assert_eq!(entries[0].payment_month.as_deref(), Some("2016-01"));
        assert_eq!(entries[1].code, "4412");
        assert_eq!(entries[1].page, 2);
        assert_eq!(pages.recoveries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_short_first_page_runs_sequentially_with_recovery() {
        let mut pages = Pages::new(&["", "4 430 2018/01 CONTRIBUIÇÃO EXTRAORDINARIA 2014 131,81"]);
        pages.recovered = Some("4 430 2018/02 CONTRIBUIÇÃO EXTRAORDINARIA 2014 131,81".to_string());

        let document = DocumentDescriptor::new("doc-2", Origin::Funcef);
        let report = DocumentProcessor::default().process(&document, &pages);

        assert_eq!(report.mode, ExecutionMode::Sequential);
        assert!(report.pages[0].used_recovery);
        assert!(report.pages[1].used_recovery);
        assert_eq!(pages.recoveries.load(Ordering::SeqCst), 2);
        assert_eq!(report.entry_count(), 2);
        assert_eq!(report.pages[0].entries[0].reference.as_deref(), Some("2018-02"));
    }

    #[test]
    fn test_failed_recovery_keeps_native_text() {
        let pages = Pages::new(&["4412 115,37"]);
        let report = DocumentProcessor::default()
            .process(&DocumentDescriptor::new("doc-3", Origin::Caixa), &pages);

        assert_eq!(report.mode, ExecutionMode::Sequential);
        assert!(!report.pages[0].used_recovery);
        assert_eq!(report.pages[0].entries.len(), 1);
        assert_eq!(report.pages[0].entries[0].value, Decimal::new(11537, 2));
    }

    #[test]
    fn test_page_errors_do_not_stop_the_document() {
        let pages = Pages::new(&[&long_caixa_page("2002 SALARIO PADRAO 01/2016 5.269,00"), "BROKEN"]);
        let report = DocumentProcessor::default()
            .process(&DocumentDescriptor::new("doc-4", Origin::Caixa), &pages);

        assert_eq!(report.failed_pages(), vec![2]);
        assert_eq!(report.entry_count(), 1);
        assert!(report.pages[1].error.is_some());
    }

    #[test]
    fn test_declared_page_origin_wins_over_detection() {
        let page = long_caixa_page("4 430 2018/01 CONTRIBUIÇÃO EXTRAORDINARIA 2014 131,81");
        let pages = Pages::new(&[&page]);
        let document = DocumentDescriptor::new("doc-5", Origin::Caixa).with_page_origin(1, Origin::Funcef);
        let report = DocumentProcessor::default().process(&document, &pages);

        assert_eq!(report.pages[0].origin, Origin::Funcef);
        assert_eq!(report.entry_count(), 1);
        assert_eq!(report.pages[0].entries[0].code, "4430");
    }

    #[test]
    fn test_document_payment_month_is_the_fallback() {
        let pages = Pages::new(&["2002 SALARIO PADRAO 5.825,00"]);
        let document = DocumentDescriptor::new("doc-6", Origin::Caixa).with_payment_month("03/2016");
        let report = DocumentProcessor::default().process(&document, &pages);

        let entry = &report.pages[0].entries[0];
        assert_eq!(entry.payment_month.as_deref(), Some("2016-03"));
        assert_eq!(entry.effective_period.as_deref(), Some("2016-03"));
    }

    #[test]
    fn test_dedicated_worker_pool() {
        let config = ProcessingConfig {
            worker_threads: Some(2),
            ..Default::default()
        };
        let pages = Pages::new(&[
            &long_caixa_page("2002 SALARIO PADRAO 01/2016 5.269,00"),
            &long_caixa_page("2002 SALARIO PADRAO 02/2016 5.269,00"),
            &long_caixa_page("2002 SALARIO PADRAO 03/2016 5.269,00"),
        ]);
        let report = DocumentProcessor::new(config)
            .process(&DocumentDescriptor::new("doc-7", Origin::Caixa), &pages);

        assert_eq!(report.mode, ExecutionMode::Parallel);
        let references: Vec<String> = report
            .into_entries()
            .into_iter()
            .filter_map(|e| e.reference)
            .collect();
        assert_eq!(references, vec!["2016-01", "2016-02", "2016-03"]);
    }

    #[test]
    fn test_worker_pool_is_reused_across_documents() {
        let config = ProcessingConfig {
            worker_threads: Some(2),
            ..Default::default()
        };
        let processor = DocumentProcessor::new(config);
        assert_eq!(processor.worker_threads(), Some(2));

        for (id, month) in [("doc-a", "01"), ("doc-b", "02")] {
            let pages = Pages::new(&[
                &long_caixa_page("2002 SALARIO PADRAO 01/2016 5.269,00"),
                &long_caixa_page(&format!("2002 SALARIO PADRAO {}/2016 5.269,00", month)),
            ]);
            let report = processor.process(&DocumentDescriptor::new(id, Origin::Caixa), &pages);

            assert_eq!(report.entry_count(), 2);
            assert_eq!(pages.worker_threads_seen.load(Ordering::SeqCst), 2);
        }
        assert_eq!(processor.worker_threads(), Some(2));
    }

    #[test]
    fn test_global_pool_without_worker_threads() {
        assert_eq!(DocumentProcessor::default().worker_threads(), None);
    }

    #[test]
    fn test_first_page_is_extracted_once() {
        let parallel = Pages::new(&[
            &long_caixa_page("2002 SALARIO PADRAO 01/2016 5.269,00"),
            &long_caixa_page("4412 115,37"),
        ]);
        let report = DocumentProcessor::default()
            .process(&DocumentDescriptor::new("doc-9", Origin::Caixa), &parallel);
        assert_eq!(report.mode, ExecutionMode::Parallel);
        assert_eq!(report.pages[0].entries[0].code, "2002");
        assert_eq!(parallel.first_page_reads.load(Ordering::SeqCst), 1);

        let sequential = Pages::new(&["4412 115,37", "4412 115,37"]);
        let report = DocumentProcessor::default()
            .process(&DocumentDescriptor::new("doc-10", Origin::Caixa), &sequential);
        assert_eq!(report.mode, ExecutionMode::Sequential);
        assert_eq!(report.pages[0].entries.len(), 1);
        assert_eq!(sequential.first_page_reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_broken_first_page_is_reported_once() {
        let pages = Pages::new(&["BROKEN", "4412 115,37"]);
        let report = DocumentProcessor::default()
            .process(&DocumentDescriptor::new("doc-11", Origin::Caixa), &pages);

        assert_eq!(report.mode, ExecutionMode::Sequential);
        assert_eq!(report.failed_pages(), vec![1]);
        assert_eq!(report.entry_count(), 1);
        assert_eq!(pages.first_page_reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_document() {
        let pages = Pages::new(&[]);
        let report = DocumentProcessor::default()
            .process(&DocumentDescriptor::new("doc-8", Origin::Caixa), &pages);
        assert!(report.pages.is_empty());
        assert_eq!(report.entry_count(), 0);
    }
}
