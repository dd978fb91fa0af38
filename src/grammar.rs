//! Line grammars for the two statement layouts.
//!
//! Each layout owns a priority-ordered slice of grammars. A line is matched against them
//! in order and the first grammar that accepts the whole line decides how it is read.

use crate::normalize::{normalize_code, normalize_description, parse_value};
use crate::schema::Origin;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const CODE: &str = r"([0-9]\s*[0-9]\s*[0-9]\s*[0-9]?)";
const MONTH_FIRST_REFERENCE: &str = r"([0-9]{1,2}/[0-9]{4})";
const YEAR_FIRST_REFERENCE: &str = r"([0-9]{4}/[0-9]{1,2})";
const INTERMEDIATE_CODE: &str = r"([0-9]{3})";
const VALUE_WITH_ARTIFACT: &str = r"([A-Z]?[0-9]{1,3}(?:\.[0-9]{3})*,[0-9]{2})";
const VALUE: &str = r"([0-9]{1,3}(?:\.[0-9]{3})*,[0-9]{2})";
const GLUED_REFERENCE: &str = r"([0-9]{2}/[0-9]{4})";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarId {
    /// `code description MM/YYYY 001 value`
    FullColumns,
    /// `code description MM/YYYY value`
    InlineReference,
    /// `code description [001] valueMM/YYYY`, value and reference with no space between
    GluedReference,
    /// `code value`
    CodeAndValue,
    /// Anything with a code at the start and a value at the end
    Permissive,
    /// `code YYYY/MM description value`
    ReferenceFirst,
}

/// Tokens captured by a grammar, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFields<'a> {
    pub code: &'a str,
    pub description: Option<&'a str>,
    pub reference: Option<&'a str>,
    pub value: &'a str,
}

pub struct LineGrammar {
    pub id: GrammarId,
    matcher: fn(&str) -> Option<RawFields<'_>>,
}

impl LineGrammar {
    pub fn matches<'a>(&self, line: &'a str) -> Option<RawFields<'a>> {
        (self.matcher)(line)
    }
}

impl std::fmt::Debug for LineGrammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineGrammar").field("id", &self.id).finish()
    }
}

static CAIXA_GRAMMARS: [LineGrammar; 5] = [
    LineGrammar {
        id: GrammarId::FullColumns,
        matcher: match_full_columns,
    },
    LineGrammar {
        id: GrammarId::InlineReference,
        matcher: match_inline_reference,
    },
    LineGrammar {
        id: GrammarId::GluedReference,
        matcher: match_glued_reference,
    },
    LineGrammar {
        id: GrammarId::CodeAndValue,
        matcher: match_code_and_value,
    },
    LineGrammar {
        id: GrammarId::Permissive,
        matcher: match_permissive,
    },
];

static FUNCEF_GRAMMARS: [LineGrammar; 1] = [LineGrammar {
    id: GrammarId::ReferenceFirst,
    matcher: match_reference_first,
}];

pub fn grammars_for(origin: Origin) -> &'static [LineGrammar] {
    match origin {
        Origin::Caixa => &CAIXA_GRAMMARS,
        Origin::Funcef => &FUNCEF_GRAMMARS,
    }
}

fn full_columns_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^{}\s+(?:(.+?)\s+)?{}\s+{}\s+{}$",
            CODE, MONTH_FIRST_REFERENCE, INTERMEDIATE_CODE, VALUE_WITH_ARTIFACT
        ))
        .expect("full columns grammar")
    })
}

fn inline_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^{}\s+(?:(.+?)\s+)?{}\s+{}$",
            CODE, MONTH_FIRST_REFERENCE, VALUE_WITH_ARTIFACT
        ))
        .expect("inline reference grammar")
    })
}

fn glued_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^{}\s+(?:(.+?)\s+)?(?:{}\s+)?{}{}$",
            CODE, INTERMEDIATE_CODE, VALUE, GLUED_REFERENCE
        ))
        .expect("glued reference grammar")
    })
}

fn code_and_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^{}\s+{}$", CODE, VALUE_WITH_ARTIFACT))
            .expect("code and value grammar")
    })
}

fn permissive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^{}\s+(?:(.+?)\s+)?(?:{}\s+)?(?:{}\s+)?{}$",
            CODE, MONTH_FIRST_REFERENCE, INTERMEDIATE_CODE, VALUE_WITH_ARTIFACT
        ))
        .expect("permissive grammar")
    })
}

fn reference_first_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^{}\s+{}\s+(.+?)\s+{}$",
            CODE, YEAR_FIRST_REFERENCE, VALUE
        ))
        .expect("reference first grammar")
    })
}

fn group<'a>(caps: &Captures<'a>, index: usize) -> Option<&'a str> {
    caps.get(index).map(|m| m.as_str())
}

fn fields<'a>(
    caps: &Captures<'a>,
    code: usize,
    description: Option<usize>,
    reference: Option<usize>,
    value: usize,
) -> Option<RawFields<'a>> {
    Some(RawFields {
        code: group(caps, code)?,
        description: description.and_then(|i| group(caps, i)),
        reference: reference.and_then(|i| group(caps, i)),
        value: group(caps, value)?,
    })
}

fn match_full_columns(line: &str) -> Option<RawFields<'_>> {
    let caps = full_columns_re().captures(line)?;
    fields(&caps, 1, Some(2), Some(3), 5)
}

fn match_inline_reference(line: &str) -> Option<RawFields<'_>> {
    let caps = inline_reference_re().captures(line)?;
    fields(&caps, 1, Some(2), Some(3), 4)
}

fn match_glued_reference(line: &str) -> Option<RawFields<'_>> {
    let caps = glued_reference_re().captures(line)?;
    fields(&caps, 1, Some(2), Some(5), 4)
}

fn match_code_and_value(line: &str) -> Option<RawFields<'_>> {
    let caps = code_and_value_re().captures(line)?;
    fields(&caps, 1, None, None, 2)
}

fn match_permissive(line: &str) -> Option<RawFields<'_>> {
    let caps = permissive_re().captures(line)?;
    fields(&caps, 1, Some(2), Some(3), 5)
}

fn match_reference_first(line: &str) -> Option<RawFields<'_>> {
    let caps = reference_first_re().captures(line)?;
    fields(&caps, 1, Some(3), Some(2), 4)
}

/// A line accepted by a grammar, with code, description and value normalized.
///
/// The reference is kept exactly as captured; the assembler canonicalizes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLine {
    pub code: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub value: Decimal,
    pub grammar: GrammarId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SkipReason {
    NoGrammarMatched,
    InvalidValue { grammar: GrammarId, token: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    /// 1-based position of the line in the page text
    pub line_number: usize,
    pub text: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Parsed(ParsedLine),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParse {
    /// Non-empty lines offered to the grammars
    pub lines_seen: usize,
    pub parsed: Vec<ParsedLine>,
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug, Clone, Copy)]
pub struct LineParser {
    origin: Origin,
}

impl LineParser {
    pub fn new(origin: Origin) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn parse_line(&self, line: &str) -> LineOutcome {
        let line = line.trim();

        for grammar in grammars_for(self.origin) {
            let Some(raw) = grammar.matches(line) else {
                continue;
            };

            let value_token = strip_column_artifact(raw.value);
            return match parse_value(value_token) {
                Some(value) => LineOutcome::Parsed(ParsedLine {
                    code: normalize_code(raw.code),
                    description: raw.description.and_then(normalize_description),
                    reference: raw.reference.map(str::to_string),
                    value,
                    grammar: grammar.id,
                }),
                None => LineOutcome::Skipped(SkipReason::InvalidValue {
                    grammar: grammar.id,
                    token: raw.value.to_string(),
                }),
            };
        }

        LineOutcome::Skipped(SkipReason::NoGrammarMatched)
    }

    pub fn parse_page(&self, text: &str) -> PageParse {
        let mut result = PageParse::default();

        for (index, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            result.lines_seen += 1;

            match self.parse_line(trimmed) {
                LineOutcome::Parsed(parsed) => result.parsed.push(parsed),
                LineOutcome::Skipped(reason) => result.skipped.push(SkippedLine {
                    line_number: index + 1,
                    text: trimmed.to_string(),
                    reason,
                }),
            }
        }

        result
    }
}

/// Drops the single uppercase letter that bleeds into the value column ("T48,62").
fn strip_column_artifact(token: &str) -> &str {
    match token.chars().next() {
        Some(c) if c.is_ascii_uppercase() => &token[1..],
        _ => token,
    }
}
