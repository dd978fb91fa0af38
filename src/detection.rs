//! Page-level context detection: which layout produced a page and which month it pays.

use crate::schema::Origin;
use crate::utils::{period_key, strip_accents};
use regex::Regex;
use std::sync::OnceLock;

const MONTH_NAMES: [(&str, u32); 12] = [
    ("JANEIRO", 1),
    ("FEVEREIRO", 2),
    ("MARCO", 3),
    ("ABRIL", 4),
    ("MAIO", 5),
    ("JUNHO", 6),
    ("JULHO", 7),
    ("AGOSTO", 8),
    ("SETEMBRO", 9),
    ("OUTUBRO", 10),
    ("NOVEMBRO", 11),
    ("DEZEMBRO", 12),
];

const CAIXA_MARKERS: [&str; 6] = [
    "DEMONSTRATIVO DE PAGAMENTO",
    "CAIXA ECONOMICA FEDERAL",
    "MES/ANO DE PAGAMENTO",
    "GIREC",
    "OPERACAO",
    "AGENCIA",
];

const FUNCEF_MARKERS: [&str; 5] = [
    "PROVENTOS PREVIDENCIARIOS",
    "FUNDACAO DOS ECONOMIARIOS FEDERAIS",
    "ANO PAGAMENTO / MES",
    "BENEFICIO INSS",
    "TIPO BENEFICIO",
];

fn named_month_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:MES/ANO DE PAGAMENTO[\s:]*)?\b([A-Z]+)\s*/\s*(\d{4})\b")
            .expect("named month regex")
    })
}

fn numeric_month_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:ANO PAGAMENTO\s*/\s*MES[\s:]*)?\b(\d{4})\s*/\s*(\d{1,2})\b")
            .expect("numeric month regex")
    })
}

fn folded(text: &str) -> String {
    strip_accents(text).to_uppercase()
}

fn month_number(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, number)| *number)
}

/// Finds the payment month declared in a page header, as canonical `YYYY-MM`.
///
/// Statement headers carry either a named month ("JANEIRO/2016") or a numeric
/// year/month pair ("2018/01"). Named months take precedence.
pub fn detect_payment_month(page_text: &str) -> Option<String> {
    let text = folded(page_text);

    for caps in named_month_re().captures_iter(&text) {
        if let Some(month) = month_number(&caps[1]) {
            return Some(format!("{}-{:02}", &caps[2], month));
        }
    }

    for caps in numeric_month_re().captures_iter(&text) {
        let (Ok(year), Ok(month)) = (caps[1].parse::<i32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        if (1..=12).contains(&month) {
            return Some(period_key(year, month));
        }
    }

    None
}

/// Identifies the statement layout of a page from its header markers.
///
/// A layout needs at least two of its markers; when both qualify the one with more
/// markers wins, ties going to CAIXA. Pages without enough markers fall back to a
/// single generic keyword.
pub fn detect_origin(page_text: &str) -> Option<Origin> {
    let text = folded(page_text);

    let caixa = CAIXA_MARKERS.iter().filter(|m| text.contains(*m)).count();
    let funcef = FUNCEF_MARKERS.iter().filter(|m| text.contains(*m)).count();

    match (caixa >= 2, funcef >= 2) {
        (true, true) if funcef > caixa => return Some(Origin::Funcef),
        (true, _) => return Some(Origin::Caixa),
        (false, true) => return Some(Origin::Funcef),
        (false, false) => {}
    }

    if text.contains("CONTRACHEQUE") {
        Some(Origin::Caixa)
    } else if text.contains("PREVIDENCIARIOS") || text.contains("FUNCEF") {
        Some(Origin::Funcef)
    } else {
        None
    }
}
