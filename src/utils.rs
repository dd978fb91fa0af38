use chrono::NaiveDate;

/// The fixed month columns of every consolidated matrix.
pub const MONTHS: [&str; 12] = [
    "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12",
];

pub fn months() -> Vec<String> {
    MONTHS.iter().map(|m| m.to_string()).collect()
}

pub fn period_key(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// Every `YYYY-MM` cell key for the given years, in chronological order.
pub fn month_keys_for_years<'a>(years: impl IntoIterator<Item = &'a i32>) -> Vec<String> {
    years
        .into_iter()
        .flat_map(|year| MONTHS.iter().map(move |month| format!("{:04}-{}", year, month)))
        .collect()
}

pub fn is_calendar_month(year: i32, month: u32) -> bool {
    NaiveDate::from_ymd_opt(year, month, 1).is_some()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Folds the Portuguese accented capitals that appear in statement headers.
pub fn strip_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ç' => 'C',
            'ç' => 'c',
            other => other,
        })
        .collect()
}
