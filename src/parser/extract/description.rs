use std::sync::LazyLock;

use regex::Regex;

use crate::parser::dom::clean;
use crate::parser::lookup::{DetailPage, Strategy};

const REPAIR_LABEL: &str = "Descripción de la Reparación";

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9]{2}/[0-9]{2}/[0-9]{4}\b").unwrap());

pub fn extract(page: &DetailPage) -> String {
    let text = page
        .resolve(&[
            Strategy::RowValue(&[REPAIR_LABEL]),
            Strategy::Horizontal(&[REPAIR_LABEL, "Descripción", "Daños"]),
        ])
        .unwrap_or_default();
    truncate_at_date(&clean(&text))
}

/// Drop everything from the first `dd/mm/yyyy` on; the portal appends its
/// visit history to the description starting with a date.
pub fn truncate_at_date(text: &str) -> String {
    match DATE_RE.find(text) {
        Some(m) => text[..m.start()]
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '(' | '[' | '-' | ',' | ':'))
            .to_string(),
        None => text.to_string(),
    }
}
