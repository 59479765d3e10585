use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::parser::dom::{self, inner_text};
use crate::parser::lookup::DetailPage;

pub const NO_PHONE: &str = "Sin teléfono";
const CAPTION: &str = "Teléfono del Cliente";

// Spanish mobile/landline numbering: nine digits led by 6, 7, 8 or 9, not
// part of a longer digit run unless that run is the +34/0034 country prefix.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9]|(?:\+|00)34)([6789][0-9]{8})(?:[^0-9]|$)").unwrap()
});
static CAPTION_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.subtitulo").unwrap());
static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());

pub fn phone(page: &DetailPage) -> String {
    let section = caption_table_text(page.html()).filter(|t| !t.is_empty());
    let haystack = section.as_deref().unwrap_or(page.text());
    find_phone(haystack).unwrap_or_else(|| NO_PHONE.to_string())
}

pub fn find_phone(text: &str) -> Option<String> {
    PHONE_RE.captures(text).map(|c| c[1].to_string())
}

/// Text of the table that holds, or sits next to, the client-phone caption.
fn caption_table_text(doc: &Html) -> Option<String> {
    let caption = doc
        .select(&CAPTION_SEL)
        .find(|d| inner_text(*d).contains(CAPTION))?;
    let table = dom::closest(caption, "table")
        .or_else(|| dom::parent(caption).and_then(|p| p.select(&TABLE_SEL).next()))?;
    Some(inner_text(table))
}
