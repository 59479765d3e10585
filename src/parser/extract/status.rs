use crate::parser::dom::clean;
use crate::parser::lookup::{DetailPage, Strategy};

pub const DEFAULT_STATUS: &str = "PENDIENTE";

const STATUS_KEYS: &[&str] = &["Estado", "Situación"];
const OPENED_KEYS: &[&str] = &["Fecha/Hora Apertura", "Fecha Apertura"];

/// Status cell as displayed, including any embedded timestamp.
pub fn status_text(page: &DetailPage) -> String {
    page.resolve(&[Strategy::RowValue(STATUS_KEYS), Strategy::Horizontal(STATUS_KEYS)])
        .unwrap_or_else(|| DEFAULT_STATUS.to_string())
}

pub fn date_opened(page: &DetailPage) -> String {
    page.resolve(&[Strategy::Horizontal(OPENED_KEYS)])
        .map(|d| clean(&d.replacen('/', "", 1)))
        .unwrap_or_default()
}
