use std::sync::LazyLock;

use regex::Regex;

use crate::parser::lookup::{DetailPage, Strategy};

/// Tag prefixed to every carrier name so validators can tell portals apart.
pub const PROVIDER_TAG: &str = "MULTI";
const DEFAULT_CARRIER: &str = "MULTIASISTENCIA";
const KEYS: &[&str] = &["Procedencia", "Compañía"];

static PROCEDENCIA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Procedencia\s*[:\-]?\s*([^\n]+)").unwrap());

pub fn extract(page: &DetailPage) -> String {
    let carrier = page
        .resolve(&[Strategy::Horizontal(KEYS), Strategy::Pattern(&PROCEDENCIA_RE)])
        .unwrap_or_else(|| DEFAULT_CARRIER.to_string());
    format!("{} - {}", PROVIDER_TAG, carrier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carrier_from_neighbouring_cell() {
        let page = DetailPage::parse("<table><tr><td>Compañía</td><td>Allianz</td></tr></table>");
        assert_eq!(extract(&page), "MULTI - Allianz");
    }

    #[test]
    fn carrier_from_free_text() {
        let page = DetailPage::parse("<p>Procedencia: Línea Directa</p><p>Otros datos</p>");
        assert_eq!(extract(&page), "MULTI - Línea Directa");
    }

    #[test]
    fn default_carrier() {
        let page = DetailPage::parse("<p>Nada que ver aquí</p>");
        assert_eq!(extract(&page), "MULTI - MULTIASISTENCIA");
    }
}
