use crate::parser::lookup::{DetailPage, Strategy};

pub const NO_ADDRESS: &str = "Sin dirección";

const NAME_KEYS: &[&str] = &["Nombre Cliente", "Asegurado"];
const STREET_KEYS: &[&str] = &["Dirección", "Domicilio"];
const POSTAL_KEYS: &[&str] = &["Distrito Postal", "C.P", "Distrito"];

pub fn name(page: &DetailPage) -> Option<String> {
    page.resolve(&[Strategy::Vertical(NAME_KEYS)])
}

/// Street plus postal district when the page has one.
pub fn address(page: &DetailPage) -> String {
    let street = page
        .resolve(&[Strategy::Vertical(STREET_KEYS)])
        .unwrap_or_else(|| NO_ADDRESS.to_string());
    match page.resolve(&[Strategy::Vertical(POSTAL_KEYS)]) {
        Some(postal) => format!("{} {}", street, postal),
        None => street,
    }
}
