pub mod client;
pub mod company;
pub mod contact;
pub mod description;
pub mod status;

use super::lookup::DetailPage;
use crate::db::CaseRecord;

/// Only case-detail pages carry one of these.
const MARKERS: &[&str] = &["Nombre Cliente", "Asegurado"];

/// Build a record from one detail document, or `None` when the document is
/// not a case detail or has no client name.
///
/// `service_number` is left empty; the caller knows the reference.
pub fn extract(page: &DetailPage) -> Option<CaseRecord> {
    if !MARKERS.iter().any(|m| page.text().contains(m)) {
        return None;
    }
    let client_name = client::name(page)?;

    Some(CaseRecord {
        client_name,
        address: client::address(page),
        company: company::extract(page),
        phone: contact::phone(page),
        description: description::extract(page),
        status_text: status::status_text(page),
        date_opened: status::date_opened(page),
        service_number: String::new(),
        has_content: true,
    })
}

// ── Tests ──
