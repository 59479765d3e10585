pub mod dom;
pub mod extract;
pub mod lookup;

use crate::browser::CandidateDocument;
use crate::db::CaseRecord;
use lookup::DetailPage;

/// Candidate documents are tried in order; the first one that yields a
/// record wins. Returns the winning document's index with the record.
pub fn extract_first(documents: &[CandidateDocument]) -> Option<(usize, CaseRecord)> {
    documents.iter().enumerate().find_map(|(i, doc)| {
        let page = DetailPage::parse(&doc.html);
        extract::extract(&page).map(|record| (i, record))
    })
}
