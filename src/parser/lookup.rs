use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::dom::{self, cell_text, cells, clean, inner_text};

static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td, th").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// One way of locating a field's value in a detail document.
#[derive(Clone, Copy)]
pub enum Strategy {
    /// Row whose first cell equals a label; value in the second cell.
    RowValue(&'static [&'static str]),
    /// Header cell equal to a keyword; value below it in the same column.
    Vertical(&'static [&'static str]),
    /// Cell containing a keyword; value in the next sibling element.
    Horizontal(&'static [&'static str]),
    /// First capture group of a pattern over the document text.
    Pattern(&'static LazyLock<Regex>),
}

/// A parsed candidate document plus its rendered text, computed once.
pub struct DetailPage {
    doc: Html,
    text: String,
}

impl DetailPage {
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let text = doc
            .select(&BODY_SEL)
            .next()
            .map(inner_text)
            .unwrap_or_default();
        Self { doc, text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn html(&self) -> &Html {
        &self.doc
    }

    /// Evaluate `strategies` in order; the first non-empty value wins.
    pub fn resolve(&self, strategies: &[Strategy]) -> Option<String> {
        strategies.iter().find_map(|s| self.apply(*s))
    }

    pub fn apply(&self, strategy: Strategy) -> Option<String> {
        let value = match strategy {
            Strategy::RowValue(labels) => self.row_value(labels),
            Strategy::Vertical(keywords) => self.vertical(keywords),
            Strategy::Horizontal(keywords) => self.horizontal(keywords),
            Strategy::Pattern(re) => re.captures(&self.text).map(|c| clean(&c[1])),
        };
        value.filter(|v| !v.is_empty())
    }

    fn row_value(&self, labels: &[&str]) -> Option<String> {
        self.doc.select(&ROW_SEL).find_map(|row| {
            let cols = cells(row);
            if cols.len() < 2 {
                return None;
            }
            let key = cell_text(cols[0]).to_uppercase();
            if !labels.iter().any(|l| key == l.to_uppercase()) {
                return None;
            }
            Some(cell_text(cols[1])).filter(|v| !v.is_empty())
        })
    }

    fn vertical(&self, keywords: &[&str]) -> Option<String> {
        let header = self
            .doc
            .select(&CELL_SEL)
            .find(|c| matches_exactly(&cell_text(*c), keywords))?;
        let row = dom::parent(header)?;
        let column = cells(row).iter().position(|c| c.id() == header.id())?;

        let next_row = dom::next_element_sibling(row).or_else(|| body_row_after_head(header, row))?;
        cells(next_row).get(column).map(|c| cell_text(*c))
    }

    fn horizontal(&self, keywords: &[&str]) -> Option<String> {
        let header = self
            .doc
            .select(&CELL_SEL)
            .find(|c| contains_any(&inner_text(*c), keywords))?;
        dom::next_element_sibling(header).map(cell_text)
    }
}

/// A header row alone in `<thead>` carries its values in the first body row.
fn body_row_after_head<'a>(header: ElementRef<'a>, row: ElementRef<'a>) -> Option<ElementRef<'a>> {
    let section = dom::parent(row)?;
    if section.value().name() != "thead" {
        return None;
    }
    let table = dom::closest(header, "table")?;
    let body = dom::child_elements(table, "tbody").next()?;
    dom::child_elements(body, "tr").next()
}

fn matches_exactly(text: &str, keywords: &[&str]) -> bool {
    let upper = text.to_uppercase();
    keywords.iter().any(|k| upper == k.to_uppercase())
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let upper = text.to_uppercase();
    keywords.iter().any(|k| upper.contains(&k.to_uppercase()))
}
