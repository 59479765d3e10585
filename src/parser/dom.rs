use scraper::node::Node;
use scraper::ElementRef;

const SKIPPED: &[&str] = &["script", "style", "head", "noscript", "template", "title"];
const BLOCKS: &[&str] = &[
    "div", "p", "tr", "table", "thead", "tbody", "tfoot", "li", "ul", "ol", "h1", "h2", "h3",
    "h4", "h5", "h6", "form", "section", "article", "header", "footer", "caption", "center",
    "fieldset", "legend", "dl", "dt", "dd", "blockquote", "pre", "hr",
];

/// Collapse every whitespace run to a single space and trim.
pub fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of `element` laid out roughly as a browser renders it: block
/// elements start new lines, table cells are tab separated, blank lines are
/// dropped.
pub fn inner_text(element: ElementRef) -> String {
    let mut raw = String::new();
    walk(element, &mut raw);
    raw.lines()
        .map(|line| line.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" "))
        .map(|line| line.trim_matches('\t').to_string())
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn walk(element: ElementRef, out: &mut String) {
    let name = element.value().name();
    if SKIPPED.contains(&name) {
        return;
    }
    if name == "br" {
        out.push('\n');
        return;
    }
    let block = BLOCKS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                for (i, word) in text.split(|c: char| c.is_whitespace()).enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(word);
                }
            }
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    walk(el, out);
                }
            }
            _ => {}
        }
    }
    match name {
        "td" | "th" => out.push('\t'),
        _ if block => out.push('\n'),
        _ => {}
    }
}

/// Normalized text of a single cell.
pub fn cell_text(cell: ElementRef) -> String {
    clean(&inner_text(cell))
}

/// `td`/`th` children of a row, in column order.
pub fn cells(row: ElementRef) -> Vec<ElementRef> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

pub fn parent(element: ElementRef) -> Option<ElementRef> {
    element.parent().and_then(ElementRef::wrap)
}

pub fn next_element_sibling(element: ElementRef) -> Option<ElementRef> {
    element.next_siblings().find_map(ElementRef::wrap)
}

/// Nearest ancestor (or `element` itself) with tag `name`.
pub fn closest<'a>(element: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    if element.value().name() == name {
        return Some(element);
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == name)
}

pub fn child_elements<'a>(element: ElementRef<'a>, name: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |c| c.value().name() == name)
}
