use std::borrow::Cow;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use super::builder::roles_from_classes;
use super::{CellKind, Document, DocumentBuilder, parse_address_list};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: &'static str, message: String },

    #[error("invalid line number `{value}` in row {row}")]
    InvalidLineNumber { row: usize, value: String },

    #[error("markup contains no diff rows")]
    NoRows,
}

/// Parses annotated diff markup (table rows of line-number/content cell pairs
/// with nested role spans) into a [`Document`].
pub fn parse_document(markup: &str) -> Result<Document, MarkupError> {
    let html = Html::parse_document(&as_table(&normalize_angle_references(markup)));
    let rows = selector("tr")?;

    let mut builder = DocumentBuilder::new();
    let mut row_count = 0_usize;
    for row in html.select(&rows) {
        if row.value().classes().any(|class| class == "expandable") {
            continue;
        }
        builder.begin_row();
        row_count += 1;
        parse_row(&mut builder, row, row_count)?;
        builder.end_row();
    }

    if row_count == 0 {
        return Err(MarkupError::NoRows);
    }
    debug!(rows = row_count, "parsed diff markup");
    Ok(builder.build())
}

fn parse_row(builder: &mut DocumentBuilder, row: ElementRef<'_>, row_number: usize) -> Result<(), MarkupError> {
    let mut pending_number: Option<String> = None;
    let mut pending_kind: Option<CellKind> = None;

    let cells = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "td");
    for cell in cells {
        let classes = cell.value().classes().collect::<Vec<_>>();
        if classes.contains(&"line") {
            pending_number = Some(cell.text().collect());
            pending_kind = line_cell_kind(&classes);
            continue;
        }

        let kind = content_cell_kind(&classes)
            .or(pending_kind.take())
            .unwrap_or(CellKind::Context);
        let line_number = match pending_number.take() {
            Some(raw) => parse_line_number(&raw, row_number)?,
            None => None,
        };
        builder.begin_cell(line_number, kind);
        push_content(builder, cell);
        builder.end_cell();
    }
    Ok(())
}

fn push_content(builder: &mut DocumentBuilder, element: ElementRef<'_>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => builder.push_text(text),
            Node::Element(tag) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if tag.name() == "span" {
                    let classes = tag.attr("class").unwrap_or_default();
                    let addresses = tag.attr("data-address").unwrap_or_default();
                    builder.open_span(roles_from_classes(classes), parse_address_list(addresses));
                    push_content(builder, child);
                    builder.close_span();
                } else {
                    push_content(builder, child);
                }
            }
            _ => {}
        }
    }
}

fn selector(raw: &'static str) -> Result<Selector, MarkupError> {
    Selector::parse(raw).map_err(|error| MarkupError::Selector {
        selector: raw,
        message: error.to_string(),
    })
}

/// Rows outside a `<table>` are dropped by the HTML tree builder, so bare row
/// fragments get wrapped.
fn as_table(markup: &str) -> Cow<'_, str> {
    if markup.to_ascii_lowercase().contains("<table") {
        Cow::Borrowed(markup)
    } else {
        Cow::Owned(format!("<table>{markup}</table>"))
    }
}

/// The annotator writes `<` and `>` as `&#60`/`&#62` without a terminating `;`,
/// so a following digit must not extend the character reference.
fn normalize_angle_references(markup: &str) -> Cow<'_, str> {
    if !markup.contains("&#6") {
        return Cow::Borrowed(markup);
    }
    Cow::Owned(
        markup
            .replace("&#60;", "&lt;")
            .replace("&#62;", "&gt;")
            .replace("&#60", "&lt;")
            .replace("&#62", "&gt;"),
    )
}

fn line_cell_kind(classes: &[&str]) -> Option<CellKind> {
    if classes.contains(&"insertLine") {
        Some(CellKind::Inserted)
    } else if classes.contains(&"deleteLine") {
        Some(CellKind::Deleted)
    } else if classes.contains(&"alignment") {
        Some(CellKind::Alignment)
    } else {
        None
    }
}

fn content_cell_kind(classes: &[&str]) -> Option<CellKind> {
    if classes.contains(&"insert") {
        Some(CellKind::Inserted)
    } else if classes.contains(&"delete") {
        Some(CellKind::Deleted)
    } else if classes.contains(&"alignment") {
        Some(CellKind::Alignment)
    } else {
        None
    }
}

fn parse_line_number(raw: &str, row: usize) -> Result<Option<u32>, MarkupError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| MarkupError::InvalidLineNumber {
            row,
            value: trimmed.to_owned(),
        })
}
