use std::fmt::Write as _;

use crate::document::{Cell, CellKind, Document, Node, Row, SpanId};
use crate::view::{DisplayLine, MarkSet, ViewState};

/// Renders the current view as plain text, one display line per output line.
///
/// Each row shows its cells side by side (old file, then new file) separated
/// by ` │ `. Marked spans are wrapped as `[text]{mark+mark}`; placeholders
/// collapse to a single line carrying the hidden row count.
pub fn render_view(document: &Document, view: &ViewState) -> String {
    let lines = view.display_lines();
    let rendered = lines
        .iter()
        .map(|line| match line {
            DisplayLine::Row(id) => document
                .row(*id)
                .map(|row| RenderedLine::Cells(render_cells(document, view, row)))
                .unwrap_or(RenderedLine::Skipped),
            DisplayLine::Placeholder(placeholder) => {
                RenderedLine::Placeholder(placeholder_label(placeholder.hidden_rows))
            }
        })
        .collect::<Vec<_>>();

    let mut widths = Vec::<usize>::new();
    for line in &rendered {
        if let RenderedLine::Cells(cells) = line {
            for (index, cell) in cells.iter().enumerate() {
                let width = cell.chars().count();
                match widths.get_mut(index) {
                    Some(current) => *current = (*current).max(width),
                    None => widths.push(width),
                }
            }
        }
    }

    let mut output = String::new();
    for line in rendered {
        match line {
            RenderedLine::Cells(cells) => {
                let last = cells.len().saturating_sub(1);
                for (index, cell) in cells.iter().enumerate() {
                    if index == last {
                        output.push_str(cell);
                    } else {
                        let width = widths.get(index).copied().unwrap_or_default();
                        let _ = write!(output, "{cell:<width$}{COLUMN_SEPARATOR}");
                    }
                }
                output.push('\n');
            }
            RenderedLine::Placeholder(label) => {
                output.push_str(&label);
                output.push('\n');
            }
            RenderedLine::Skipped => {}
        }
    }
    output
}

const COLUMN_SEPARATOR: &str = " │ ";

enum RenderedLine {
    Cells(Vec<String>),
    Placeholder(String),
    Skipped,
}

pub fn placeholder_label(hidden_rows: usize) -> String {
    let noun = if hidden_rows == 1 { "line" } else { "lines" };
    format!("      ··· {hidden_rows} hidden {noun} ···")
}

pub fn cell_sign(kind: CellKind) -> char {
    match kind {
        CellKind::Context | CellKind::Alignment => ' ',
        CellKind::Inserted => '+',
        CellKind::Deleted => '-',
    }
}

/// Line number gutter of a cell, empty for alignment filler.
pub fn cell_gutter(cell: &Cell) -> String {
    if cell.kind == CellKind::Alignment {
        return String::new();
    }
    let number = cell
        .line_number
        .map(|number| number.to_string())
        .unwrap_or_default();
    format!("{number:>5} {}", cell_sign(cell.kind))
}

/// One rendered column per cell of `row`.
pub fn render_cells(document: &Document, view: &ViewState, row: &Row) -> Vec<String> {
    row.cells
        .iter()
        .map(|cell| {
            if cell.kind == CellKind::Alignment {
                return String::new();
            }
            let mut text = String::new();
            render_nodes(document, view, &cell.content, &mut text);
            format!("{} {text}", cell_gutter(cell))
        })
        .collect()
}

/// Marks of the innermost marked span enclosing `span`.
pub fn effective_marks(document: &Document, view: &ViewState, span: Option<SpanId>) -> MarkSet {
    let Some(span) = span else {
        return MarkSet::default();
    };
    document
        .ancestors(span)
        .map(|ancestor| view.marks(ancestor.id))
        .find(|marks| !marks.is_empty())
        .unwrap_or_default()
}

fn render_nodes(document: &Document, view: &ViewState, nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Span(id) => {
                let Some(span) = document.span(*id) else {
                    continue;
                };
                let marks = view.marks(*id);
                if marks.is_empty() {
                    render_nodes(document, view, &span.children, out);
                    continue;
                }
                out.push('[');
                render_nodes(document, view, &span.children, out);
                out.push_str("]{");
                for (index, mark) in marks.iter().enumerate() {
                    if index > 0 {
                        out.push('+');
                    }
                    let _ = write!(out, "{}", mark.as_str());
                }
                out.push('}');
            }
        }
    }
}
