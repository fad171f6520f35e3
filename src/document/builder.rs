use std::collections::BTreeSet;

use super::{
    Cell, CellKind, DiffStatus, Document, Node, Role, Row, RowId, Span, SpanId,
    parse_address_list,
};

/// Incremental assembler for a [`Document`].
///
/// The markup parser drives the low-level row/cell/span calls; fixtures and
/// the CLI demo use [`DocumentBuilder::line`].
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    rows: Vec<Row>,
    spans: Vec<Span>,
    row: Option<Row>,
    cell: Option<Cell>,
    open_spans: Vec<SpanId>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_row(&mut self) -> RowId {
        self.end_row();
        let id = RowId(self.rows.len());
        self.row = Some(Row {
            id,
            status: DiffStatus::Unchanged,
            cells: Vec::new(),
        });
        id
    }

    pub fn begin_cell(&mut self, line_number: Option<u32>, kind: CellKind) {
        self.end_cell();
        if self.row.is_none() {
            self.begin_row();
        }
        self.cell = Some(Cell {
            line_number,
            kind,
            content: Vec::new(),
        });
    }

    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.cell.is_none() {
            self.begin_cell(None, CellKind::Context);
        }
        for id in &self.open_spans {
            self.spans[id.0].text.push_str(text);
        }
        self.push_node(Node::Text(text.to_owned()));
    }

    pub fn open_span(&mut self, roles: BTreeSet<Role>, addresses: Vec<String>) -> SpanId {
        if self.cell.is_none() {
            self.begin_cell(None, CellKind::Context);
        }
        let id = SpanId(self.spans.len());
        let row = self
            .row
            .as_ref()
            .map(|row| row.id)
            .unwrap_or(RowId(self.rows.len()));
        self.spans.push(Span {
            id,
            row,
            parent: self.open_spans.last().copied(),
            roles,
            addresses,
            text: String::new(),
            children: Vec::new(),
        });
        self.push_node(Node::Span(id));
        self.open_spans.push(id);
        id
    }

    /// Closes the innermost open span. Returns `false` when none is open.
    pub fn close_span(&mut self) -> bool {
        self.open_spans.pop().is_some()
    }

    /// Finishes the current cell, closing any span left open. Returns how many were closed.
    pub fn end_cell(&mut self) -> usize {
        let unclosed = self.open_spans.len();
        self.open_spans.clear();
        if let Some(cell) = self.cell.take()
            && let Some(row) = self.row.as_mut()
        {
            row.cells.push(cell);
        }
        unclosed
    }

    pub fn end_row(&mut self) -> usize {
        let unclosed = self.end_cell();
        if let Some(mut row) = self.row.take() {
            row.status = row_status(&row.cells);
            self.rows.push(row);
        }
        unclosed
    }

    /// Appends a single-cell row; `fill` writes its content.
    pub fn line(&mut self, status: DiffStatus, fill: impl FnOnce(&mut LineBuilder<'_>)) -> RowId {
        let id = self.begin_row();
        let kind = match status {
            DiffStatus::Unchanged => CellKind::Context,
            DiffStatus::Inserted => CellKind::Inserted,
            DiffStatus::Deleted => CellKind::Deleted,
        };
        let line_number = u32::try_from(id.0 + 1).ok();
        self.begin_cell(line_number, kind);
        fill(&mut LineBuilder { builder: self });
        self.end_row();
        id
    }

    pub fn build(mut self) -> Document {
        self.end_row();
        Document::from_parts(self.rows, self.spans)
    }

    fn push_node(&mut self, node: Node) {
        match self.open_spans.last() {
            Some(parent) => self.spans[parent.0].children.push(node),
            None => {
                if let Some(cell) = self.cell.as_mut() {
                    cell.content.push(node);
                }
            }
        }
    }
}

pub struct LineBuilder<'a> {
    builder: &'a mut DocumentBuilder,
}

impl LineBuilder<'_> {
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.builder.push_text(text);
        self
    }

    /// Opens a span from a space-separated class list and a comma-joined address list.
    pub fn open(&mut self, classes: &str, addresses: &str) -> SpanId {
        self.builder
            .open_span(roles_from_classes(classes), parse_address_list(addresses))
    }

    pub fn close(&mut self) -> &mut Self {
        self.builder.close_span();
        self
    }

    pub fn span(&mut self, classes: &str, addresses: &str, text: &str) -> SpanId {
        let id = self.open(classes, addresses);
        self.builder.push_text(text);
        self.builder.close_span();
        id
    }
}

pub fn roles_from_classes(classes: &str) -> BTreeSet<Role> {
    classes.split_whitespace().filter_map(Role::from_class).collect()
}

fn row_status(cells: &[Cell]) -> DiffStatus {
    if cells.iter().any(|cell| cell.kind == CellKind::Inserted) {
        DiffStatus::Inserted
    } else if cells.iter().any(|cell| cell.kind == CellKind::Deleted) {
        DiffStatus::Deleted
    } else {
        DiffStatus::Unchanged
    }
}
