use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::anyhow;

use crate::document::{DisplayTag, Document, RowId, SpanId};

pub mod viewport;

pub use self::viewport::{ScrollAnimation, Viewport};

/// Rows kept visible on each side of a revealed row.
pub const CONTEXT_RADIUS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mark {
    Criterion,
    Definition,
    Use,
    Dependency,
}

impl Mark {
    pub const ALL: [Mark; 4] = [
        Mark::Criterion,
        Mark::Definition,
        Mark::Use,
        Mark::Dependency,
    ];

    fn bit(self) -> u8 {
        match self {
            Self::Criterion => 1,
            Self::Definition => 1 << 1,
            Self::Use => 1 << 2,
            Self::Dependency => 1 << 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Criterion => "criterion",
            Self::Definition => "definition",
            Self::Use => "use",
            Self::Dependency => "dependency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkSet(u8);

impl MarkSet {
    pub fn contains(self, mark: Mark) -> bool {
        self.0 & mark.bit() != 0
    }

    pub fn insert(&mut self, mark: Mark) {
        self.0 |= mark.bit();
    }

    pub fn remove(&mut self, mark: Mark) {
        self.0 &= !mark.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Mark> {
        Mark::ALL.into_iter().filter(move |mark| self.contains(*mark))
    }
}

/// Which display tags the layer buttons currently style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayLayer {
    #[default]
    None,
    Value,
    Variable,
    Control,
    All,
}

impl DisplayLayer {
    pub const ALL: [DisplayLayer; 5] = [
        DisplayLayer::None,
        DisplayLayer::Value,
        DisplayLayer::Variable,
        DisplayLayer::Control,
        DisplayLayer::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Value => "value",
            Self::Variable => "variable",
            Self::Control => "control",
            Self::All => "all",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "Line Diff",
            Self::Value => "New Values",
            Self::Variable => "New Variables",
            Self::Control => "New Control Flow",
            Self::All => "All Layers",
        }
    }

    pub fn styles(self, tag: DisplayTag) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Value => tag == DisplayTag::Value,
            Self::Variable => tag == DisplayTag::Variable,
            Self::Control => matches!(tag, DisplayTag::Control | DisplayTag::ControlDefinition),
        }
    }
}

impl Display for DisplayLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayLayer {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|layer| layer.as_str() == value.trim())
            .ok_or_else(|| anyhow!("unknown display layer `{value}`"))
    }
}

/// Marks a maximal run of hidden rows; sits immediately before `first_hidden`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub first_hidden: RowId,
    pub hidden_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayLine {
    Row(RowId),
    Placeholder(Placeholder),
}

/// Mutable visibility and highlight state layered over a read-only [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    visible: Vec<bool>,
    marks: Vec<MarkSet>,
    placeholders: Vec<Placeholder>,
    display_layer: DisplayLayer,
}

impl ViewState {
    pub fn new(document: &Document) -> Self {
        Self {
            visible: vec![true; document.row_count()],
            marks: vec![MarkSet::default(); document.spans().len()],
            placeholders: Vec::new(),
            display_layer: DisplayLayer::default(),
        }
    }

    pub fn erase(&mut self) {
        self.marks.fill(MarkSet::default());
    }

    pub fn unslice(&mut self) {
        self.placeholders.clear();
        self.visible.fill(true);
    }

    pub fn hide_all(&mut self) {
        self.visible.fill(false);
    }

    pub fn reveal(&mut self, row: RowId) {
        if let Some(visible) = self.visible.get_mut(row.0) {
            *visible = true;
        }
    }

    /// Reveals `row` and its [`CONTEXT_RADIUS`] neighbours on both sides.
    pub fn reveal_with_context(&mut self, row: RowId) {
        if row.0 >= self.visible.len() {
            return;
        }
        let start = row.0.saturating_sub(CONTEXT_RADIUS);
        let end = (row.0 + CONTEXT_RADIUS).min(self.visible.len() - 1);
        self.visible[start..=end].fill(true);
    }

    /// Recomputes placeholders from the current visibility: one per maximal hidden run.
    pub fn add_placeholders(&mut self) {
        self.placeholders.clear();
        let mut index = 0;
        while index < self.visible.len() {
            if self.visible[index] {
                index += 1;
                continue;
            }
            let start = index;
            while index < self.visible.len() && !self.visible[index] {
                index += 1;
            }
            self.placeholders.push(Placeholder {
                first_hidden: RowId(start),
                hidden_rows: index - start,
            });
        }
    }

    /// Hides everything, reveals each row with context, then places placeholders.
    pub fn slice_to(&mut self, rows: impl IntoIterator<Item = RowId>) {
        self.unslice();
        self.hide_all();
        for row in rows {
            self.reveal_with_context(row);
        }
        self.add_placeholders();
    }

    pub fn mark(&mut self, span: SpanId, mark: Mark) {
        if let Some(marks) = self.marks.get_mut(span.0) {
            marks.insert(mark);
        }
    }

    pub fn unmark(&mut self, span: SpanId, mark: Mark) {
        if let Some(marks) = self.marks.get_mut(span.0) {
            marks.remove(mark);
        }
    }

    pub fn marks(&self, span: SpanId) -> MarkSet {
        self.marks.get(span.0).copied().unwrap_or_default()
    }

    pub fn spans_marked(&self, mark: Mark) -> Vec<SpanId> {
        self.marks
            .iter()
            .enumerate()
            .filter(|(_, marks)| marks.contains(mark))
            .map(|(index, _)| SpanId(index))
            .collect()
    }

    pub fn is_visible(&self, row: RowId) -> bool {
        self.visible.get(row.0).copied().unwrap_or(false)
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = RowId> + '_ {
        self.visible
            .iter()
            .enumerate()
            .filter(|(_, visible)| **visible)
            .map(|(index, _)| RowId(index))
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn display_layer(&self) -> DisplayLayer {
        self.display_layer
    }

    pub fn set_display_layer(&mut self, layer: DisplayLayer) {
        self.display_layer = layer;
    }

    /// Visible rows and placeholders in document order.
    pub fn display_lines(&self) -> Vec<DisplayLine> {
        let mut lines = Vec::with_capacity(self.visible.len());
        let mut placeholders = self.placeholders.iter().peekable();
        for (index, visible) in self.visible.iter().enumerate() {
            if let Some(placeholder) = placeholders.next_if(|p| p.first_hidden.0 == index) {
                lines.push(DisplayLine::Placeholder(*placeholder));
            }
            if *visible {
                lines.push(DisplayLine::Row(RowId(index)));
            }
        }
        lines
    }

    pub fn display_index_of(&self, row: RowId) -> Option<usize> {
        self.display_lines()
            .iter()
            .position(|line| *line == DisplayLine::Row(row))
    }

    /// True when every row is visible, no placeholder exists and no span is marked.
    pub fn is_pristine(&self) -> bool {
        self.placeholders.is_empty()
            && self.visible.iter().all(|visible| *visible)
            && self.marks.iter().all(|marks| marks.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::{DisplayLayer, DisplayLine, Mark, Placeholder, ViewState};
    use crate::document::{DiffStatus, DisplayTag, Document, DocumentBuilder, RowId, SpanId};

    #[test]
    fn erase_then_unslice_returns_to_pristine_state() {
        let document = plain_document(8, &[]);
        let mut view = ViewState::new(&document);
        view.mark(SpanId(0), Mark::Criterion);
        view.mark(SpanId(1), Mark::Use);
        view.slice_to([RowId(0)]);
        assert!(!view.is_pristine());

        view.erase();
        view.unslice();
        assert!(view.is_pristine());

        view.unslice();
        view.erase();
        assert!(view.is_pristine());
    }

    #[test]
    fn reveal_with_context_clamps_at_document_edges() {
        let document = plain_document(6, &[]);
        let mut view = ViewState::new(&document);
        view.hide_all();
        view.reveal_with_context(RowId(0));
        view.reveal_with_context(RowId(5));
        view.reveal_with_context(RowId(42));

        let visible = view.visible_rows().map(|row| row.0).collect::<Vec<_>>();
        assert_eq!(visible, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn placeholders_cover_each_maximal_hidden_run_once() {
        let document = plain_document(20, &[]);
        let mut view = ViewState::new(&document);
        view.slice_to([RowId(9)]);

        assert_eq!(
            view.placeholders(),
            [
                Placeholder {
                    first_hidden: RowId(0),
                    hidden_rows: 7,
                },
                Placeholder {
                    first_hidden: RowId(12),
                    hidden_rows: 8,
                },
            ]
        );

        let lines = view.display_lines();
        assert_eq!(lines.len(), 7);
        assert!(matches!(lines[0], DisplayLine::Placeholder(_)));
        assert_eq!(lines[1], DisplayLine::Row(RowId(7)));
        assert!(matches!(lines[6], DisplayLine::Placeholder(_)));
        for pair in lines.windows(2) {
            let adjacent_placeholders = matches!(
                pair,
                [DisplayLine::Placeholder(_), DisplayLine::Placeholder(_)]
            );
            assert!(!adjacent_placeholders);
        }
    }

    #[test]
    fn add_placeholders_is_recomputed_not_accumulated() {
        let document = plain_document(10, &[]);
        let mut view = ViewState::new(&document);
        view.hide_all();
        view.reveal(RowId(4));
        view.add_placeholders();
        view.add_placeholders();
        assert_eq!(view.placeholders().len(), 2);

        view.unslice();
        assert!(view.placeholders().is_empty());
        assert_eq!(view.visible_rows().count(), 10);
    }

    #[test]
    fn marks_are_independent_flags() {
        let document = plain_document(2, &[]);
        let mut view = ViewState::new(&document);
        view.mark(SpanId(0), Mark::Use);
        view.mark(SpanId(0), Mark::Definition);
        view.unmark(SpanId(0), Mark::Use);

        let marks = view.marks(SpanId(0));
        assert_eq!(marks.iter().collect::<Vec<_>>(), vec![Mark::Definition]);
        assert_eq!(view.spans_marked(Mark::Definition), vec![SpanId(0)]);
        assert!(view.marks(SpanId(99)).is_empty());
    }

    #[test]
    fn display_layer_styles_matching_tags() {
        assert!(DisplayLayer::Control.styles(DisplayTag::ControlDefinition));
        assert!(!DisplayLayer::Value.styles(DisplayTag::Variable));
        assert!(DisplayLayer::All.styles(DisplayTag::Value));
        assert!(!DisplayLayer::None.styles(DisplayTag::Value));
        assert_eq!("control".parse::<DisplayLayer>().ok(), Some(DisplayLayer::Control));
        assert!("colour".parse::<DisplayLayer>().is_err());
    }

    fn plain_document(rows: usize, inserted: &[usize]) -> Document {
        let mut builder = DocumentBuilder::new();
        for index in 0..rows {
            let status = if inserted.contains(&index) {
                DiffStatus::Inserted
            } else {
                DiffStatus::Unchanged
            };
            builder.line(status, |line| {
                line.span("ENV-DEF", &format!("r{index}"), "x");
            });
        }
        builder.build()
    }
}
