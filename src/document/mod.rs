use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

pub mod builder;
pub mod markup;

pub use self::builder::DocumentBuilder;
pub use self::markup::{MarkupError, parse_document};

/// Dependency layer a change-impact command operates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    Variable,
    Value,
    CallSite,
    Condition,
    ControlDependency,
    DataDependency,
}

impl Layer {
    pub const ALL: [Layer; 6] = [
        Layer::Variable,
        Layer::Value,
        Layer::CallSite,
        Layer::Condition,
        Layer::ControlDependency,
        Layer::DataDependency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Value => "value",
            Self::CallSite => "call-site",
            Self::Condition => "condition",
            Self::ControlDependency => "control-dependency",
            Self::DataDependency => "data-dependency",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Variable => "Variables",
            Self::Value => "Values",
            Self::CallSite => "Callsites",
            Self::Condition => "Conditions",
            Self::ControlDependency => "Control Dependencies",
            Self::DataDependency => "Data Dependencies",
        }
    }

    pub fn role_pair(self) -> RolePair {
        RolePair {
            definition: Role::Definition(self),
            usage: Role::Use(self),
        }
    }

    pub fn is_dependency(self) -> bool {
        matches!(self, Self::ControlDependency | Self::DataDependency)
    }
}

impl Display for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layers whose spans link a use back to its definitions (goto/find/click).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkedLayer {
    Variable,
    Value,
}

impl LinkedLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Value => "value",
        }
    }

    pub fn role_pair(self) -> RolePair {
        RolePair {
            definition: Role::LinkedDefinition(self),
            usage: Role::LinkedUse(self),
        }
    }
}

impl Display for LinkedLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Styling-only tags toggled by the layer buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DisplayTag {
    Value,
    Variable,
    Control,
    ControlDefinition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Definition(Layer),
    Use(Layer),
    LinkedDefinition(LinkedLayer),
    LinkedUse(LinkedLayer),
    Display(DisplayTag),
}

impl Role {
    /// Maps a markup class to a role. Classes outside the vocabulary yield `None`.
    pub fn from_class(class: &str) -> Option<Self> {
        let role = match class {
            "ENV-DEF" => Self::Definition(Layer::Variable),
            "ENV-USE" => Self::Use(Layer::Variable),
            "VAL-DEF" => Self::Definition(Layer::Value),
            "VAL-USE" => Self::Use(Layer::Value),
            "CALL-DEF" => Self::Definition(Layer::CallSite),
            "CALL-USE" => Self::Use(Layer::CallSite),
            "CON-DEF" => Self::Definition(Layer::Condition),
            "CON-USE" => Self::Use(Layer::Condition),
            "CONDEP-DEF" => Self::Definition(Layer::ControlDependency),
            "CONDEP-USE" => Self::Use(Layer::ControlDependency),
            "DATDEP-XDEF" => Self::Definition(Layer::DataDependency),
            "DATDEP-USE" => Self::Use(Layer::DataDependency),
            "DENV-DEF" => Self::LinkedDefinition(LinkedLayer::Variable),
            "DENV-USE" => Self::LinkedUse(LinkedLayer::Variable),
            "DVAL-DEF" => Self::LinkedDefinition(LinkedLayer::Value),
            "DVAL-USE" => Self::LinkedUse(LinkedLayer::Value),
            "VAL-tag" => Self::Display(DisplayTag::Value),
            "ENV-tag" => Self::Display(DisplayTag::Variable),
            "CONTROL-tag" => Self::Display(DisplayTag::Control),
            "CONTROL-DEF-tag" => Self::Display(DisplayTag::ControlDefinition),
            _ => return None,
        };
        Some(role)
    }

    pub fn class_name(self) -> &'static str {
        match self {
            Self::Definition(Layer::Variable) => "ENV-DEF",
            Self::Use(Layer::Variable) => "ENV-USE",
            Self::Definition(Layer::Value) => "VAL-DEF",
            Self::Use(Layer::Value) => "VAL-USE",
            Self::Definition(Layer::CallSite) => "CALL-DEF",
            Self::Use(Layer::CallSite) => "CALL-USE",
            Self::Definition(Layer::Condition) => "CON-DEF",
            Self::Use(Layer::Condition) => "CON-USE",
            Self::Definition(Layer::ControlDependency) => "CONDEP-DEF",
            Self::Use(Layer::ControlDependency) => "CONDEP-USE",
            Self::Definition(Layer::DataDependency) => "DATDEP-XDEF",
            Self::Use(Layer::DataDependency) => "DATDEP-USE",
            Self::LinkedDefinition(LinkedLayer::Variable) => "DENV-DEF",
            Self::LinkedUse(LinkedLayer::Variable) => "DENV-USE",
            Self::LinkedDefinition(LinkedLayer::Value) => "DVAL-DEF",
            Self::LinkedUse(LinkedLayer::Value) => "DVAL-USE",
            Self::Display(DisplayTag::Value) => "VAL-tag",
            Self::Display(DisplayTag::Variable) => "ENV-tag",
            Self::Display(DisplayTag::Control) => "CONTROL-tag",
            Self::Display(DisplayTag::ControlDefinition) => "CONTROL-DEF-tag",
        }
    }

    pub fn layer(self) -> Option<Layer> {
        match self {
            Self::Definition(layer) | Self::Use(layer) => Some(layer),
            _ => None,
        }
    }
}

/// The (definition role, use role) pair a highlight operation matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePair {
    pub definition: Role,
    pub usage: Role,
}

impl RolePair {
    pub fn contains(&self, role: Role) -> bool {
        self.definition == role || self.usage == role
    }

    pub fn roles(&self) -> [Role; 2] {
        [self.definition, self.usage]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpanId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStatus {
    Unchanged,
    Inserted,
    Deleted,
}

impl DiffStatus {
    pub fn is_changed(self) -> bool {
        self != Self::Unchanged
    }
}

/// What one side of a row shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Context,
    Inserted,
    Deleted,
    Alignment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Span(SpanId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub line_number: Option<u32>,
    pub kind: CellKind,
    pub content: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: RowId,
    pub status: DiffStatus,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub id: SpanId,
    pub row: RowId,
    pub parent: Option<SpanId>,
    pub roles: BTreeSet<Role>,
    pub addresses: Vec<String>,
    pub text: String,
    pub children: Vec<Node>,
}

impl Span {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_addressable(&self) -> bool {
        !self.addresses.is_empty()
    }
}

/// A contiguous run of text with the innermost span that encloses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub span: Option<SpanId>,
}

/// Read-only span model of one loaded diff.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    rows: Vec<Row>,
    spans: Vec<Span>,
}

impl Document {
    pub(crate) fn from_parts(rows: Vec<Row>, spans: Vec<Span>) -> Self {
        Self { rows, spans }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.get(id.0)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn span(&self, id: SpanId) -> Option<&Span> {
        self.spans.get(id.0)
    }

    pub fn spans_with_role(&self, role: Role) -> impl Iterator<Item = &Span> + '_ {
        self.spans.iter().filter(move |span| span.has_role(role))
    }

    pub fn addresses_of(&self, id: SpanId) -> &[String] {
        self.span(id)
            .map(|span| span.addresses.as_slice())
            .unwrap_or_default()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.spans.iter().any(|span| span.has_role(role))
    }

    /// The span itself followed by each enclosing span, innermost first.
    pub fn ancestors(&self, id: SpanId) -> Ancestors<'_> {
        Ancestors {
            document: self,
            next: self.span(id).map(|span| span.id),
        }
    }

    /// Nearest span (self included) carrying any of `roles`.
    pub fn nearest_with_any_role(&self, id: SpanId, roles: &[Role]) -> Option<&Span> {
        self.ancestors(id)
            .find(|span| roles.iter().any(|role| span.has_role(*role)))
    }

    pub fn available_layers(&self) -> BTreeSet<Layer> {
        let mut layers = BTreeSet::new();
        for span in &self.spans {
            layers.extend(span.roles.iter().filter_map(|role| role.layer()));
        }
        layers
    }

    pub fn changed_rows(&self) -> impl Iterator<Item = RowId> + '_ {
        self.rows
            .iter()
            .filter(|row| row.status.is_changed())
            .map(|row| row.id)
    }

    /// Flattens one cell into text runs tagged with their innermost span.
    pub fn cell_runs(&self, cell: &Cell) -> Vec<TextRun> {
        let mut runs = Vec::new();
        self.collect_runs(&cell.content, None, &mut runs);
        runs
    }

    pub fn cell_text(&self, cell: &Cell) -> String {
        self.cell_runs(cell)
            .into_iter()
            .map(|run| run.text)
            .collect()
    }

    fn collect_runs(&self, nodes: &[Node], enclosing: Option<SpanId>, runs: &mut Vec<TextRun>) {
        for node in nodes {
            match node {
                Node::Text(text) => runs.push(TextRun {
                    text: text.clone(),
                    span: enclosing,
                }),
                Node::Span(id) => {
                    if let Some(span) = self.span(*id) {
                        self.collect_runs(&span.children, Some(span.id), runs);
                    }
                }
            }
        }
    }
}

pub struct Ancestors<'a> {
    document: &'a Document,
    next: Option<SpanId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Span;

    fn next(&mut self) -> Option<Self::Item> {
        let span = self.document.span(self.next?)?;
        self.next = span.parent;
        Some(span)
    }
}

/// Splits a comma-joined address list. An empty list marks a non-addressable span.
pub fn parse_address_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_owned)
        .collect()
}
