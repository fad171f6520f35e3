use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::document::{Document, Layer, LinkedLayer, RowId, SpanId};
use crate::highlight::{
    FindOutcome, GotoOutcome, find_uses, goto_definition, highlight_links, line_diff_slice,
    show_all_pairs,
};
use crate::telemetry::{EventSink, TelemetryEvent};
use crate::view::{DisplayLayer, ViewState, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "CommandEntry")]
pub enum Command {
    ShowAll(Layer),
    GotoDefinition(LinkedLayer),
    FindUses(LinkedLayer),
    LineDiff,
    Erase,
    Unslice,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::ShowAll(Layer::Variable),
        Command::ShowAll(Layer::Value),
        Command::ShowAll(Layer::CallSite),
        Command::ShowAll(Layer::Condition),
        Command::ShowAll(Layer::ControlDependency),
        Command::ShowAll(Layer::DataDependency),
        Command::GotoDefinition(LinkedLayer::Variable),
        Command::GotoDefinition(LinkedLayer::Value),
        Command::FindUses(LinkedLayer::Variable),
        Command::FindUses(LinkedLayer::Value),
        Command::LineDiff,
        Command::Erase,
        Command::Unslice,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::ShowAll(Layer::Variable) => "show-variables",
            Self::ShowAll(Layer::Value) => "show-values",
            Self::ShowAll(Layer::CallSite) => "show-call-sites",
            Self::ShowAll(Layer::Condition) => "show-conditions",
            Self::ShowAll(Layer::ControlDependency) => "show-control-deps",
            Self::ShowAll(Layer::DataDependency) => "show-data-deps",
            Self::GotoDefinition(LinkedLayer::Variable) => "goto-variable-definition",
            Self::GotoDefinition(LinkedLayer::Value) => "goto-value-definition",
            Self::FindUses(LinkedLayer::Variable) => "find-variable-uses",
            Self::FindUses(LinkedLayer::Value) => "find-value-uses",
            Self::LineDiff => "show-line-diff",
            Self::Erase => "erase-highlights",
            Self::Unslice => "unslice-view",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ShowAll(layer) => layer.label(),
            Self::GotoDefinition(LinkedLayer::Variable) => "Variable Definition",
            Self::GotoDefinition(LinkedLayer::Value) => "Value Definition",
            Self::FindUses(LinkedLayer::Variable) => "Variable Uses",
            Self::FindUses(LinkedLayer::Value) => "Value Uses",
            Self::LineDiff => "Unix Diff",
            Self::Erase => "Remove Highlighting",
            Self::Unslice => "View Entire File",
        }
    }

    /// Goto and find need the clicked span to resolve an address set.
    pub fn needs_span(self) -> bool {
        matches!(self, Self::GotoDefinition(_) | Self::FindUses(_))
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Wire form of a menu command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandEntry {
    pub id: &'static str,
    pub label: &'static str,
}

impl From<Command> for CommandEntry {
    fn from(command: Command) -> Self {
        Self {
            id: command.id(),
            label: command.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command `{0}`")]
pub struct CommandParseError(pub String);

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|command| command.id() == value)
            .ok_or_else(|| CommandParseError(value.to_owned()))
    }
}

/// Where the user clicked: always a row, and the innermost span when one was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickTarget {
    pub row: RowId,
    pub span: Option<SpanId>,
    pub alt: bool,
}

impl ClickTarget {
    pub fn span(document: &Document, span: SpanId) -> Option<Self> {
        document.span(span).map(|found| Self {
            row: found.row,
            span: Some(span),
            alt: false,
        })
    }

    pub fn row(row: RowId) -> Self {
        Self {
            row,
            span: None,
            alt: false,
        }
    }

    pub fn with_alt(mut self, alt: bool) -> Self {
        self.alt = alt;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Ignored,
    NoTarget,
    Sliced {
        marked: usize,
        visible_rows: usize,
        placeholders: usize,
    },
    Jumped {
        target: Option<SpanId>,
    },
    Highlighted {
        marked: usize,
    },
    Erased,
    Unsliced,
}

/// Everything one command handler may touch. The dispatcher itself holds no state.
pub struct CommandContext<'a> {
    pub document: &'a Document,
    pub view: &'a mut ViewState,
    pub viewport: &'a mut Viewport,
    pub events: &'a dyn EventSink,
    pub subject: &'a str,
}

impl CommandContext<'_> {
    fn sliced(&self, marked: usize) -> CommandOutcome {
        CommandOutcome::Sliced {
            marked,
            visible_rows: self.view.visible_rows().count(),
            placeholders: self.view.placeholders().len(),
        }
    }
}

pub fn dispatch(
    ctx: &mut CommandContext<'_>,
    command: Command,
    target: Option<ClickTarget>,
    now: Instant,
) -> CommandOutcome {
    ctx.viewport.settle(now);
    info!(command = command.id(), subject = ctx.subject, "dispatching command");

    match command {
        Command::ShowAll(layer) => {
            let marked = show_all_pairs(ctx.document, ctx.view, layer.role_pair());
            ctx.events.post(TelemetryEvent::LayerSelected {
                subject: ctx.subject.to_owned(),
                layer: layer.as_str().to_owned(),
            });
            ctx.sliced(marked)
        }
        Command::GotoDefinition(layer) => {
            let Some((row, span)) = target.and_then(|t| t.span.map(|span| (t.row, span))) else {
                return CommandOutcome::NoTarget;
            };
            let anchor_offset = ctx.viewport.screen_offset(ctx.view, row);
            match goto_definition(ctx.document, ctx.view, span, layer.role_pair()) {
                GotoOutcome::NoTarget => CommandOutcome::NoTarget,
                GotoOutcome::Jump { target, .. } => {
                    scroll_to_definition(ctx, target, anchor_offset, now);
                    CommandOutcome::Jumped { target }
                }
                GotoOutcome::Sliced { definitions, .. } => ctx.sliced(definitions.len()),
            }
        }
        Command::FindUses(layer) => {
            let Some(span) = target.and_then(|t| t.span) else {
                return CommandOutcome::NoTarget;
            };
            match find_uses(ctx.document, ctx.view, span, layer.role_pair()) {
                FindOutcome::NoTarget => CommandOutcome::NoTarget,
                FindOutcome::Sliced {
                    definitions, uses, ..
                } => ctx.sliced(definitions.len() + uses.len()),
            }
        }
        Command::LineDiff => {
            line_diff_slice(ctx.document, ctx.view);
            ctx.sliced(0)
        }
        Command::Erase => {
            ctx.view.erase();
            CommandOutcome::Erased
        }
        Command::Unslice => {
            match target {
                Some(target) => {
                    ctx.viewport
                        .scroll_preserving_offset(ctx.view, target.row, ViewState::unslice);
                }
                None => ctx.view.unslice(),
            }
            CommandOutcome::Unsliced
        }
    }
}

/// Parses `name` and dispatches it; unknown names are ignored.
pub fn dispatch_named(
    ctx: &mut CommandContext<'_>,
    name: &str,
    target: Option<ClickTarget>,
    now: Instant,
) -> CommandOutcome {
    match name.parse::<Command>() {
        Ok(command) => dispatch(ctx, command, target, now),
        Err(error) => {
            debug!(error = %error, "ignoring command");
            CommandOutcome::Ignored
        }
    }
}

fn scroll_to_definition(
    ctx: &mut CommandContext<'_>,
    target: Option<SpanId>,
    anchor_offset: Option<f32>,
    now: Instant,
) {
    let Some(row) = target.and_then(|span| ctx.document.span(span)).map(|span| span.row) else {
        return;
    };
    let Some(top) = ctx.viewport.row_top(ctx.view, row) else {
        return;
    };
    ctx.viewport.animate_to(top - anchor_offset.unwrap_or(0.0), now);
}

/// Plain click: highlight linked definitions and uses in place.
///
/// A variable span wins over a value span nested with it unless Alt is held.
pub fn handle_click(ctx: &mut CommandContext<'_>, target: ClickTarget) -> CommandOutcome {
    let Some(span) = target.span else {
        return CommandOutcome::NoTarget;
    };
    let Some(layer) = click_layer(ctx.document, span, target.alt) else {
        return CommandOutcome::NoTarget;
    };
    match highlight_links(ctx.document, ctx.view, span, layer.role_pair()) {
        Some(marked) => {
            debug!(layer = layer.as_str(), marked, "click highlight");
            CommandOutcome::Highlighted { marked }
        }
        None => CommandOutcome::NoTarget,
    }
}

/// Layer buttons: restyles display tags and records the choice. Marks and visibility stay.
pub fn select_display_layer(ctx: &mut CommandContext<'_>, layer: DisplayLayer) {
    ctx.view.set_display_layer(layer);
    ctx.events.post(TelemetryEvent::LayerSelected {
        subject: ctx.subject.to_owned(),
        layer: layer.as_str().to_owned(),
    });
    debug!(layer = layer.as_str(), "display layer selected");
}

fn within(document: &Document, span: SpanId, layer: LinkedLayer) -> bool {
    document
        .nearest_with_any_role(span, &layer.role_pair().roles())
        .is_some()
}

pub fn click_layer(document: &Document, span: SpanId, alt: bool) -> Option<LinkedLayer> {
    let variable = within(document, span, LinkedLayer::Variable);
    let value = within(document, span, LinkedLayer::Value);
    match (variable, value, alt) {
        (true, true, true) => Some(LinkedLayer::Value),
        (true, _, false) => Some(LinkedLayer::Variable),
        (true, false, true) => None,
        (false, true, _) => Some(LinkedLayer::Value),
        (false, false, _) => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuSection {
    pub title: &'static str,
    pub commands: Vec<Command>,
}

/// Builds the context menu for a click, keyed on which layers the document carries.
pub fn menu_for(document: &Document, target: Option<&ClickTarget>) -> Vec<MenuSection> {
    let mut sections = Vec::new();

    let layers = document.available_layers();
    let impact = if layers.iter().any(|layer| layer.is_dependency()) {
        vec![
            Command::ShowAll(Layer::ControlDependency),
            Command::ShowAll(Layer::DataDependency),
        ]
    } else {
        layers.iter().copied().map(Command::ShowAll).collect()
    };
    if !impact.is_empty() {
        sections.push(MenuSection {
            title: "Change Impact",
            commands: impact,
        });
    }

    let clicked = target.and_then(|target| target.span);
    let linked = if clicked.is_some_and(|span| within(document, span, LinkedLayer::Variable)) {
        vec![LinkedLayer::Variable, LinkedLayer::Value]
    } else if clicked.is_some_and(|span| within(document, span, LinkedLayer::Value)) {
        vec![LinkedLayer::Value]
    } else {
        Vec::new()
    };
    if !linked.is_empty() {
        sections.push(MenuSection {
            title: "Goto Definition",
            commands: linked.iter().copied().map(Command::GotoDefinition).collect(),
        });
        sections.push(MenuSection {
            title: "Find All Uses",
            commands: linked.iter().copied().map(Command::FindUses).collect(),
        });
    }

    sections.push(MenuSection {
        title: "View",
        commands: vec![Command::LineDiff, Command::Erase, Command::Unslice],
    });
    sections
}

pub fn is_offered(document: &Document, target: Option<&ClickTarget>, command: Command) -> bool {
    menu_for(document, target)
        .iter()
        .any(|section| section.commands.contains(&command))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{
        ClickTarget, Command, CommandContext, CommandOutcome, click_layer, dispatch,
        dispatch_named, handle_click, is_offered, menu_for, select_display_layer,
    };
    use crate::document::{DiffStatus, Document, DocumentBuilder, Layer, LinkedLayer, SpanId};
    use crate::telemetry::TelemetryEvent;
    use crate::test_support::RecordingSink;
    use crate::view::{DisplayLayer, Mark, ViewState, Viewport};

    #[test]
    fn command_ids_round_trip_and_unknown_ids_fail() {
        for command in Command::ALL {
            assert_eq!(command.id().parse::<Command>(), Ok(command));
        }
        assert!("all-var".parse::<Command>().is_err());
    }

    #[test]
    fn unknown_command_names_are_ignored() {
        let document = review_document();
        let mut harness = Harness::new(&document);

        let outcome = harness.run_named("rotate-view", None);

        assert_eq!(outcome, CommandOutcome::Ignored);
        assert!(harness.view.is_pristine());
    }

    #[test]
    fn show_all_posts_layer_selection() {
        let document = review_document();
        let mut harness = Harness::new(&document);

        let outcome = harness.run(Command::ShowAll(Layer::Value), None);

        assert!(matches!(outcome, CommandOutcome::Sliced { marked: 1, .. }));
        assert_eq!(
            harness.events.events(),
            vec![TelemetryEvent::LayerSelected {
                subject: "subject-1".to_owned(),
                layer: "value".to_owned(),
            }]
        );
    }

    #[test]
    fn display_layer_selection_keeps_highlights_and_posts_event() {
        let document = review_document();
        let mut harness = Harness::new(&document);
        harness.run(Command::ShowAll(Layer::Variable), None);
        let marked = harness.view.spans_marked(Mark::Criterion);

        select_display_layer(&mut harness.context(), DisplayLayer::Control);

        assert_eq!(harness.view.display_layer(), DisplayLayer::Control);
        assert_eq!(harness.view.spans_marked(Mark::Criterion), marked);
        assert_eq!(
            harness.events.events().last(),
            Some(&TelemetryEvent::LayerSelected {
                subject: "subject-1".to_owned(),
                layer: "control".to_owned(),
            })
        );
    }

    #[test]
    fn goto_without_span_is_a_no_op() {
        let document = review_document();
        let mut harness = Harness::new(&document);
        let row = document.rows()[3].id;

        let outcome = harness.run(
            Command::GotoDefinition(LinkedLayer::Variable),
            Some(ClickTarget::row(row)),
        );

        assert_eq!(outcome, CommandOutcome::NoTarget);
        assert!(harness.view.is_pristine());
    }

    #[test]
    fn unambiguous_goto_animates_definition_to_the_clicked_offset() {
        let document = review_document();
        let mut harness = Harness::new(&document);
        harness.viewport.set_scroll_top(100.0);
        let target = ClickTarget::span(&document, SpanId(2)).expect("use span");

        let outcome = harness.run(Command::GotoDefinition(LinkedLayer::Variable), Some(target));

        assert_eq!(outcome, CommandOutcome::Jumped { target: Some(SpanId(0)) });
        // Use on row 20 sat 300px below the top; definition on row 0 cannot scroll above 0.
        let animation = harness.viewport.animation().expect("scroll animation");
        assert_eq!(animation.target(), 0.0);

        let settled = harness
            .viewport
            .current_offset(harness.now + Duration::from_secs(1));
        assert_eq!(settled, 0.0);
    }

    #[test]
    fn goto_scroll_target_keeps_screen_offset() {
        let document = jump_document();
        let mut harness = Harness::new(&document);
        let target = ClickTarget::span(&document, SpanId(0)).expect("use span");

        let outcome = harness.run(Command::GotoDefinition(LinkedLayer::Variable), Some(target));

        assert_eq!(outcome, CommandOutcome::Jumped { target: Some(SpanId(1)) });
        // Row 5 sat 100px below the top, so row 25 (top 500) lands there too.
        assert_eq!(harness.viewport.animation().map(|a| a.target()), Some(400.0));
        assert!(harness.view.placeholders().is_empty());
    }

    #[test]
    fn goto_during_an_animation_measures_from_the_reached_offset() {
        let document = jump_document();
        let mut harness = Harness::new(&document);
        harness.viewport.animate_to(200.0, harness.now);
        harness.now += Duration::from_millis(100);
        let target = ClickTarget::span(&document, SpanId(0)).expect("use span");

        harness.run(Command::GotoDefinition(LinkedLayer::Variable), Some(target));

        // Halfway through, row 5 (top 100) sits at the top of the viewport.
        let animation = harness.viewport.animation().expect("scroll animation");
        assert!((animation.target() - 500.0).abs() < 0.5, "target was {}", animation.target());
    }

    #[test]
    fn unslice_preserves_clicked_row_offset() {
        let document = review_document();
        let mut harness = Harness::new(&document);
        harness.run(Command::LineDiff, None);
        let row = document.rows()[20].id;
        let before = harness.viewport.screen_offset(&harness.view, row);

        let outcome = harness.run(Command::Unslice, Some(ClickTarget::row(row)));

        assert_eq!(outcome, CommandOutcome::Unsliced);
        assert!(harness.view.placeholders().is_empty());
        assert_eq!(harness.viewport.screen_offset(&harness.view, row), before);
    }

    #[test]
    fn erase_keeps_visibility() {
        let document = review_document();
        let mut harness = Harness::new(&document);
        harness.run(Command::ShowAll(Layer::Variable), None);
        let visible = harness.view.visible_rows().count();

        assert_eq!(harness.run(Command::Erase, None), CommandOutcome::Erased);
        assert_eq!(harness.view.visible_rows().count(), visible);
        assert!(harness.view.spans_marked(Mark::Criterion).is_empty());
    }

    #[test]
    fn click_prefers_variable_unless_alt_is_held() {
        let document = review_document();

        assert_eq!(click_layer(&document, SpanId(3), false), Some(LinkedLayer::Variable));
        assert_eq!(click_layer(&document, SpanId(3), true), Some(LinkedLayer::Value));
        assert_eq!(click_layer(&document, SpanId(0), true), None);
        assert_eq!(click_layer(&document, SpanId(1), false), Some(LinkedLayer::Variable));
        assert_eq!(click_layer(&document, SpanId(5), false), Some(LinkedLayer::Value));
        assert_eq!(click_layer(&document, SpanId(5), true), Some(LinkedLayer::Value));
        assert_eq!(click_layer(&document, SpanId(4), false), None);

        let mut harness = Harness::new(&document);
        let target = ClickTarget::span(&document, SpanId(2)).expect("use span");
        let outcome = handle_click(&mut harness.context(), target);
        assert_eq!(outcome, CommandOutcome::Highlighted { marked: 2 });
        assert_eq!(harness.view.visible_rows().count(), document.row_count());
    }

    #[test]
    fn menu_offers_layers_present_and_linked_commands_inside_spans() {
        let document = review_document();

        let plain = menu_for(&document, None);
        let titles = plain.iter().map(|section| section.title).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Change Impact", "View"]);
        assert_eq!(
            plain[0].commands,
            vec![
                Command::ShowAll(Layer::Variable),
                Command::ShowAll(Layer::Value),
                Command::ShowAll(Layer::CallSite),
            ]
        );

        let in_variable = ClickTarget::span(&document, SpanId(2)).expect("use span");
        assert!(is_offered(
            &document,
            Some(&in_variable),
            Command::FindUses(LinkedLayer::Value)
        ));
        let in_value = ClickTarget::span(&document, SpanId(5)).expect("value span");
        assert!(!is_offered(
            &document,
            Some(&in_value),
            Command::GotoDefinition(LinkedLayer::Variable)
        ));
        assert!(!is_offered(&document, None, Command::ShowAll(Layer::Condition)));
    }

    #[test]
    fn menu_sections_serialize_commands_by_id_and_label() {
        let document = review_document();

        let value = serde_json::to_value(menu_for(&document, None)).expect("menu should serialize");

        assert_eq!(value[0]["title"], "Change Impact");
        assert_eq!(
            value[1],
            serde_json::json!({
                "title": "View",
                "commands": [
                    {"id": "show-line-diff", "label": Command::LineDiff.label()},
                    {"id": "erase-highlights", "label": Command::Erase.label()},
                    {"id": "unslice-view", "label": Command::Unslice.label()},
                ],
            })
        );
    }

    #[test]
    fn dependency_layers_replace_the_multidiff_menu() {
        let mut builder = DocumentBuilder::new();
        builder.line(DiffStatus::Inserted, |line| {
            line.span("CONDEP-USE VAL-DEF", "k1", "if (x)");
        });
        let document = builder.build();

        let menu = menu_for(&document, None);
        assert_eq!(
            menu[0].commands,
            vec![
                Command::ShowAll(Layer::ControlDependency),
                Command::ShowAll(Layer::DataDependency),
            ]
        );
    }

    struct Harness<'a> {
        document: &'a Document,
        view: ViewState,
        viewport: Viewport,
        events: RecordingSink,
        now: Instant,
    }

    impl<'a> Harness<'a> {
        fn new(document: &'a Document) -> Self {
            Self {
                document,
                view: ViewState::new(document),
                viewport: Viewport::new(20.0),
                events: RecordingSink::default(),
                now: Instant::now(),
            }
        }

        fn context(&mut self) -> CommandContext<'_> {
            CommandContext {
                document: self.document,
                view: &mut self.view,
                viewport: &mut self.viewport,
                events: &self.events,
                subject: "subject-1",
            }
        }

        fn run(&mut self, command: Command, target: Option<ClickTarget>) -> CommandOutcome {
            let now = self.now;
            dispatch(&mut self.context(), command, target, now)
        }

        fn run_named(&mut self, name: &str, target: Option<ClickTarget>) -> CommandOutcome {
            let now = self.now;
            dispatch_named(&mut self.context(), name, target, now)
        }
    }

    /// 40 rows: a variable use on row 5 and its only definition on row 25.
    fn jump_document() -> Document {
        let mut builder = DocumentBuilder::new();
        for index in 0..40 {
            builder.line(DiffStatus::Unchanged, |line| match index {
                5 => {
                    line.span("DENV-USE", "x1", "x");
                }
                25 => {
                    line.span("DENV-DEF", "x1", "x");
                }
                _ => {
                    line.text("...");
                }
            });
        }
        builder.build()
    }

    /// 30 rows. Row 0: variable definition (span 0) holding a value use (span 1).
    /// Row 20 (inserted): variable use (span 2) holding a value definition (span 3).
    /// Row 25: a call-site span (span 4). Row 27: a bare value use (span 5).
    fn review_document() -> Document {
        let mut builder = DocumentBuilder::new();
        for index in 0..30 {
            let status = if index == 20 {
                DiffStatus::Inserted
            } else {
                DiffStatus::Unchanged
            };
            builder.line(status, |line| match index {
                0 => {
                    line.open("DENV-DEF ENV-DEF", "x1");
                    line.text("var x = ");
                    line.span("DVAL-USE", "v1", "make()");
                    line.close();
                }
                20 => {
                    line.open("DENV-USE", "x1");
                    line.span("DVAL-DEF VAL-DEF", "v2", "x");
                    line.close();
                }
                25 => {
                    line.span("CALL-USE", "c1", "run()");
                }
                27 => {
                    line.span("DVAL-USE", "v2", "x");
                }
                _ => {
                    line.text("...");
                }
            });
        }
        builder.build()
    }
}
