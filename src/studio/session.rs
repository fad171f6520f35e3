use std::time::Instant;

use tracing::debug;

use crate::commands::{
    ClickTarget, Command, CommandContext, CommandOutcome, MenuSection, dispatch, handle_click,
    menu_for, select_display_layer,
};
use crate::document::Document;
use crate::highlight::line_diff_slice;
use crate::telemetry::EventSink;
use crate::view::{DisplayLayer, ViewState, Viewport};

/// One loaded diff and everything the user has done to it.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    subject: String,
    document: Document,
    view: ViewState,
    viewport: Viewport,
    last_outcome: Option<CommandOutcome>,
}

impl ReviewSession {
    /// Opens on the line-diff slice, like a plain unified diff.
    pub fn open(subject: impl Into<String>, document: Document, viewport: Viewport) -> Self {
        let mut view = ViewState::new(&document);
        let changed = line_diff_slice(&document, &mut view);
        let subject = subject.into();
        debug!(subject = %subject, changed, "review session opened");
        Self {
            subject,
            document,
            view,
            viewport,
            last_outcome: None,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn last_outcome(&self) -> Option<&CommandOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn menu(&self, target: Option<&ClickTarget>) -> Vec<MenuSection> {
        menu_for(&self.document, target)
    }

    pub fn run(
        &mut self,
        command: Command,
        target: Option<ClickTarget>,
        events: &dyn EventSink,
        now: Instant,
    ) -> CommandOutcome {
        let outcome = dispatch(&mut self.context(events), command, target, now);
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    pub fn click(&mut self, target: ClickTarget, events: &dyn EventSink) -> CommandOutcome {
        let outcome = handle_click(&mut self.context(events), target);
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    pub fn select_layer(&mut self, layer: DisplayLayer, events: &dyn EventSink) {
        select_display_layer(&mut self.context(events), layer);
    }

    pub fn status_line(&self) -> String {
        let visible = self.view.visible_rows().count();
        let total = self.document.row_count();
        let outcome = match &self.last_outcome {
            None => "line diff".to_owned(),
            Some(CommandOutcome::Ignored) => "ignored".to_owned(),
            Some(CommandOutcome::NoTarget) => "no target".to_owned(),
            Some(CommandOutcome::Sliced { marked, .. }) => format!("sliced, {marked} marked"),
            Some(CommandOutcome::Jumped { target: Some(_) }) => "jumped to definition".to_owned(),
            Some(CommandOutcome::Jumped { target: None }) => "no definition found".to_owned(),
            Some(CommandOutcome::Highlighted { marked }) => format!("{marked} linked spans"),
            Some(CommandOutcome::Erased) => "highlights removed".to_owned(),
            Some(CommandOutcome::Unsliced) => "entire file".to_owned(),
        };
        format!("{visible}/{total} rows visible | {outcome}")
    }

    fn context<'a>(&'a mut self, events: &'a dyn EventSink) -> CommandContext<'a> {
        CommandContext {
            document: &self.document,
            view: &mut self.view,
            viewport: &mut self.viewport,
            events,
            subject: &self.subject,
        }
    }
}
