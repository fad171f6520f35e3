use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use eframe::egui;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{info, warn};

use crate::client::DiffClient;
use crate::commands::{ClickTarget, Command};
use crate::config::ViewerSettings;
use crate::document::{Cell, CellKind, Document, DisplayTag, Role, Row, SpanId, parse_document};
use crate::render::{cell_gutter, effective_marks, placeholder_label};
use crate::telemetry::{ChannelSink, EventSink, NoopSink, TelemetryEvent};
use crate::view::{DisplayLayer, DisplayLine, Mark, Viewport};

pub mod events;
pub mod session;
pub mod timer;

use self::events::{DocumentSource, StudioCommand, StudioEvent};
use self::session::ReviewSession;
use self::timer::ReviewTimer;

const APP_TITLE: &str = "multidiff_view";
const REPAINT_INTERVAL: Duration = Duration::from_millis(120);

pub fn run_studio(settings: &ViewerSettings, source: DocumentSource) -> Result<()> {
    let runtime_handle = Handle::try_current().context("studio requires a tokio runtime")?;
    let client = DiffClient::new(settings.clone());

    let (command_tx, command_rx) = unbounded_channel::<StudioCommand>();
    let (event_tx, event_rx) = unbounded_channel::<StudioEvent>();
    let sink: Box<dyn EventSink> = if settings.telemetry_enabled {
        let (telemetry_tx, telemetry_rx) = unbounded_channel::<TelemetryEvent>();
        spawn_telemetry_worker(&runtime_handle, client.clone(), telemetry_rx);
        Box::new(ChannelSink::new(telemetry_tx))
    } else {
        Box::new(NoopSink)
    };

    spawn_runtime_worker(&runtime_handle, client, command_rx, event_tx);
    info!(
        source = %source,
        server = %settings.diff_server_url,
        telemetry = settings.telemetry_enabled,
        "starting diff viewer"
    );

    if command_tx
        .send(StudioCommand::Load {
            source: source.clone(),
        })
        .is_err()
    {
        warn!("runtime worker exited before the first load");
    }

    eframe::run_native(
        APP_TITLE,
        eframe::NativeOptions::default(),
        Box::new(move |_cc| Ok(Box::new(StudioApp::new(source, command_tx, event_rx, sink)))),
    )
    .map_err(|error| anyhow::anyhow!("viewer UI exited with error: {error}"))
}

fn spawn_runtime_worker(
    handle: &Handle,
    client: DiffClient,
    mut command_rx: UnboundedReceiver<StudioCommand>,
    event_tx: UnboundedSender<StudioEvent>,
) {
    let _task = handle.spawn(async move {
        while let Some(command) = command_rx.recv().await {
            match command {
                StudioCommand::Load { source } => {
                    if event_tx
                        .send(StudioEvent::LoadStarted {
                            source: source.clone(),
                        })
                        .is_err()
                    {
                        break;
                    }

                    let event = match load_document(&client, &source).await {
                        Ok(document) => StudioEvent::DocumentLoaded { source, document },
                        Err(error) => StudioEvent::LoadFailed {
                            source,
                            error: format!("{error:#}"),
                        },
                    };
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
                StudioCommand::Shutdown => break,
            }
        }
    });
}

/// Posts telemetry off the UI thread. Failures are logged and never reach the view.
fn spawn_telemetry_worker(
    handle: &Handle,
    client: DiffClient,
    mut telemetry_rx: UnboundedReceiver<TelemetryEvent>,
) {
    let _task = handle.spawn(async move {
        while let Some(event) = telemetry_rx.recv().await {
            if let Err(error) = client.post_event(&event).await {
                warn!(kind = event.kind(), error = %error, "telemetry post failed");
            }
        }
    });
}

pub async fn load_document(client: &DiffClient, source: &DocumentSource) -> Result<Document> {
    match source {
        DocumentSource::Subject(subject) => client
            .fetch_document(subject)
            .await
            .with_context(|| format!("failed to fetch diff for subject `{subject}`")),
        DocumentSource::File(path) => {
            let markup = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            parse_document(&markup).with_context(|| format!("failed to parse {}", path.display()))
        }
    }
}

/// Deferred UI input, applied after the frame's immutable drawing pass.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Interaction {
    Click(ClickTarget),
    Run(Command, Option<ClickTarget>),
    Scrolled(f32),
}

struct StudioApp {
    source: DocumentSource,
    command_tx: UnboundedSender<StudioCommand>,
    event_rx: UnboundedReceiver<StudioEvent>,
    events: Box<dyn EventSink>,
    session: Option<ReviewSession>,
    timer: ReviewTimer,
    answer_buffer: String,
    status: String,
    loading: bool,
    runtime_disconnected: bool,
}

impl StudioApp {
    fn new(
        source: DocumentSource,
        command_tx: UnboundedSender<StudioCommand>,
        event_rx: UnboundedReceiver<StudioEvent>,
        events: Box<dyn EventSink>,
    ) -> Self {
        Self {
            source,
            command_tx,
            event_rx,
            events,
            session: None,
            timer: ReviewTimer::default(),
            answer_buffer: String::new(),
            status: "Waiting for diff...".to_owned(),
            loading: true,
            runtime_disconnected: false,
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => self.apply_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.runtime_disconnected {
                        warn!("viewer runtime worker disconnected");
                        self.status = "Runtime worker disconnected.".to_owned();
                    }
                    self.runtime_disconnected = true;
                    self.loading = false;
                    break;
                }
            }
        }
    }

    fn apply_event(&mut self, event: StudioEvent) {
        match event {
            StudioEvent::LoadStarted { source } => {
                self.loading = true;
                self.status = format!("Loading {source}...");
            }
            StudioEvent::DocumentLoaded { source, document } => {
                self.loading = false;
                let session = ReviewSession::open(source.subject(), document, Viewport::default());
                self.status = session.status_line();
                self.session = Some(session);
                self.timer = ReviewTimer::started(Instant::now());
                self.source = source;
            }
            StudioEvent::LoadFailed { source, error } => {
                self.loading = false;
                warn!(source = %source, error = %error, "diff load failed");
                self.status = format!("Failed to load {source}: {error}");
            }
        }
    }

    fn reload(&mut self) {
        if let Err(error) = self.command_tx.send(StudioCommand::Load {
            source: self.source.clone(),
        }) {
            self.runtime_disconnected = true;
            self.status = format!("Failed to request reload: {error}");
        }
    }

    fn apply_interactions(&mut self, interactions: Vec<Interaction>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let now = Instant::now();
        for interaction in interactions {
            match interaction {
                Interaction::Click(target) => {
                    session.click(target, self.events.as_ref());
                }
                Interaction::Run(command, target) => {
                    session.run(command, target, self.events.as_ref(), now);
                }
                Interaction::Scrolled(offset) => {
                    session.viewport_mut().follow_user_scroll(offset);
                }
            }
            self.status = session.status_line();
        }
    }

    fn post(&self, event: TelemetryEvent) {
        self.events.post(event);
    }

    fn render_side_pane(&mut self, ui: &mut egui::Ui) {
        ui.heading("Review");
        ui.label(format!("Source: {}", self.source));
        ui.label(format!("Status: {}", self.status));
        if self.loading {
            ui.spinner();
        }
        if ui
            .add_enabled(!self.runtime_disconnected && !self.loading, egui::Button::new("Reload"))
            .clicked()
        {
            self.reload();
        }
        ui.separator();

        ui.label(egui::RichText::new("Display layer").strong());
        let mut selected = None;
        if let Some(session) = &self.session {
            let current = session.view().display_layer();
            for layer in DisplayLayer::ALL {
                if ui.radio(current == layer, layer.label()).clicked() && current != layer {
                    selected = Some(layer);
                }
            }
        }
        if let (Some(layer), Some(session)) = (selected, self.session.as_mut()) {
            session.select_layer(layer, self.events.as_ref());
        }
        ui.separator();

        ui.label(egui::RichText::new("Timer").strong());
        let now = Instant::now();
        ui.label(format!("Reviewing for {}s", self.timer.elapsed(now).as_secs()));
        let toggle = if self.timer.is_running() { "Pause" } else { "Resume" };
        if ui.button(toggle).clicked() {
            if self.timer.is_running() {
                self.timer.pause(now);
            } else {
                self.timer.play(now);
            }
        }
        if ui.button("Found it").clicked() {
            let seconds = self.timer.take_elapsed(now);
            self.post(TelemetryEvent::SearchTime { seconds });
        }
        ui.separator();

        ui.label(egui::RichText::new("Answer").strong());
        ui.add(egui::TextEdit::singleline(&mut self.answer_buffer).hint_text("answer id"));
        ui.horizontal(|ui| {
            let answer_id = self.answer_buffer.trim().to_owned();
            if ui
                .add_enabled(!answer_id.is_empty(), egui::Button::new("Submit"))
                .clicked()
            {
                let seconds = self.timer.take_elapsed(now);
                self.events.post(TelemetryEvent::Answer { answer_id, seconds });
                self.answer_buffer.clear();
            }
            if ui.button("Incorrect").clicked() {
                self.events.post(TelemetryEvent::IncorrectAnswer);
            }
        });
    }

    fn render_document_pane(&mut self, ui: &mut egui::Ui) -> Vec<Interaction> {
        let mut interactions = Vec::new();
        if !self.timer.is_running() && self.session.is_some() {
            ui.centered_and_justified(|ui| ui.label("Paused. Resume to continue reviewing."));
            return interactions;
        }
        let Some(session) = self.session.as_mut() else {
            ui.centered_and_justified(|ui| ui.label(self.status.as_str()));
            return interactions;
        };

        let forced_offset = session.viewport_mut().frame_offset(Instant::now());
        let line_height = session.viewport().line_height();
        let session = &*session;
        let lines = session.view().display_lines();

        let mut scroll = egui::ScrollArea::vertical()
            .id_salt("diff_rows")
            .auto_shrink([false, false]);
        if let Some(offset) = forced_offset {
            scroll = scroll.vertical_scroll_offset(offset);
        }
        let output = scroll.show_rows(ui, line_height, lines.len(), |ui, range| {
            ui.spacing_mut().item_spacing.y = 0.0;
            for line in &lines[range] {
                match line {
                    DisplayLine::Row(id) => {
                        if let Some(row) = session.document().row(*id) {
                            render_row(ui, session, row, line_height, &mut interactions);
                        }
                    }
                    DisplayLine::Placeholder(placeholder) => {
                        let response = ui.add_sized(
                            [ui.available_width(), line_height],
                            egui::Label::new(
                                egui::RichText::new(placeholder_label(placeholder.hidden_rows))
                                    .monospace()
                                    .weak(),
                            )
                            .sense(egui::Sense::click()),
                        );
                        let target = ClickTarget::row(placeholder.first_hidden);
                        response.context_menu(|ui| {
                            render_menu(ui, session, target, &mut interactions);
                        });
                    }
                }
            }
        });

        if forced_offset.is_none() {
            interactions.push(Interaction::Scrolled(output.state.offset.y));
        }
        interactions
    }
}

fn render_row(
    ui: &mut egui::Ui,
    session: &ReviewSession,
    row: &Row,
    line_height: f32,
    interactions: &mut Vec<Interaction>,
) {
    let row_response = ui
        .horizontal(|ui| {
            ui.set_min_height(line_height);
            let column_width = ui.available_width() / row.cells.len().max(1) as f32;
            for cell in &row.cells {
                ui.allocate_ui_with_layout(
                    egui::vec2(column_width, line_height),
                    egui::Layout::left_to_right(egui::Align::Center),
                    |ui| {
                        ui.set_min_width(column_width);
                        render_cell(ui, session, cell, interactions);
                    },
                );
            }
        })
        .response
        .interact(egui::Sense::click());
    row_response.context_menu(|ui| {
        render_menu(ui, session, ClickTarget::row(row.id), interactions);
    });
}

fn render_cell(
    ui: &mut egui::Ui,
    session: &ReviewSession,
    cell: &Cell,
    interactions: &mut Vec<Interaction>,
) {
    let document = session.document();
    let view = session.view();
    ui.label(egui::RichText::new(cell_gutter(cell)).monospace().weak());
    if cell.kind == CellKind::Alignment {
        return;
    }
    ui.spacing_mut().item_spacing.x = 0.0;
    ui.label(egui::RichText::new(" ").monospace());
    for run in document.cell_runs(cell) {
        let mut text = egui::RichText::new(&run.text).monospace();
        if let Some(color) = mark_color(effective_marks(document, view, run.span)) {
            text = text.background_color(color);
        }
        if let Some(tag) = display_tag(document, run.span)
            && view.display_layer().styles(tag)
        {
            text = text.color(tag_color(tag)).strong();
        }

        let Some(span) = run.span else {
            ui.label(text);
            continue;
        };
        let response = ui.add(egui::Label::new(text).sense(egui::Sense::click()));
        let target = ClickTarget::span(document, span);
        if let Some(target) = target {
            if response.clicked() {
                let alt = ui.input(|input| input.modifiers.alt);
                interactions.push(Interaction::Click(target.with_alt(alt)));
            }
            response.context_menu(|ui| render_menu(ui, session, target, interactions));
        }
    }
}

fn render_menu(
    ui: &mut egui::Ui,
    session: &ReviewSession,
    target: ClickTarget,
    interactions: &mut Vec<Interaction>,
) {
    for section in session.menu(Some(&target)) {
        ui.label(egui::RichText::new(section.title).strong());
        for command in section.commands {
            if ui.button(command.label()).clicked() {
                interactions.push(Interaction::Run(command, Some(target)));
                ui.close_menu();
            }
        }
        ui.separator();
    }
}

fn display_tag(document: &Document, span: Option<SpanId>) -> Option<DisplayTag> {
    document.ancestors(span?).find_map(|ancestor| {
        ancestor.roles.iter().find_map(|role| match role {
            Role::Display(tag) => Some(*tag),
            _ => None,
        })
    })
}

fn mark_color(marks: crate::view::MarkSet) -> Option<egui::Color32> {
    let mark = marks.iter().next()?;
    let color = match mark {
        Mark::Criterion => egui::Color32::from_rgb(255, 236, 153),
        Mark::Definition => egui::Color32::from_rgb(186, 230, 190),
        Mark::Use => egui::Color32::from_rgb(190, 214, 245),
        Mark::Dependency => egui::Color32::from_rgb(250, 206, 170),
    };
    Some(color)
}

fn tag_color(tag: DisplayTag) -> egui::Color32 {
    match tag {
        DisplayTag::Value => egui::Color32::from_rgb(26, 103, 64),
        DisplayTag::Variable => egui::Color32::from_rgb(31, 78, 150),
        DisplayTag::Control | DisplayTag::ControlDefinition => {
            egui::Color32::from_rgb(140, 84, 0)
        }
    }
}

impl Drop for StudioApp {
    fn drop(&mut self) {
        let _ = self.command_tx.send(StudioCommand::Shutdown);
    }
}

impl eframe::App for StudioApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        egui::SidePanel::left("viewer_side_pane")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| self.render_side_pane(ui));

        let interactions = egui::CentralPanel::default()
            .show(ctx, |ui| self.render_document_pane(ui))
            .inner;
        self.apply_interactions(interactions);

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}
