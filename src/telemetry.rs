use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Study telemetry posted fire-and-forget to the diff server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    LayerSelected { subject: String, layer: String },
    Answer { answer_id: String, seconds: u64 },
    IncorrectAnswer,
    SearchTime { seconds: u64 },
}

impl TelemetryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LayerSelected { .. } => "layer_selected",
            Self::Answer { .. } => "answer",
            Self::IncorrectAnswer => "incorrect_answer",
            Self::SearchTime { .. } => "search_time",
        }
    }

    /// Path segments of the endpoint this event is posted to. Layer events
    /// live under the diff server root; the rest under the study post URL.
    pub fn path_segments(&self) -> Vec<String> {
        match self {
            Self::LayerSelected { subject, layer } => {
                vec!["multidiff".to_owned(), subject.clone(), "layer".to_owned(), layer.clone()]
            }
            Self::Answer { answer_id, seconds } => vec![
                "answer".to_owned(),
                answer_id.clone(),
                "time".to_owned(),
                seconds.to_string(),
            ],
            Self::IncorrectAnswer => vec!["incorrect".to_owned()],
            Self::SearchTime { seconds } => vec!["searchtime".to_owned(), seconds.to_string()],
        }
    }

    pub fn is_layer_event(&self) -> bool {
        matches!(self, Self::LayerSelected { .. })
    }
}

pub trait EventSink {
    /// Must not block and must not report failure back to the caller.
    fn post(&self, event: TelemetryEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn post(&self, event: TelemetryEvent) {
        debug!(kind = event.kind(), "telemetry disabled; dropping event");
    }
}

/// Hands events to the runtime worker, which performs the HTTP post.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<TelemetryEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<TelemetryEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn post(&self, event: TelemetryEvent) {
        if let Err(error) = self.tx.send(event) {
            debug!(kind = error.0.kind(), "telemetry worker gone; dropping event");
        }
    }
}
