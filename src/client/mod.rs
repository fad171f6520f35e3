use std::future::Future;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ViewerSettings;
use crate::document::{Document, MarkupError, parse_document};
use crate::telemetry::TelemetryEvent;

const RETRY_BASE_DELAY_MS: u64 = 250;

#[derive(Debug, thiserror::Error)]
pub enum DiffClientError {
    #[error("diff server request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("diff server returned HTTP {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },

    #[error("diff markup could not be parsed: {0}")]
    Markup(#[from] MarkupError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DiffClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(error) => {
                error.is_timeout() || error.is_connect() || error.is_request()
            }
            Self::HttpStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Markup(_) | Self::Configuration(_) => false,
        }
    }
}

/// HTTP collaborator: fetches annotated diffs and posts study telemetry.
#[derive(Debug, Clone)]
pub struct DiffClient {
    http_client: reqwest::Client,
    settings: ViewerSettings,
}

impl DiffClient {
    pub fn new(settings: ViewerSettings) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn document_url(&self, subject: &str) -> Result<Url, DiffClientError> {
        let subject = subject.trim();
        if subject.is_empty() || subject.contains('/') {
            return Err(DiffClientError::Configuration(format!(
                "invalid subject id `{subject}`"
            )));
        }
        join_segments(&self.settings.diff_server_url, ["diffs", subject])
    }

    pub fn event_url(&self, event: &TelemetryEvent) -> Result<Url, DiffClientError> {
        let base = if event.is_layer_event() {
            &self.settings.diff_server_url
        } else {
            &self.settings.telemetry_post_url
        };
        join_segments(base, event.path_segments())
    }

    pub async fn fetch_document(&self, subject: &str) -> Result<Document, DiffClientError> {
        let markup = self.fetch_markup(subject).await?;
        let document = parse_document(&markup)?;
        info!(
            subject,
            rows = document.row_count(),
            spans = document.spans().len(),
            "loaded diff document"
        );
        Ok(document)
    }

    pub async fn fetch_markup(&self, subject: &str) -> Result<String, DiffClientError> {
        let url = self.document_url(subject)?;
        let total_attempts = self.settings.fetch_max_retries.saturating_add(1);
        let mut attempt: u32 = 1;

        loop {
            let result = self.with_timeout(self.get_text(url.clone())).await;
            match result {
                Ok(markup) => return Ok(markup),
                Err(error) => {
                    let should_retry = attempt < total_attempts && error.is_retryable();
                    if !should_retry {
                        return Err(error);
                    }

                    let delay_ms = retry_delay_ms(attempt);
                    warn!(
                        attempt,
                        total_attempts,
                        delay_ms,
                        error = %error,
                        "diff fetch failed; retrying"
                    );

                    sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Single attempt; telemetry is never retried.
    pub async fn post_event(&self, event: &TelemetryEvent) -> Result<(), DiffClientError> {
        let url = self.event_url(event)?;
        debug!(url = %url, kind = event.kind(), "posting telemetry event");
        self.with_timeout(async {
            let response = self.http_client.post(url).send().await?;
            ensure_success(response).await?;
            Ok::<(), DiffClientError>(())
        })
        .await
    }

    async fn get_text(&self, url: Url) -> Result<String, DiffClientError> {
        debug!(url = %url, "fetching diff markup");
        let response = self.http_client.get(url).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.text().await?)
    }

    async fn with_timeout<T>(
        &self,
        request: impl Future<Output = Result<T, DiffClientError>>,
    ) -> Result<T, DiffClientError> {
        let timeout_duration = Duration::from_millis(self.settings.fetch_timeout_ms);
        match timeout(timeout_duration, request).await {
            Ok(result) => result,
            Err(_) => Err(DiffClientError::Timeout {
                timeout_ms: self.settings.fetch_timeout_ms,
            }),
        }
    }
}

/// Appends percent-encoded `segments` to the path of `base`.
fn join_segments<I>(base: &str, segments: I) -> Result<Url, DiffClientError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = Url::parse(base).map_err(|error| {
        DiffClientError::Configuration(format!("invalid base URL `{base}`: {error}"))
    })?;
    url.path_segments_mut()
        .map_err(|()| DiffClientError::Configuration(format!("base URL `{base}` cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn retry_delay_ms(attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(5);
    RETRY_BASE_DELAY_MS.saturating_mul(1_u64 << exponent)
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DiffClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error response body>".to_owned());
    Err(DiffClientError::HttpStatus { status, body })
}
