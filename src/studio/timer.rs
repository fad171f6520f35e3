use std::time::{Duration, Instant};

/// Active review time, paused while the document is hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReviewTimer {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl ReviewTimer {
    pub fn started(now: Instant) -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: Some(now),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn play(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .running_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.accumulated + running
    }

    /// Whole seconds reviewed so far. The running interval is folded into
    /// the total and restarts from `now`; the total keeps growing.
    pub fn take_elapsed(&mut self, now: Instant) -> u64 {
        if let Some(since) = self.running_since {
            self.accumulated += now.saturating_duration_since(since);
            self.running_since = Some(now);
        }
        self.accumulated.as_secs()
    }
}
