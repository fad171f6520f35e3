use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::document::{Document, parse_document};
use crate::telemetry::{EventSink, TelemetryEvent};

pub const SAMPLE_SUBJECT: &str = "sample-1";

/// Seventeen rows: `sum` (x1) defined on line 2, line 9 rewritten (rows 8 and 9),
/// `sum` returned on row 10. Rows 0..=5 and 12..=16 fall outside the line diff.
pub fn sample_markup() -> String {
    let mut rows = Vec::new();
    rows.push(context_row(1, "function total(items) {"));
    rows.push(context_row(
        2,
        "  let <span class='DENV-DEF ENV-DEF ENV-tag' data-address='x1'>sum</span> = \
         <span class='DVAL-DEF VAL-DEF' data-address='v1'>0</span>;",
    ));
    for number in 3..=8 {
        rows.push(context_row(
            number,
            &format!("  // step {number}: items.length &lt; {}", number * 10),
        ));
    }
    rows.push(
        "<tr class='code context-menu'><td class='line deleteLine'>9</td>\
         <td class='delete'>  for (const i of items) sum += i;</td>\
         <td class='line alignment'></td><td class='alignment'></td></tr>\n"
            .to_owned(),
    );
    rows.push(
        "<tr class='code context-menu'><td class='line alignment'></td><td class='alignment'></td>\
         <td class='line insertLine'>9</td><td class='insert'>  for (const i of items) \
         <span class='DENV-USE ENV-USE' data-address='x1'>sum</span> += \
         <span class='DVAL-USE VAL-USE' data-address='v1,v2'>i.price</span>;</td></tr>\n"
            .to_owned(),
    );
    rows.push(context_row(
        10,
        "  return <span class='DENV-USE ENV-USE CONTROL-tag' data-address='x1'>sum</span>;",
    ));
    for number in 11..=15 {
        rows.push(context_row(number, &format!("  // tail {number}")));
    }
    rows.push(context_row(16, "}"));
    rows.concat()
}

pub fn sample_document() -> Document {
    // The fixture is static and covered by the markup tests.
    parse_document(&sample_markup()).unwrap_or_default()
}

fn context_row(number: u32, content: &str) -> String {
    format!(
        "<tr class='code context-menu'><td class='line'>{number}</td><td>{content}</td>\
         <td class='line'>{number}</td><td>{content}</td></tr>\n"
    )
}

/// Event sink that keeps every posted event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn post(&self, event: TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

pub fn temp_path(prefix: &str) -> PathBuf {
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "multidiff_view_{prefix}_{}_{}",
        std::process::id(),
        now_ns
    ))
}

pub fn remove_dir_if_exists(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}
