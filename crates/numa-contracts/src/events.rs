use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only journal of pipeline and sync events (`events.jsonl`).
///
/// - default fields are `type`, `session_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
///
/// Clones share one file lock, so the analyzer thread and the profile worker
/// can write to the same journal.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Appends one event and returns the row as written.
    pub fn emit(&self, event_type: &str, fields: EventPayload) -> anyhow::Result<Value> {
        let mut event = payload([
            ("type", Value::from(event_type)),
            ("session_id", Value::from(self.inner.session_id.as_str())),
            ("ts", Value::from(now_utc_iso())),
        ]);
        event.extend(fields);

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        self.append(&line)?;
        Ok(Value::Object(event))
    }

    /// Like [`emit`](Self::emit) but only logs a failed write.
    pub fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.emit(event_type, payload) {
            log::warn!("failed to journal {event_type} event: {err:#}");
        }
    }

    fn append(&self, line: &str) -> anyhow::Result<()> {
        let path = &self.inner.path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event journal lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", path.display()))
    }
}

/// Builds a payload from `(key, value)` pairs.
pub fn payload<const N: usize>(pairs: [(&str, Value); N]) -> EventPayload {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
