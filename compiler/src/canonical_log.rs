//! Canonical compile logging
//!
//! Accumulates context while one operation compiles and emits ONE structured
//! log line when it finishes, or when the log is dropped on an error path.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum LogLevel {
    #[default]
    Debug,
    Warn,
}

pub(crate) struct CanonicalLog {
    data: BTreeMap<String, Value>,
    start: Instant,
    level: LogLevel,
    emitted: bool,
}

impl CanonicalLog {
    pub(crate) fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            start: Instant::now(),
            level: LogLevel::default(),
            emitted: false,
        }
    }

    pub(crate) fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> &mut Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.into(), v);
        }
        self
    }

    pub(crate) fn set_level(&mut self, level: LogLevel) -> &mut Self {
        self.level = level;
        self
    }

    pub(crate) fn inc(&mut self, key: &str, amount: i64) -> &mut Self {
        let current = self.data.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
        self.data.insert(key.to_string(), json!(current + amount));
        self
    }

    pub(crate) fn duration_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub(crate) fn emit(mut self) {
        self.do_emit();
    }

    fn do_emit(&mut self) {
        if self.emitted {
            return;
        }
        self.emitted = true;

        self.data
            .insert("duration_ms".to_string(), json!(self.duration_ms()));
        let canonical = serde_json::to_string(&self.data).unwrap_or_else(|_| "{}".to_string());

        match self.level {
            LogLevel::Debug => {
                tracing::debug!(target: "morphstack::compile", canonical = %canonical, "operation_compiled")
            }
            LogLevel::Warn => {
                tracing::warn!(target: "morphstack::compile", canonical = %canonical, "operation_failed")
            }
        }
    }
}

impl Drop for CanonicalLog {
    fn drop(&mut self) {
        self.do_emit();
    }
}
