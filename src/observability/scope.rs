//! ObservationScope for begin/complete logging around a unit of work
//!
//! - `{name}_BEGIN` on creation
//! - `{name}_COMPLETE` with `elapsed_ms` on `complete()`
//! - `{name}_FAILED` at ERROR on `fail()`
//! - `{name}_INCOMPLETE` at WARN if dropped without either

use std::time::Instant;

use super::events::Event;
use super::logger::Logger;

/// Logs the lifecycle of one unit of work
pub struct ObservationScope {
    name: &'static str,
    fields: Vec<(&'static str, String)>,
    started: Instant,
    finished: bool,
}

impl ObservationScope {
    pub fn new(event: Event) -> Self {
        Self::with_fields(event, Vec::new())
    }

    pub fn with_fields(event: Event, fields: Vec<(&'static str, String)>) -> Self {
        let scope = Self {
            name: event.as_str(),
            fields,
            started: Instant::now(),
            finished: false,
        };
        Logger::info(&format!("{}_BEGIN", scope.name), &scope.field_refs(&[]));
        scope
    }

    fn field_refs<'a>(&'a self, extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        self.fields
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .chain(extra.iter().copied())
            .collect()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    /// Mark the work as done.
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        let elapsed = self.elapsed_ms().to_string();
        let mut fields = self.field_refs(extra);
        fields.push(("elapsed_ms", &elapsed));
        Logger::info(&format!("{}_COMPLETE", self.name), &fields);
    }

    /// Mark the work as failed.
    pub fn fail(mut self, reason: &str) {
        self.finished = true;
        let fields = self.field_refs(&[("reason", reason)]);
        Logger::error(&format!("{}_FAILED", self.name), &fields);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            let fields = self.field_refs(&[("reason", "scope dropped without completion")]);
            Logger::warn(&format!("{}_INCOMPLETE", self.name), &fields);
        }
    }
}
