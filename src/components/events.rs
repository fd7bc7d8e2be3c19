use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Gesture boundary reported to the telemetry writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    BeginDrawing,
    EndDrawing,
    Click,
    Selection,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    /// Seconds since the log was last reset.
    pub seconds: f64,
    pub kind: GestureKind,
}

/// Append-only, timestamped gesture log. Reset on every image load.
pub struct EventLog {
    started: Instant,
    events: Vec<GestureEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            events: Vec::new(),
        }
    }
}

impl EventLog {
    pub fn reset(&mut self) {
        self.started = Instant::now();
        self.events.clear();
    }

    pub fn record(&mut self, kind: GestureKind) {
        self.events.push(GestureEvent {
            seconds: self.started.elapsed().as_secs_f64(),
            kind,
        });
    }

    pub fn events(&self) -> &[GestureEvent] {
        &self.events
    }

    pub fn kinds(&self) -> Vec<GestureKind> {
        self.events.iter().map(|e| e.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order_with_monotonic_time() {
        let mut log = EventLog::default();
        log.record(GestureKind::BeginDrawing);
        log.record(GestureKind::EndDrawing);
        assert_eq!(log.kinds(), vec![GestureKind::BeginDrawing, GestureKind::EndDrawing]);
        assert!(log.events()[0].seconds <= log.events()[1].seconds);
        log.reset();
        assert!(log.is_empty());
    }

    #[test]
    fn serialises_snake_case_kinds() {
        let mut log = EventLog::default();
        log.record(GestureKind::Click);
        let json = log.to_json().unwrap();
        assert!(json.contains("\"kind\": \"click\""));
        let back: Vec<GestureEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[0].kind, GestureKind::Click);
    }
}
