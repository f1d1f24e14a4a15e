//! Incremental parser for `text/event-stream` bodies.

use thiserror::Error;

/// Default cap on a single event: its buffered partial line plus the data
/// lines collected so far.
pub const EVENT_BYTES_MAX: usize = 5 * 1024 * 1024;

/// One dispatched server-sent event. `event` defaults to `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("event exceeds {limit} bytes")]
pub struct EventTooLarge {
    pub limit: usize,
}

#[derive(Debug)]
pub struct EventParser {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
    data_bytes: usize,
    limit: usize,
}

impl EventParser {
    pub fn new() -> Self {
        Self::with_limit(EVENT_BYTES_MAX)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            event: None,
            data: Vec::new(),
            data_bytes: 0,
            limit,
        }
    }

    /// Feeds a chunk of decoded text and returns every event completed by it.
    /// Partial lines stay buffered until the next chunk.
    pub fn feed(&mut self, chunk: &str) -> Result<Vec<SseEvent>, EventTooLarge> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => {
                    self.data_bytes += value.len();
                    self.data.push(value.to_string());
                    self.check_limit()?;
                }
                // id and retry carry no meaning for a single call
                _ => {}
            }
        }

        self.check_limit()?;
        Ok(events)
    }

    fn check_limit(&self) -> Result<(), EventTooLarge> {
        if self.buffer.len() + self.data_bytes > self.limit {
            return Err(EventTooLarge { limit: self.limit });
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        self.data_bytes = 0;
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}
