//! Incremental `text/event-stream` framing.
//!
//! Only the `data` field matters to the report stream; `event`, `id`,
//! `retry` and comment lines are accepted and dropped. Lines end with LF,
//! CRLF or a lone CR.

use std::string::FromUtf8Error;

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Option<String>,
    /// The last line ended with CR; an LF starting the next chunk belongs to it.
    after_cr: bool,
    failed: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event payload completed by them, in order.
    ///
    /// A line that is not valid UTF-8 yields one `Err` after the payloads
    /// completed before it; the decoder produces nothing afterwards.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, FromUtf8Error>> {
        if self.failed {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            if self.after_cr {
                match self.pending.first() {
                    None => break,
                    Some(b'\n') => {
                        self.pending.remove(0);
                    }
                    Some(_) => {}
                }
                self.after_cr = false;
            }

            let Some(pos) = self.pending.iter().position(|b| matches!(b, b'\n' | b'\r')) else {
                break;
            };
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.after_cr = line.pop() == Some(b'\r');

            let line = match String::from_utf8(line) {
                Ok(line) => line,
                Err(e) => {
                    self.failed = true;
                    self.pending.clear();
                    self.data = None;
                    events.push(Err(e));
                    break;
                }
            };
            if let Some(payload) = self.process_line(&line) {
                events.push(Ok(payload));
            }
        }
        events
    }

    /// Whether an unterminated event is still buffered.
    pub fn has_partial(&self) -> bool {
        self.data.is_some() || !self.pending.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.data.take().filter(|data| !data.is_empty());
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
        None
    }
}
