//! Incremental SSE stream reading for streaming latency measurement.
//!
//! [`SseReader`] consumes the raw byte chunks of a `streamGenerateContent`
//! response, reassembles them into lines, and decodes each `data:` event,
//! recording two instants relative to call start: when the first decodable
//! event arrived and when the first visible text fragment arrived (the
//! TTFT signal). Undecodable lines are dropped silently — a malformed or
//! partially delivered event never fails the call.

use crate::request::{GenerateResponse, estimate_tokens};
use std::time::{Duration, Instant};

/// SSE event-data marker. The backend emits `data: {json}` per event.
const DATA_PREFIX: &str = "data: ";

/// Everything a consumed stream yields, shaped for a `SampleResult`.
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    /// Elapsed time at the first decodable event, text-bearing or not.
    pub first_event: Option<Duration>,
    /// Elapsed time at the first non-empty text fragment.
    pub first_text: Option<Duration>,
    /// Accumulated visible text.
    pub text: String,
    /// Whitespace-split token estimate, accumulated per fragment.
    pub token_estimate: u32,
    /// Number of successfully decoded events.
    pub event_count: u64,
}

/// Incremental reader over an SSE response body.
#[derive(Debug)]
pub struct SseReader {
    start: Instant,
    buf: Vec<u8>,
    outcome: StreamOutcome,
}

impl SseReader {
    /// Create a reader measuring elapsed times against `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            buf: Vec::new(),
            outcome: StreamOutcome::default(),
        }
    }

    /// Feed one raw chunk from the transport.
    ///
    /// Chunk boundaries carry no meaning: lines are reassembled here, and
    /// events split across chunks decode once their terminating newline
    /// arrives.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            self.push_line(line.trim_end_matches(['\n', '\r']));
        }
    }

    /// Feed one complete line.
    ///
    /// Blank lines and non-`data:` framing lines are skipped; `data:`
    /// payloads that fail to decode are dropped without affecting the
    /// outcome.
    pub fn push_line(&mut self, line: &str) {
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        let Ok(event) = serde_json::from_str::<GenerateResponse>(payload) else {
            return;
        };

        if self.outcome.first_event.is_none() {
            self.outcome.first_event = Some(self.start.elapsed());
        }
        self.outcome.event_count += 1;

        let Some(candidate) = event.candidates.first() else {
            return;
        };
        let Some(content) = &candidate.content else {
            return;
        };

        for part in &content.parts {
            // Internal reasoning output is filtered: it must not count
            // toward first-text timing or output size.
            if part.thought {
                continue;
            }
            let Some(text) = &part.text else {
                continue;
            };
            if text.is_empty() {
                continue;
            }

            if self.outcome.first_text.is_none() {
                self.outcome.first_text = Some(self.start.elapsed());
            }
            self.outcome.text.push_str(text);
            self.outcome.token_estimate += estimate_tokens(text);
        }
    }

    /// Finalize at stream close, flushing any unterminated trailing line.
    pub fn finish(mut self) -> StreamOutcome {
        if !self.buf.is_empty() {
            let tail: Vec<u8> = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&tail);
            self.push_line(line.trim_end_matches(['\n', '\r']));
        }
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> SseReader {
        SseReader::new(Instant::now())
    }

    fn text_event(text: &str) -> String {
        format!(
            r#"data: {{"candidates":[{{"content":{{"parts":[{{"text":"{text}"}}]}}}}]}}"#
        )
    }

    #[test]
    fn test_empty_stream_is_degenerate_not_error() {
        let outcome = reader().finish();
        assert!(outcome.first_event.is_none());
        assert!(outcome.first_text.is_none());
        assert_eq!(outcome.text, "");
        assert_eq!(outcome.event_count, 0);
    }

    #[test]
    fn test_undecodable_lines_yield_degenerate_outcome() {
        let mut r = reader();
        r.push_line("data: {not json");
        r.push_line("data: ");
        r.push_line(": keepalive comment");
        r.push_line("event: message");
        let outcome = r.finish();

        assert!(outcome.first_event.is_none());
        assert!(outcome.first_text.is_none());
        assert_eq!(outcome.text, "");
        assert_eq!(outcome.event_count, 0);
    }

    #[test]
    fn test_accumulates_text_across_events() {
        let mut r = reader();
        r.push_line(&text_event("Hello, "));
        r.push_line(&text_event("world!"));
        let outcome = r.finish();

        assert_eq!(outcome.text, "Hello, world!");
        assert_eq!(outcome.event_count, 2);
        assert!(outcome.first_text.is_some());
    }

    #[test]
    fn test_first_text_not_before_first_event() {
        let mut r = reader();
        // First event decodes but carries no text.
        r.push_line(r#"data: {"candidates":[]}"#);
        r.push_line(&text_event("hi"));
        let outcome = r.finish();

        let first_event = outcome.first_event.expect("event recorded");
        let first_text = outcome.first_text.expect("text recorded");
        assert!(first_text >= first_event);
    }

    #[test]
    fn test_textless_event_sets_only_first_event() {
        let mut r = reader();
        r.push_line(r#"data: {"candidates":[{"content":{"parts":[]}}]}"#);
        let outcome = r.finish();

        assert!(outcome.first_event.is_some());
        assert!(outcome.first_text.is_none());
        assert_eq!(outcome.event_count, 1);
    }

    #[test]
    fn test_malformed_event_is_skipped_not_fatal() {
        let mut r = reader();
        r.push_line("data: {\"candidates\":[{\"content\"");
        r.push_line(&text_event("ok"));
        let outcome = r.finish();

        assert_eq!(outcome.text, "ok");
        assert_eq!(outcome.event_count, 1);
    }

    #[test]
    fn test_thought_parts_are_filtered() {
        let mut r = reader();
        r.push_line(
            r#"data: {"candidates":[{"content":{"parts":[{"text":"pondering...","thought":true}]}}]}"#,
        );
        let after_thought = r.outcome.clone();
        r.push_line(&text_event("answer"));
        let outcome = r.finish();

        // The thought event decoded (first_event set) but produced no text.
        assert!(after_thought.first_event.is_some());
        assert!(after_thought.first_text.is_none());
        assert_eq!(outcome.text, "answer");
        assert_eq!(outcome.token_estimate, 1);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let event = text_event("split");
        let (head, tail) = event.split_at(10);

        let mut r = reader();
        r.push_chunk(head.as_bytes());
        r.push_chunk(tail.as_bytes());
        r.push_chunk(b"\n");
        let outcome = r.finish();

        assert_eq!(outcome.text, "split");
        assert_eq!(outcome.event_count, 1);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut r = reader();
        let body = format!("{}\r\n\r\n{}\r\n", text_event("a"), text_event("b"));
        r.push_chunk(body.as_bytes());
        let outcome = r.finish();

        assert_eq!(outcome.text, "ab");
        assert_eq!(outcome.event_count, 2);
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let mut r = reader();
        r.push_chunk(text_event("tail").as_bytes());
        let outcome = r.finish();

        assert_eq!(outcome.text, "tail");
    }

    #[test]
    fn test_token_estimate_accumulates_per_fragment() {
        let mut r = reader();
        r.push_line(&text_event("one two "));
        r.push_line(&text_event("three"));
        let outcome = r.finish();

        assert_eq!(outcome.token_estimate, 3);
    }
}
