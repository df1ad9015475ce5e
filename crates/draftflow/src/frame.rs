//! Line framing for the producer's `data: <json>` stream.
//!
//! Network chunks do not respect line boundaries, so the parser keeps the
//! trailing partial line between calls and only decodes lines once their
//! terminating `\n` has arrived. Buffering happens on bytes, which keeps
//! multi-byte UTF-8 sequences intact when a chunk boundary splits them.

use tracing::{trace, warn};

const DATA_MARKER: &str = "data:";

/// Default bound on the unterminated carry-over, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Incremental decoder turning raw chunks into parsed JSON payloads.
#[derive(Debug)]
pub struct FrameParser {
    buf: Vec<u8>,
    max_line: usize,
    /// Set after an oversized line was dropped; bytes are skipped until the
    /// next newline.
    discarding: bool,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::with_line_limit(DEFAULT_MAX_LINE_BYTES)
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser whose carry-over never holds more than `max_line` bytes. A
    /// line that outgrows it is dropped whole.
    pub fn with_line_limit(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line: max_line.max(1),
            discarding: false,
        }
    }

    /// Feeds a text chunk; see [`FrameParser::feed_bytes`].
    pub fn feed(&mut self, chunk: &str) -> Vec<serde_json::Value> {
        self.feed_bytes(chunk.as_bytes())
    }

    /// Appends `chunk` to the carry-over buffer and returns the payload of
    /// every complete `data:` line, in arrival order.
    ///
    /// Lines whose JSON fails to parse are dropped with a warning. The final
    /// segment after the last newline stays buffered for the next call.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        let mut chunk = chunk;
        if self.discarding {
            let Some(newline) = chunk.iter().position(|b| *b == b'\n') else {
                return frames;
            };
            self.discarding = false;
            chunk = &chunk[newline + 1..];
        }
        self.buf.extend_from_slice(chunk);
        let mut consumed = 0;
        while let Some(offset) = self.buf[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            if let Some(value) = parse_line(&self.buf[consumed..end]) {
                frames.push(value);
            }
            consumed = end + 1;
        }
        self.buf.drain(..consumed);
        if self.buf.len() > self.max_line {
            warn!(
                buffered = self.buf.len(),
                limit = self.max_line,
                "unterminated frame line over limit; dropping it"
            );
            self.buf = Vec::new();
            self.discarding = true;
        }
        frames
    }

    /// Flushes the carry-over as a final line. Used at end-of-data so a
    /// terminal frame sent without a trailing newline still counts.
    pub fn finish(&mut self) -> Option<serde_json::Value> {
        self.discarding = false;
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest)
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

fn parse_line(raw: &[u8]) -> Option<serde_json::Value> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches('\r');
    if line.trim().is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix(DATA_MARKER) else {
        trace!(line = %line, "ignoring non-data line");
        return None;
    };
    let payload = rest.strip_prefix(' ').unwrap_or(rest);
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, len = payload.len(), "dropping malformed frame line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCENARIO: &str = concat!(
        "data: {\"type\":\"chunk\",\"fullContent\":\"Hello\"}\n",
        "data: {\"type\":\"chunk\",\"fullContent\":\"Hello world\"}\n",
        "data: {\"type\":\"complete\",\"fullContent\":\"Hello world!\"}\n",
    );

    #[test]
    fn partial_line_is_held_until_newline() {
        let mut parser = FrameParser::new();
        assert!(parser.feed("data: {\"type\":\"chunk\",\"full").is_empty());
        assert!(parser.pending_len() > 0);
        let frames = parser.feed("Content\":\"hi\"}\n");
        assert_eq!(frames, vec![json!({"type":"chunk","fullContent":"hi"})]);
        assert_eq!(parser.pending_len(), 0);
    }

    #[test]
    fn framing_is_independent_of_split_points() {
        let whole = FrameParser::new().feed(SCENARIO);
        assert_eq!(whole.len(), 3);

        for split in 0..=SCENARIO.len() {
            let mut parser = FrameParser::new();
            let mut frames = parser.feed_bytes(&SCENARIO.as_bytes()[..split]);
            frames.extend(parser.feed_bytes(&SCENARIO.as_bytes()[split..]));
            assert_eq!(frames, whole, "split at byte {split}");
        }

        let mut parser = FrameParser::new();
        let mut frames = Vec::new();
        for byte in SCENARIO.as_bytes() {
            frames.extend(parser.feed_bytes(std::slice::from_ref(byte)));
        }
        assert_eq!(frames, whole);
    }

    #[test]
    fn multibyte_characters_survive_byte_splits() {
        let line = "data: {\"type\":\"chunk\",\"fullContent\":\"caf\u{e9} \u{1f600}\"}\n";
        let mut parser = FrameParser::new();
        let mut frames = Vec::new();
        for byte in line.as_bytes() {
            frames.extend(parser.feed_bytes(std::slice::from_ref(byte)));
        }
        assert_eq!(
            frames,
            vec![json!({"type":"chunk","fullContent":"caf\u{e9} \u{1f600}"})]
        );
    }

    #[test]
    fn skips_blank_comment_and_malformed_lines() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(concat!(
            "\n",
            ": keep-alive\n",
            "event: message\n",
            "data: {not json\n",
            "data: {\"type\":\"complete\",\"fullContent\":\"ok\"}\r\n",
        ));
        assert_eq!(frames, vec![json!({"type":"complete","fullContent":"ok"})]);
    }

    #[test]
    fn marker_space_is_optional() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("data:{\"type\":\"error\",\"message\":\"x\"}\n");
        assert_eq!(frames, vec![json!({"type":"error","message":"x"})]);
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut parser = FrameParser::new();
        assert!(
            parser
                .feed("data: {\"type\":\"complete\",\"fullContent\":\"end\"}")
                .is_empty()
        );
        assert_eq!(
            parser.finish(),
            Some(json!({"type":"complete","fullContent":"end"}))
        );
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn oversized_unterminated_line_is_dropped_whole() {
        let mut parser = FrameParser::with_line_limit(16);
        assert!(parser.feed("data: {\"type\":\"chunk\",").is_empty());
        assert_eq!(parser.pending_len(), 0);
        assert!(parser.feed("\"fullContent\":\"huge\"}").is_empty());
        assert_eq!(parser.pending_len(), 0);

        let frames = parser.feed("\ndata: {\"type\":\"complete\",\"fullContent\":\"ok\"}\n");
        assert_eq!(frames, vec![json!({"type":"complete","fullContent":"ok"})]);
    }

    #[test]
    fn finish_after_dropped_line_yields_nothing() {
        let mut parser = FrameParser::with_line_limit(8);
        assert!(parser.feed("data: {\"type\":\"complete\"").is_empty());
        assert_eq!(parser.finish(), None);
        let frames = parser.feed("data: {\"type\":\"error\",\"message\":\"x\"}\n");
        assert_eq!(frames, vec![json!({"type":"error","message":"x"})]);
    }
}
