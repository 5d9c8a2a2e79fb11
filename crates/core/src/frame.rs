//! Incremental line framing for server-push event streams.
//!
//! The decoder accepts byte chunks with arbitrary boundaries. Complete lines are
//! classified as they appear; a trailing partial line stays buffered until the
//! chunk that finishes it arrives. Splitting on raw `\n` bytes before decoding
//! means a multi-byte UTF-8 character cut across two chunks is reassembled
//! before it is ever turned into text.

use tracing::trace;

/// Prefix of a line that names the event for the data lines that follow it.
pub const EVENT_PREFIX: &str = "event:";
/// Prefix of a line that carries one event payload.
pub const DATA_PREFIX: &str = "data:";

/// One undecoded `(event name, payload)` unit taken from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// The most recent `event:` name seen on the stream, if any.
    pub event_name: Option<String>,
    /// The data line with its prefix and a single separating space removed.
    pub data: String,
}

impl RawFrame {
    /// Returns the frame's event name, falling back to `implicit` for unlabeled frames.
    pub fn event_name_or<'a>(&'a self, implicit: &'a str) -> &'a str {
        self.event_name.as_deref().unwrap_or(implicit)
    }
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    current_event: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` to the internal buffer and returns every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            consumed = end + 1;
            if let Some(frame) = self.classify(&line) {
                frames.push(frame);
            }
        }
        self.buffer.drain(..consumed);
        frames
    }

    /// Number of bytes held back because they do not yet form a complete line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn classify(&mut self, line: &str) -> Option<RawFrame> {
        let line = line.strip_suffix('\r').unwrap_or(line).trim_start();

        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            self.current_event = Some(name.trim().to_string());
            return None;
        }

        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            let payload = rest.strip_prefix(' ').unwrap_or(rest);
            return Some(RawFrame {
                event_name: self.current_event.clone(),
                data: payload.to_string(),
            });
        }

        if !line.is_empty() {
            trace!(line, "Ignoring unrecognised stream line");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<RawFrame> {
        let mut decoder = FrameDecoder::new();
        chunks.iter().flat_map(|c| decoder.feed(c)).collect()
    }

    #[test]
    fn test_data_prefix_with_and_without_space() {
        let frames = decode_all(&[b"data: {\"a\":1}\ndata:{\"b\":2}\n"]);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "{\"a\":1}");
        assert_eq!(frames[1].data, "{\"b\":2}");
        assert_eq!(frames[0].event_name, None);
    }

    #[test]
    fn test_only_one_separator_space_is_stripped() {
        let frames = decode_all(&[b"data:  padded\n"]);
        assert_eq!(frames[0].data, " padded");
    }

    #[test]
    fn test_event_name_applies_to_following_data_lines() {
        let frames = decode_all(&[b"event: react-agent\ndata: one\n\ndata: two\nevent:other\ndata: three\n"]);

        let names: Vec<_> = frames.iter().map(|f| f.event_name.as_deref()).collect();
        assert_eq!(
            names,
            vec![Some("react-agent"), Some("react-agent"), Some("other")]
        );
    }

    #[test]
    fn test_partial_line_is_retained_across_chunks() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.feed(b"data: {\"con").is_empty());
        assert_eq!(decoder.pending(), 11);

        let frames = decoder.feed(b"tent\":\"x\"}\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"content\":\"x\"}");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_unterminated_trailing_line_is_never_emitted() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: complete\ndata: incomplete");

        assert_eq!(frames.len(), 1);
        assert_eq!(decoder.pending(), "data: incomplete".len());
    }

    #[test]
    fn test_unknown_fields_and_blank_lines_are_ignored() {
        let frames = decode_all(&[b"id: 7\nretry: 1000\n: comment\n\n\ndata: x\n"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_indented_lines_are_still_recognised() {
        let frames = decode_all(&[b"  event: react-agent\n\tdata: {\"a\":1}\n   data:x\n"]);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_name.as_deref(), Some("react-agent"));
        assert_eq!(frames[0].data, "{\"a\":1}");
        assert_eq!(frames[1].data, "x");
    }

    #[test]
    fn test_crlf_line_endings() {
        let frames = decode_all(&[b"event: plan-execute\r\ndata: x\r\n"]);
        assert_eq!(frames[0].event_name.as_deref(), Some("plan-execute"));
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "data: {\"content\":\"你好\"}\n".as_bytes();
        // Split inside the first three-byte character.
        let split = text.iter().position(|b| *b >= 0x80).unwrap() + 1;

        let frames = decode_all(&[&text[..split], &text[split..]]);
        assert_eq!(frames[0].data, "{\"content\":\"你好\"}");
    }

    #[test]
    fn test_one_byte_chunks_match_single_chunk() {
        let input = b"event: react-agent\ndata: {\"type\":\"NODE_OUTPUT\"}\n\ndata:{\"type\":\"STREAM_END\"}\n";

        let whole = decode_all(&[input]);
        let bytewise: Vec<&[u8]> = input.chunks(1).collect();

        assert_eq!(decode_all(&bytewise), whole);
        assert_eq!(whole.len(), 2);
    }

    #[test]
    fn test_event_name_or_falls_back() {
        let frame = RawFrame {
            event_name: None,
            data: String::new(),
        };
        assert_eq!(frame.event_name_or("message"), "message");
    }
}
