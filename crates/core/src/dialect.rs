/// The payload dialects spoken by the streaming endpoints.
///
/// Both dialects share the same line framing; they differ in how a `data` payload
/// is shaped and in how the server signals that the stream is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `{role, content, toolCalls}` chat messages, terminated in-band by a
    /// `system` message whose content is [`LEGACY_SENTINEL_CONTENT`].
    Legacy,
    /// `{type, ...}` agent progress events, terminated in-band by `type = STREAM_END`.
    Typed,
}

/// Role carried by the legacy termination sentinel.
pub const LEGACY_SENTINEL_ROLE: &str = "system";
/// Content carried by the legacy termination sentinel.
pub const LEGACY_SENTINEL_CONTENT: &str = "[STREAM_END]";

impl Dialect {
    /// Event name assumed for frames that arrive without a preceding `event:` line.
    pub fn implicit_event_name(self) -> &'static str {
        match self {
            Dialect::Legacy => "message",
            Dialect::Typed => "agent-event",
        }
    }
}
