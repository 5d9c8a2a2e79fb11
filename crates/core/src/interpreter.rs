//! Maps raw frames onto typed domain events.
//!
//! A single bad frame never ends a stream: anything that cannot be decoded comes
//! back as [`Interpretation::Skipped`] and is reported through `tracing` only.

use crate::{
    dialect::{Dialect, LEGACY_SENTINEL_CONTENT, LEGACY_SENTINEL_ROLE},
    event::{DomainEvent, LegacyMessage, MessageRole, ProgressEvent, ProgressKind, ToolCall},
    frame::RawFrame,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Why a frame was dropped instead of producing an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("data payload is empty")]
    EmptyPayload,
    #[error("payload is not a valid event: {0}")]
    Malformed(String),
    #[error("unexpected message role '{0}'")]
    UnexpectedRole(String),
}

/// The outcome of interpreting one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// A domain event to hand to the caller.
    Event(DomainEvent),
    /// The in-band termination sentinel; never forwarded as an event.
    EndOfStream,
    /// The frame was dropped; the stream carries on.
    Skipped(FrameError),
}

/// `toolCalls` as it appears on the wire: either JSON text or an already-decoded list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireToolCalls {
    Encoded(String),
    Decoded(Vec<ToolCall>),
    Unrecognised(Value),
}

impl WireToolCalls {
    fn into_calls(self) -> Vec<ToolCall> {
        match self {
            WireToolCalls::Encoded(text) => {
                serde_json::from_str(&text).unwrap_or_else(|e| {
                    warn!(error = %e, "Could not decode encoded toolCalls; using an empty list");
                    Vec::new()
                })
            }
            WireToolCalls::Decoded(calls) => calls,
            WireToolCalls::Unrecognised(value) => {
                warn!(%value, "toolCalls has an unexpected shape; using an empty list");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireLegacyMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(rename = "toolCalls", default)]
    tool_calls: Option<WireToolCalls>,
}

/// Stateful interpreter for one stream; counts what it has seen for diagnostics.
#[derive(Debug, Clone)]
pub struct EventInterpreter {
    dialect: Dialect,
    interpreted: u64,
    skipped: u64,
}

impl EventInterpreter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            interpreted: 0,
            skipped: 0,
        }
    }

    /// Number of frames that produced an event or the sentinel.
    pub fn interpreted(&self) -> u64 {
        self.interpreted
    }

    /// Number of frames dropped as undecodable.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn interpret(&mut self, frame: &RawFrame) -> Interpretation {
        let event_name = frame.event_name_or(self.dialect.implicit_event_name());
        let payload = frame.data.trim();

        let outcome = if payload.is_empty() {
            Interpretation::Skipped(FrameError::EmptyPayload)
        } else {
            match self.dialect {
                Dialect::Legacy => interpret_legacy(payload),
                Dialect::Typed => interpret_typed(payload),
            }
        };

        match &outcome {
            Interpretation::Skipped(FrameError::EmptyPayload) => {
                self.skipped += 1;
                debug!(event_name, "Skipping frame with empty payload");
            }
            Interpretation::Skipped(reason) => {
                self.skipped += 1;
                warn!(event_name, %reason, payload, "Dropping undecodable frame");
            }
            _ => self.interpreted += 1,
        }
        outcome
    }
}

fn interpret_legacy(payload: &str) -> Interpretation {
    let wire: WireLegacyMessage = match serde_json::from_str(payload) {
        Ok(wire) => wire,
        Err(e) => return Interpretation::Skipped(FrameError::Malformed(e.to_string())),
    };
    let content = wire.content.unwrap_or_default();

    if wire.role == LEGACY_SENTINEL_ROLE && content == LEGACY_SENTINEL_CONTENT {
        return Interpretation::EndOfStream;
    }

    let role = match wire.role.as_str() {
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        other => return Interpretation::Skipped(FrameError::UnexpectedRole(other.to_string())),
    };
    let tool_calls = wire
        .tool_calls
        .map(WireToolCalls::into_calls)
        .unwrap_or_default();

    Interpretation::Event(DomainEvent::Message(LegacyMessage {
        role,
        content,
        tool_calls,
    }))
}

fn interpret_typed(payload: &str) -> Interpretation {
    match serde_json::from_str::<ProgressEvent>(payload) {
        Ok(event) if event.kind == ProgressKind::StreamEnd => Interpretation::EndOfStream,
        Ok(event) => Interpretation::Event(DomainEvent::Progress(event)),
        Err(e) => Interpretation::Skipped(FrameError::Malformed(e.to_string())),
    }
}
