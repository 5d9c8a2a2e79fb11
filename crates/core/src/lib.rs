//! Agent Flow Stream Core
//!
//! This crate holds the I/O-free half of the streaming client: turning raw bytes
//! from a server-push response into frames, and frames into typed domain events.
//! Nothing in here touches the network, so every piece can be driven directly
//! from tests with hand-made byte chunks.

pub mod dialect;
pub mod event;
pub mod frame;
pub mod interpreter;

pub use dialect::Dialect;
pub use event::{DomainEvent, LegacyMessage, MessageRole, ProgressEvent, ProgressKind, ToolCall};
pub use frame::{FrameDecoder, RawFrame};
pub use interpreter::{EventInterpreter, FrameError, Interpretation};
