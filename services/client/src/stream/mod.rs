//! Server-push streams from the agent endpoints.

pub mod endpoint;
pub mod session;

pub use endpoint::{StreamEndpoint, StreamQuery};
pub use session::{
    ChannelObserver, SessionState, SessionUpdate, StreamError, StreamHandle, StreamObserver,
    StreamSession,
};
