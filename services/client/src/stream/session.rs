//! Stream Session
//!
//! Drives one server-push response from open to a terminal state. Chunks flow
//! through a [`FrameDecoder`] and an [`EventInterpreter`]; every domain event is
//! handed to the [`StreamObserver`] in decode order.
//!
//! Outcomes reach the observer at most once:
//! - the in-band sentinel or a clean end of the body calls `on_complete`.
//! - a transport failure calls `on_error` and the session ends `Failed`.
//! - cancellation calls neither, and whatever error it provokes is swallowed.
//!
//! The access credential is captured when the session opens. A session never
//! renews it; a rejected credential shows up as `StreamError::Status(401)`.

use super::endpoint::{StreamEndpoint, StreamQuery};
use crate::transport::{ByteStream, HttpTransport, TransportError};
use agentflow_core::{DomainEvent, EventInterpreter, FrameDecoder, Interpretation};
use futures::StreamExt;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// Session-level failures. Frame-level problems never end up here.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("response body is null")]
    MissingBody,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Receives the output of a stream session.
pub trait StreamObserver: Send + 'static {
    fn on_event(&mut self, event: DomainEvent);
    fn on_error(&mut self, error: StreamError);
    fn on_complete(&mut self);
}

/// One observer callback, as sent by [`ChannelObserver`].
#[derive(Debug)]
pub enum SessionUpdate {
    Event(DomainEvent),
    Error(StreamError),
    Complete,
}

/// Forwards every callback into an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, update: SessionUpdate) {
        if self.tx.send(update).is_err() {
            trace!("Session update dropped, receiver is gone");
        }
    }
}

impl StreamObserver for ChannelObserver {
    fn on_event(&mut self, event: DomainEvent) {
        self.forward(SessionUpdate::Event(event));
    }

    fn on_error(&mut self, error: StreamError) {
        self.forward(SessionUpdate::Error(error));
    }

    fn on_complete(&mut self) {
        self.forward(SessionUpdate::Complete);
    }
}

/// Caller's side of a running session.
pub struct StreamHandle {
    token: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Stops the session. No further callbacks are made once the driver sees it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Waits for the driver to stop and returns the terminal state.
    pub async fn finished(self) -> SessionState {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Stream session task did not finish cleanly");
        }
        *self.state.borrow()
    }
}

pub struct StreamSession;

impl StreamSession {
    /// Opens `endpoint` and drives it on a spawned task.
    ///
    /// `credential` is sent as the bearer if present and is not refreshed later.
    pub fn open<O: StreamObserver>(
        transport: Arc<dyn HttpTransport>,
        endpoint: StreamEndpoint,
        query: StreamQuery,
        credential: Option<String>,
        observer: O,
    ) -> StreamHandle {
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Opening);
        let driver = Driver {
            endpoint,
            observer,
            state: state_tx,
            token: token.clone(),
        };
        let span = info_span!("stream_session", endpoint = endpoint.name);
        let task = tokio::spawn(driver.run(transport, query, credential).instrument(span));
        StreamHandle {
            token,
            state: state_rx,
            task,
        }
    }
}

struct Driver<O> {
    endpoint: StreamEndpoint,
    observer: O,
    state: watch::Sender<SessionState>,
    token: CancellationToken,
}

impl<O: StreamObserver> Driver<O> {
    async fn run(
        self,
        transport: Arc<dyn HttpTransport>,
        query: StreamQuery,
        credential: Option<String>,
    ) {
        info!(path = self.endpoint.path, authenticated = credential.is_some(), "Opening stream");

        let token = self.token.clone();
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return self.cancelled(),
            opened = transport.open_stream(self.endpoint.path, query.pairs(), credential) => opened,
        };
        let body = match opened {
            Ok(response) if !(200..300).contains(&response.status) => {
                return self.fail(StreamError::Status(response.status));
            }
            Ok(response) => match response.body {
                Some(body) => body,
                None => return self.fail(StreamError::MissingBody),
            },
            Err(e) => return self.fail_or_cancel(e),
        };

        self.set_state(SessionState::Streaming);
        self.pump(body).await;
    }

    async fn pump(mut self, mut body: ByteStream) {
        let mut decoder = FrameDecoder::new();
        let mut interpreter = EventInterpreter::new(self.endpoint.dialect);
        let token = self.token.clone();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return self.cancelled(),
                next = body.next() => next,
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return self.fail_or_cancel(e),
                None => {
                    debug!(
                        pending = decoder.pending(),
                        "Stream closed without end marker"
                    );
                    return self.complete(&interpreter);
                }
            };

            trace!(bytes = chunk.len(), "Chunk received");
            let frames = decoder.feed(&chunk);
            if self.token.is_cancelled() {
                return self.cancelled();
            }

            for frame in frames {
                if !self.endpoint.expects_event(frame.event_name.as_deref()) {
                    debug!(
                        event_name = frame.event_name.as_deref(),
                        expected = self.endpoint.event_name,
                        "Frame labelled for another stream"
                    );
                }
                match interpreter.interpret(&frame) {
                    Interpretation::Event(event) => self.observer.on_event(event),
                    // Anything after the marker, even in this same chunk, is ignored.
                    Interpretation::EndOfStream => return self.complete(&interpreter),
                    Interpretation::Skipped(_) => {}
                }
                if self.token.is_cancelled() {
                    return self.cancelled();
                }
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn complete(mut self, interpreter: &EventInterpreter) {
        info!(
            events = interpreter.interpreted(),
            skipped = interpreter.skipped(),
            "Stream completed"
        );
        self.set_state(SessionState::Completed);
        self.observer.on_complete();
    }

    fn cancelled(self) {
        info!("Stream cancelled");
        self.set_state(SessionState::Cancelled);
    }

    fn fail(mut self, error: StreamError) {
        warn!(error = %error, "Stream failed");
        self.set_state(SessionState::Failed);
        self.observer.on_error(error);
    }

    fn fail_or_cancel(self, error: TransportError) {
        if self.token.is_cancelled() {
            debug!(error = %error, "Suppressing transport error after cancellation");
            self.cancelled();
        } else {
            self.fail(error.into());
        }
    }
}
