//! Stream lifecycle management
//!
//! Composes upstream reader, pipeline, encoder, heartbeat and fallback for one
//! client connection and guarantees teardown on every exit path.
//!
//! States: `Init -> Open -> Draining -> Closed`.

mod cancellation;
mod state;

pub use cancellation::SessionCancellation;
pub use state::{SessionState, StreamSession};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::encode::SseEncoder;
use crate::error::BridgeError;
use crate::fallback::{FallbackController, SyncCall};
use crate::heartbeat::HeartbeatScheduler;
use crate::normalize::{HeartbeatKind, NormalizedEvent};
use crate::pipeline::EventPipeline;
use crate::sink::FrameSink;
use crate::upstream::{RequestDescriptor, UpstreamReader};

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Upstream finished (fallback included, if any)
    Completed,
    /// Upstream broke mid-stream; an error frame was attempted
    UpstreamFailed(String),
    /// The client dropped the connection
    ClientDisconnected,
    /// Aborted through the session's cancellation handle
    Cancelled,
}

/// Summary returned when a session task finishes
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: Uuid,
    pub outcome: SessionOutcome,
    pub state: SessionState,
    pub saw_data: bool,
    pub frames_sent: usize,
    /// Whether the upstream reader was released on teardown
    pub reader_released: bool,
}

/// Per-session options
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub heartbeat: HeartbeatScheduler,
    /// Write `: connected` when the session opens
    pub announce_connection: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatScheduler::default(),
            announce_connection: true,
        }
    }
}

/// Owns and drives one stream session
pub struct StreamLifecycleManager {
    session: StreamSession,
    pipeline: Box<dyn EventPipeline>,
    sink: FrameSink,
    options: SessionOptions,
    fallback: Option<Arc<dyn SyncCall>>,
    controller: FallbackController,
    cancellation: SessionCancellation,
}

impl StreamLifecycleManager {
    pub fn new(
        descriptor: RequestDescriptor,
        reader: Box<dyn UpstreamReader>,
        pipeline: Box<dyn EventPipeline>,
        sink: FrameSink,
        options: SessionOptions,
    ) -> Self {
        Self {
            session: StreamSession::new(descriptor, reader),
            pipeline,
            sink,
            options,
            fallback: None,
            controller: FallbackController::new(),
            cancellation: SessionCancellation::new(),
        }
    }

    /// Replay the request synchronously if the stream ends without data
    pub fn with_fallback(mut self, call: Arc<dyn SyncCall>) -> Self {
        self.fallback = Some(call);
        self
    }

    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Handle for aborting the session from outside
    pub fn cancellation(&self) -> SessionCancellation {
        self.cancellation.clone()
    }

    /// Run the session on its own task
    pub fn spawn(self) -> JoinHandle<SessionReport> {
        tokio::spawn(self.run())
    }

    /// Drive the session to completion and tear it down
    pub async fn run(mut self) -> SessionReport {
        let outcome = match self.open().await {
            Ok(()) => self.pump_to_end().await,
            Err(e) => Self::outcome_for(e),
        };

        self.close().await;

        info!(
            "Session {} closed after {:?}: {:?} ({} frames, saw_data={})",
            self.session.id,
            self.session.elapsed(),
            outcome,
            self.session.frames_sent,
            self.session.saw_data
        );

        SessionReport {
            id: self.session.id,
            outcome,
            state: self.session.state,
            saw_data: self.session.saw_data,
            frames_sent: self.session.frames_sent,
            reader_released: !self.session.holds_reader(),
        }
    }

    /// INIT -> OPEN: start the heartbeat and announce the connection
    async fn open(&mut self) -> Result<(), BridgeError> {
        if self.session.state != SessionState::Init {
            return Ok(());
        }

        info!(
            "Session {} opening upstream {}",
            self.session.id, self.session.descriptor.endpoint
        );
        self.session.state = SessionState::Open;
        self.session.heartbeat = Some(
            self.options
                .heartbeat
                .start(self.sink.clone(), self.cancellation.token()),
        );

        if self.options.announce_connection {
            let frame = SseEncoder::encode(&NormalizedEvent::Heartbeat {
                kind: HeartbeatKind::Connected,
            });
            self.write(frame).await?;
        }
        Ok(())
    }

    /// Run the pump and turn its result into an outcome, reporting mid-stream
    /// upstream failures in-band
    async fn pump_to_end(&mut self) -> SessionOutcome {
        match self.pump().await {
            Ok(()) => SessionOutcome::Completed,
            Err(e) if e.is_disconnect() => Self::outcome_for(e),
            Err(e) => {
                let message = e.to_string();
                warn!("Session {} upstream failed: {}", self.session.id, message);
                self.report_error(&message).await;
                SessionOutcome::UpstreamFailed(message)
            }
        }
    }

    async fn pump(&mut self) -> Result<(), BridgeError> {
        loop {
            let Some(reader) = self.session.reader.as_mut() else {
                break;
            };

            let next = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Err(BridgeError::Cancelled),
                _ = self.sink.closed() => return Err(BridgeError::ChannelClosed),
                next = reader.next_chunk() => next?,
            };

            match next {
                Some(chunk) => {
                    debug!(
                        "Session {} upstream chunk: {} bytes",
                        self.session.id,
                        chunk.len()
                    );
                    for event in self.pipeline.push_chunk(&chunk) {
                        self.emit(event).await?;
                    }
                }
                None => break,
            }
        }

        debug!("Session {} upstream ended", self.session.id);
        for event in self.pipeline.finish() {
            self.emit(event).await?;
        }

        if let Some(call) = self.fallback.clone() {
            let fallback = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Err(BridgeError::Cancelled),
                _ = self.sink.closed() => return Err(BridgeError::ChannelClosed),
                event = self.controller.on_upstream_end(self.session.saw_data, call.as_ref()) => event,
            };
            if let Some(event) = fallback {
                // Nothing may follow the fallback frame
                self.stop_heartbeat().await;
                self.emit(event).await?;
            }
        }

        Ok(())
    }

    async fn emit(&mut self, event: NormalizedEvent) -> Result<(), BridgeError> {
        if event.is_data() {
            self.session.saw_data = true;
        }
        self.write(SseEncoder::encode(&event)).await?;
        self.session.frames_sent += 1;
        Ok(())
    }

    async fn write(&mut self, frame: bytes::Bytes) -> Result<(), BridgeError> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(BridgeError::Cancelled),
            sent = self.sink.send(frame) => sent,
        }
    }

    /// Best-effort error frame; ignored if the client is already gone
    async fn report_error(&mut self, message: &str) {
        if self.sink.is_closed() {
            return;
        }
        let event = NormalizedEvent::Error {
            message: message.to_string(),
        };
        if self.emit(event).await.is_err() {
            debug!("Session {} could not deliver error frame", self.session.id);
        }
    }

    async fn stop_heartbeat(&mut self) {
        if let Some(mut heartbeat) = self.session.heartbeat.take() {
            heartbeat.shutdown().await;
        }
    }

    fn outcome_for(error: BridgeError) -> SessionOutcome {
        match error {
            BridgeError::ChannelClosed => SessionOutcome::ClientDisconnected,
            BridgeError::Cancelled => SessionOutcome::Cancelled,
            other => SessionOutcome::UpstreamFailed(other.to_string()),
        }
    }

    /// Tear the session down: stop the heartbeat, release the upstream
    /// reader, cancel child work. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if self.session.state == SessionState::Closed {
            return;
        }

        self.session.state = SessionState::Draining;
        self.stop_heartbeat().await;
        if let Some(mut reader) = self.session.reader.take() {
            reader.release();
        }
        self.cancellation.cancel();
        self.session.state = SessionState::Closed;
        debug!("Session {} torn down", self.session.id);
    }
}
