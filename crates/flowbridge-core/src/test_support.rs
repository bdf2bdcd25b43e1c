//! Scripted upstreams and fake backends for tests

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::backends::{ChatBackend, OpenedUpstream, PullBackend};
use crate::bridge::AgentRequest;
use crate::error::BridgeError;
use crate::fallback::SyncCall;
use crate::upstream::{RequestDescriptor, UpstreamReader};

/// One scripted upstream action
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(Bytes),
    Delay(Duration),
    Fail(u16, String),
    /// Never yields again
    Hang,
}

pub fn chunk(text: &str) -> Step {
    Step::Chunk(Bytes::copy_from_slice(text.as_bytes()))
}

/// Upstream reader replaying a fixed script
pub struct ScriptedReader {
    steps: VecDeque<Step>,
    released: Arc<AtomicBool>,
}

impl ScriptedReader {
    pub fn new(steps: Vec<Step>) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (Self::with_flag(steps, released.clone()), released)
    }

    pub fn with_flag(steps: Vec<Step>, released: Arc<AtomicBool>) -> Self {
        Self {
            steps: steps.into(),
            released,
        }
    }
}

#[async_trait]
impl UpstreamReader for ScriptedReader {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, BridgeError> {
        loop {
            match self.steps.pop_front() {
                None => return Ok(None),
                Some(Step::Chunk(bytes)) => return Ok(Some(bytes)),
                Some(Step::Delay(duration)) => tokio::time::sleep(duration).await,
                Some(Step::Fail(status, body)) => {
                    return Err(BridgeError::UpstreamConnection { status, body })
                }
                Some(Step::Hang) => futures::future::pending::<()>().await,
            }
        }
    }

    fn release(&mut self) {
        self.steps.clear();
        self.released.store(true, Ordering::SeqCst);
    }
}

pub fn descriptor() -> RequestDescriptor {
    RequestDescriptor::post("http://upstream.test/stream", serde_json::json!({}))
}

/// Synchronous call with a canned result
pub struct FakeCall {
    result: Result<String, String>,
    calls: AtomicUsize,
}

impl FakeCall {
    pub fn ok(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn err(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncCall for FakeCall {
    async fn call(&self) -> Result<String, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(BridgeError::Fallback)
    }
}

/// Chat backend with a scripted stream and canned synchronous answer
pub struct FakeChat {
    pub steps: Vec<Step>,
    pub open_error: Option<(u16, String)>,
    pub answer: Result<String, String>,
    pub released: Arc<AtomicBool>,
    pub opened: AtomicUsize,
    pub generated: AtomicUsize,
}

impl FakeChat {
    pub fn new(steps: Vec<Step>, answer: Result<&str, &str>) -> Self {
        Self {
            steps,
            open_error: None,
            answer: answer.map(str::to_string).map_err(str::to_string),
            released: Arc::new(AtomicBool::new(false)),
            opened: AtomicUsize::new(0),
            generated: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn open_stream(&self, _request: &AgentRequest) -> Result<OpenedUpstream, BridgeError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some((status, body)) = &self.open_error {
            return Err(BridgeError::UpstreamConnection {
                status: *status,
                body: body.clone(),
            });
        }
        Ok(OpenedUpstream {
            descriptor: descriptor(),
            reader: Box::new(ScriptedReader::with_flag(
                self.steps.clone(),
                self.released.clone(),
            )),
        })
    }

    async fn generate(&self, _request: &AgentRequest) -> Result<String, BridgeError> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(BridgeError::Fallback)
    }
}

/// Pull backend with a scripted feed, recording what was requested
pub struct FakePull {
    pub steps: Vec<Step>,
    pub requests: Mutex<Vec<(String, String)>>,
}

impl FakePull {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PullBackend for FakePull {
    async fn open_pull(&self, model: &str, base_url: &str) -> Result<OpenedUpstream, BridgeError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((model.to_string(), base_url.to_string()));
        }
        let (reader, _) = ScriptedReader::new(self.steps.clone());
        Ok(OpenedUpstream {
            descriptor: descriptor(),
            reader: Box::new(reader),
        })
    }
}

/// Read frames until the session drops its sink
pub async fn collect_frames(rx: &mut mpsc::Receiver<Bytes>) -> Vec<String> {
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(String::from_utf8_lossy(&frame).into_owned());
    }
    frames
}
