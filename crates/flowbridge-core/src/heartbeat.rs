//! Periodic keep-alive comments
//!
//! Stops proxies from timing out a connection while the upstream is quiet.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::encode::SseEncoder;
use crate::normalize::{HeartbeatKind, NormalizedEvent};
use crate::sink::FrameSink;

/// Default keep-alive period
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(15_000);

/// Starts one heartbeat task per session
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatScheduler {
    interval: Duration,
}

impl Default for HeartbeatScheduler {
    fn default() -> Self {
        Self::new(HEARTBEAT_INTERVAL)
    }
}

impl HeartbeatScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the heartbeat task. The first frame goes out one interval from now.
    ///
    /// `parent` cancels the heartbeat along with the rest of the session.
    pub fn start(&self, sink: FrameSink, parent: &CancellationToken) -> HeartbeatHandle {
        let token = parent.child_token();
        let task = tokio::spawn(run_heartbeat(self.interval, sink, token.clone()));
        HeartbeatHandle {
            token,
            task: Some(task),
        }
    }
}

async fn run_heartbeat(period: Duration, sink: FrameSink, token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let frame = SseEncoder::encode(&NormalizedEvent::Heartbeat {
        kind: HeartbeatKind::Tick,
    });

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            sent = sink.send(frame.clone()) => sent,
        };

        // A failed write means the client is gone
        if sent.is_err() {
            debug!("Heartbeat write failed, cancelling heartbeat");
            token.cancel();
            break;
        }
    }
}

/// Handle to a running heartbeat
pub struct HeartbeatHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// Stop the heartbeat. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the task to exit, after which no heartbeat can be
    /// written
    pub async fn shutdown(&mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
