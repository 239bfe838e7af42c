//! Progress stream shaping for SSE clients
//!
//! Wraps the raw event channel of a download task so that clients see
//! non-decreasing percentages, at most one `processing` event, `waiting`
//! heartbeats while idle, and exactly one terminal event.

use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::models::progress::ProgressEvent;

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub struct AbortOnDrop(pub JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Idle time before a `waiting` heartbeat is emitted
    pub heartbeat: Duration,

    /// Total lifetime of one stream
    pub timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_millis(500),
            timeout: Duration::from_secs(600),
        }
    }
}

struct StreamState {
    events: mpsc::Receiver<ProgressEvent>,
    deadline: Instant,
    heartbeat: Duration,
    last_percent: f64,
    processing_sent: bool,
    finished: bool,
    _task: Option<AbortOnDrop>,
}

/// Shape raw download events into the stream sent to one client.
///
/// `task` is aborted when the stream is dropped, e.g. on client disconnect.
pub fn progress_stream(
    events: mpsc::Receiver<ProgressEvent>,
    task: Option<AbortOnDrop>,
    options: StreamOptions,
) -> impl Stream<Item = ProgressEvent> + Send + 'static {
    let state = StreamState {
        events,
        deadline: Instant::now() + options.timeout,
        heartbeat: options.heartbeat,
        last_percent: 0.0,
        processing_sent: false,
        finished: false,
        _task: task,
    };

    stream::unfold(state, |mut state| async move {
        let event = next_event(&mut state).await?;
        Some((event, state))
    })
}

async fn next_event(state: &mut StreamState) -> Option<ProgressEvent> {
    if state.finished {
        return None;
    }

    loop {
        let remaining = state.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            state.finished = true;
            return Some(ProgressEvent::error("Download timed out"));
        }

        let event = match timeout(remaining.min(state.heartbeat), state.events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                state.finished = true;
                return Some(ProgressEvent::error("Download ended unexpectedly"));
            }
            Err(_) if Instant::now() >= state.deadline => continue,
            Err(_) => return Some(ProgressEvent::Waiting),
        };

        match event {
            ProgressEvent::Downloading {
                percent,
                downloaded,
                total,
                speed,
                eta,
            } => {
                // Post-processing has started; late download lines are noise.
                if state.processing_sent {
                    continue;
                }
                state.last_percent = state.last_percent.max(percent);
                return Some(ProgressEvent::Downloading {
                    percent: state.last_percent,
                    downloaded,
                    total,
                    speed,
                    eta,
                });
            }
            ProgressEvent::Processing { .. } if state.processing_sent => continue,
            ProgressEvent::Processing { .. } => {
                state.processing_sent = true;
                return Some(event);
            }
            ProgressEvent::Waiting | ProgressEvent::Complete { .. } | ProgressEvent::Error { .. } => {
                state.finished = event.is_terminal();
                return Some(event);
            }
        }
    }
}
