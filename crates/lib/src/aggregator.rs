//! Aggregation windows: coalesce bursts of messages from the same sender into one dispatch.
//!
//! Each sender is either idle (no entry) or aggregating (one entry holding the buffered texts
//! and the handle of its timer task). The first message of a burst opens a window whose
//! deadline is fixed at `wait` after that message; later messages only append. When the
//! deadline elapses, the entry is removed in one step under the lock (snapshot, clear, drop
//! the handle) and the snapshot is handed to the `WindowSink` outside the lock.
//!
//! The lock guards only map lookups and pushes and is never held across an await, so senders
//! do not wait on each other's agent calls.

use crate::channels::{InboundMessage, SenderId};
use crate::dispatcher::DispatchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// What `enqueue` did with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    /// First message for an idle sender; a new window was started.
    Opened,
    /// Appended to the sender's open window; its deadline is unchanged.
    Joined,
}

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("aggregation is shut down; message from {0} not buffered")]
    Closed(SenderId),
    #[error("aggregation window of {wait:?} for {sender} cannot be scheduled")]
    OutOfRange { sender: SenderId, wait: Duration },
}

/// Snapshot of a window at its deadline. Session and flags come from the message that opened it.
#[derive(Debug, Clone)]
pub struct ClosedWindow {
    pub sender_id: SenderId,
    pub texts: Vec<String>,
    pub session: String,
    pub is_user: bool,
    pub is_group: bool,
    pub opened_at: DateTime<Utc>,
}

impl ClosedWindow {
    /// Buffered texts joined with a single space, in arrival order.
    pub fn combined_text(&self) -> String {
        self.texts.join(" ")
    }
}

/// Receives each closed window exactly once.
#[async_trait]
pub trait WindowSink: Send + Sync {
    async fn window_closed(&self, window: ClosedWindow) -> Result<(), DispatchError>;
}

struct PendingWindow {
    texts: Vec<String>,
    session: String,
    is_user: bool,
    is_group: bool,
    opened_at: DateTime<Utc>,
    generation: u64,
    timer: AbortHandle,
}

impl PendingWindow {
    fn into_closed(self, sender_id: SenderId) -> ClosedWindow {
        ClosedWindow {
            sender_id,
            texts: self.texts,
            session: self.session,
            is_user: self.is_user,
            is_group: self.is_group,
            opened_at: self.opened_at,
        }
    }
}

#[derive(Default)]
struct Windows {
    by_sender: HashMap<SenderId, PendingWindow>,
    next_generation: u64,
    closed: bool,
}

/// Owns the per-sender buffers and timers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WindowManager {
    wait: Duration,
    windows: Arc<Mutex<Windows>>,
    sink: Arc<dyn WindowSink>,
}

impl WindowManager {
    pub fn new(wait: Duration, sink: Arc<dyn WindowSink>) -> Self {
        Self {
            wait,
            windows: Arc::new(Mutex::new(Windows::default())),
            sink,
        }
    }

    pub fn wait_time(&self) -> Duration {
        self.wait
    }

    fn lock(&self) -> MutexGuard<'_, Windows> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buffer a message. Opens a window for an idle sender, otherwise joins the open one.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, msg: InboundMessage) -> Result<WindowAction, WindowError> {
        let mut windows = self.lock();
        if windows.closed {
            return Err(WindowError::Closed(msg.sender_id));
        }
        if let Some(pending) = windows.by_sender.get_mut(&msg.sender_id) {
            pending.texts.push(msg.text);
            log::info!(
                "message from {} added to existing aggregation window ({} buffered)",
                msg.sender_id,
                pending.texts.len()
            );
            return Ok(WindowAction::Joined);
        }

        let Some(deadline) = Instant::now().checked_add(self.wait) else {
            return Err(WindowError::OutOfRange {
                sender: msg.sender_id,
                wait: self.wait,
            });
        };
        let generation = windows.next_generation;
        windows.next_generation += 1;
        // The task cannot observe the map before this guard is released.
        let timer = tokio::spawn(
            self.clone()
                .run_window(msg.sender_id.clone(), generation, deadline),
        );
        log::info!(
            "aggregation window opened for {} ({}s)",
            msg.sender_id,
            self.wait.as_secs_f32()
        );
        windows.by_sender.insert(
            msg.sender_id,
            PendingWindow {
                texts: vec![msg.text],
                session: msg.session,
                is_user: msg.is_user,
                is_group: msg.is_group,
                opened_at: msg.received_at,
                generation,
                timer: timer.abort_handle(),
            },
        );
        Ok(WindowAction::Opened)
    }

    /// Remove the sender's window if it is still the one identified by `generation`.
    fn take(&self, sender_id: &str, generation: u64) -> Option<ClosedWindow> {
        let mut windows = self.lock();
        match windows.by_sender.get(sender_id) {
            Some(pending) if pending.generation == generation => {}
            _ => return None,
        }
        windows
            .by_sender
            .remove_entry(sender_id)
            .map(|(id, pending)| pending.into_closed(id))
    }

    async fn run_window(self, sender_id: SenderId, generation: u64, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
        let Some(window) = self.take(&sender_id, generation) else {
            log::debug!("window for {} already gone at deadline", sender_id);
            return;
        };
        if window.texts.is_empty() {
            return;
        }
        let combined = window.combined_text();
        log::info!(
            "aggregation window closed for {} with {} message(s)",
            sender_id,
            window.texts.len()
        );
        if let Err(e) = self.sink.window_closed(window).await {
            log::error!(
                "error processing aggregated messages for {} ({:?}): {}",
                sender_id,
                combined,
                e
            );
        }
    }

    /// Cancel the sender's pending window without dispatching. Returns the buffered texts.
    pub fn cancel(&self, sender_id: &str) -> Option<Vec<String>> {
        let pending = self.lock().by_sender.remove(sender_id)?;
        pending.timer.abort();
        log::info!("aggregation window for {} cancelled", sender_id);
        Some(pending.texts)
    }

    /// Number of texts buffered for the sender (0 when idle).
    pub fn pending(&self, sender_id: &str) -> usize {
        self.lock()
            .by_sender
            .get(sender_id)
            .map_or(0, |p| p.texts.len())
    }

    /// Number of senders with an open window.
    pub fn active_windows(&self) -> usize {
        self.lock().by_sender.len()
    }

    /// Stop accepting messages and drop every pending window. Returns how many were dropped.
    pub fn close(&self) -> usize {
        let mut windows = self.lock();
        windows.closed = true;
        let dropped = windows.by_sender.len();
        for (_, pending) in windows.by_sender.drain() {
            pending.timer.abort();
        }
        dropped
    }
}
