//! State scoped to one installation of the overlay.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::page::VideoIdentity;

type CancelHandler = Box<dyn FnOnce() + Send>;

/// Handle returned by [`CancelStack::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelTicket(u64);

#[derive(Default)]
struct CancelEntries {
    next: u64,
    entries: Vec<(CancelTicket, CancelHandler)>,
}

/// Last-registered-first-served cancel handlers.
///
/// Only the topmost handler reacts to a cancel key press.
#[derive(Default)]
pub struct CancelStack {
    inner: Mutex<CancelEntries>,
}

impl fmt::Debug for CancelStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelStack").field("len", &self.len()).finish()
    }
}

impl CancelStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, handler: impl FnOnce() + Send + 'static) -> CancelTicket {
        let mut inner = self.lock();
        let ticket = CancelTicket(inner.next);
        inner.next += 1;
        inner.entries.push((ticket, Box::new(handler)));
        ticket
    }

    pub fn is_topmost(&self, ticket: CancelTicket) -> bool {
        self.lock()
            .entries
            .last()
            .is_some_and(|(top, _)| *top == ticket)
    }

    /// Drops a handler without running it. Returns whether it was registered.
    pub fn remove(&self, ticket: CancelTicket) -> bool {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(entry, _)| *entry != ticket);
        inner.entries.len() != before
    }

    /// Pops and runs the topmost handler. Returns `false` when the stack is empty.
    pub fn cancel_topmost(&self) -> bool {
        let popped = self.lock().entries.pop();
        match popped {
            Some((ticket, handler)) => {
                debug!(ticket = ticket.0, "cancel handler invoked");
                handler();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CancelEntries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-installation context threaded through the controller and actions.
///
/// Dropping back to a fresh session on reinstall is what clears the cached
/// video id and any stale cancel handlers.
pub struct Session {
    identity: Arc<dyn VideoIdentity>,
    video_id: Mutex<Option<String>>,
    cancel_stack: CancelStack,
    shutdown: CancellationToken,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("video_id", &self.cached_video_id())
            .field("cancel_stack", &self.cancel_stack)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl Session {
    pub fn new(identity: Arc<dyn VideoIdentity>) -> Self {
        Self {
            identity,
            video_id: Mutex::new(None),
            cancel_stack: CancelStack::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Resolves the video id, caching the first successful lookup.
    pub async fn video_id(&self, prompt_if_missing: bool) -> Option<String> {
        if let Some(id) = self.cached_video_id() {
            return Some(id);
        }

        let resolved = self.identity.video_id(prompt_if_missing).await?;
        debug!(video_id = %resolved, "video id resolved");
        *self.video_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(resolved.clone());
        Some(resolved)
    }

    pub fn cached_video_id(&self) -> Option<String> {
        self.video_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cancel_stack(&self) -> &CancelStack {
        &self.cancel_stack
    }

    /// Token cancelled when the owning installation is torn down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn close(&self) {
        self.shutdown.cancel();
        self.cancel_stack.clear();
        *self.video_id.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
