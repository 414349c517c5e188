//! Per-node regenerate lock.
//!
//! A node is either Free or Pending. Pending owns a placeholder ticker that is
//! aborted as soon as the entry leaves the table, whichever way it leaves.

use std::{collections::HashMap, time::Duration};

use shared::domain::NodeId;
use tokio::{sync::mpsc, task::AbortHandle};

use crate::error::TreeError;

pub const TICK_INTERVAL: Duration = Duration::from_millis(200);

pub const PLACEHOLDER_FRAMES: [&str; 8] = [
    ".....", "o....", "Oo...", "oOo..", ".oOo.", "..oOo", "...oO", "....o",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Free,
    Pending,
}

/// Owned handle to a running placeholder ticker. Dropping it stops the ticker.
#[derive(Debug, Default)]
pub struct TickerHandle(Option<AbortHandle>);

impl TickerHandle {
    pub fn new(handle: AbortHandle) -> Self {
        Self(Some(handle))
    }

    /// Handle with nothing behind it, for callers that drive ticks themselves.
    pub fn inert() -> Self {
        Self(None)
    }

    pub fn is_inert(&self) -> bool {
        self.0.is_none()
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Starts the periodic placeholder tick for a node entering Pending.
pub trait TickSource: Send + Sync {
    fn start(&self, nid: &NodeId, period: Duration) -> TickerHandle;
}

/// Tick source that never fires; ticks are delivered by hand through
/// [`GenerationLock::advance`].
pub struct ManualTicks;

impl TickSource for ManualTicks {
    fn start(&self, _nid: &NodeId, _period: Duration) -> TickerHandle {
        TickerHandle::inert()
    }
}

/// Spawns one tokio interval per Pending node and posts each tick as a message,
/// so ticks are handled in order with every other session input.
pub struct TokioTicks<M> {
    sink: mpsc::UnboundedSender<M>,
    make: fn(NodeId) -> M,
}

impl<M> TokioTicks<M> {
    pub fn new(sink: mpsc::UnboundedSender<M>, make: fn(NodeId) -> M) -> Self {
        Self { sink, make }
    }
}

impl<M: Send + 'static> TickSource for TokioTicks<M> {
    fn start(&self, nid: &NodeId, period: Duration) -> TickerHandle {
        let sink = self.sink.clone();
        let make = self.make;
        let nid = nid.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if sink.send(make(nid.clone())).is_err() {
                    break;
                }
            }
        });
        TickerHandle::new(task.abort_handle())
    }
}

#[derive(Debug)]
struct PendingGeneration {
    cursor: usize,
    extend: bool,
    _ticker: TickerHandle,
}

#[derive(Debug, Default)]
pub struct GenerationLock {
    pending: HashMap<NodeId, PendingGeneration>,
}

impl GenerationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, nid: &NodeId) -> LockState {
        if self.pending.contains_key(nid) {
            LockState::Pending
        } else {
            LockState::Free
        }
    }

    pub fn is_pending(&self, nid: &NodeId) -> bool {
        self.pending.contains_key(nid)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.pending.keys()
    }

    /// Whether the outstanding request for `nid` continues the existing text.
    pub fn extends(&self, nid: &NodeId) -> Option<bool> {
        self.pending.get(nid).map(|p| p.extend)
    }

    /// Free -> Pending. The ticker is only started when the transition happens;
    /// a node that is already Pending is left untouched.
    pub fn acquire(
        &mut self,
        nid: &NodeId,
        extend: bool,
        start_ticker: impl FnOnce() -> TickerHandle,
    ) -> Result<(), TreeError> {
        if self.pending.contains_key(nid) {
            return Err(TreeError::RedundantRequest(nid.clone()));
        }
        self.pending.insert(
            nid.clone(),
            PendingGeneration {
                cursor: 0,
                extend,
                _ticker: start_ticker(),
            },
        );
        Ok(())
    }

    /// Pending -> Free. Returns false when the node was already Free.
    pub fn release(&mut self, nid: &NodeId) -> bool {
        self.pending.remove(nid).is_some()
    }

    /// Current placeholder frame for `nid`, moving its cursor on by one.
    pub fn advance(&mut self, nid: &NodeId) -> Option<&'static str> {
        let pending = self.pending.get_mut(nid)?;
        let frame = PLACEHOLDER_FRAMES[pending.cursor];
        pending.cursor = (pending.cursor + 1) % PLACEHOLDER_FRAMES.len();
        Some(frame)
    }

    /// Drops locks whose node no longer satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&NodeId) -> bool) {
        self.pending.retain(|nid, _| keep(nid));
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
#[path = "tests/generation_tests.rs"]
mod tests;
