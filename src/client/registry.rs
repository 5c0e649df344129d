//! Pending call registry.
//!
//! Maps each in-flight call id to the oneshot sender that completes it.
//! An entry is removed exactly once: by the matching reply, by the caller's
//! deadline or by the loss of the socket it was sent on.
//!
//! Every sent call is bound to the epoch of the socket that carried it. When
//! a socket is lost only calls bound to that epoch or an earlier one are
//! abandoned, so calls already sent on a replacement socket survive a late
//! disconnect notice.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::identifiers::{CallId, CallIdGenerator};
use crate::protocol::Method;

// ============================================================================
// PendingCall
// ============================================================================

/// A call waiting for its reply.
#[derive(Debug)]
pub struct PendingCall {
    /// Middleware function that was called.
    pub method: Method,
    /// When the call was registered.
    pub created_at: Instant,
    epoch: Option<u64>,
    reply_tx: oneshot::Sender<String>,
}

impl PendingCall {
    /// Completes the call with the reply's `retVal`.
    ///
    /// Returns `false` if the caller is no longer waiting.
    pub fn complete(self, ret_val: String) -> bool {
        self.reply_tx.send(ret_val).is_ok()
    }

    /// Time since registration.
    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Epoch of the socket the call was sent on, once sent.
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }
}

// ============================================================================
// PendingCalls
// ============================================================================

/// Call id allocation plus the table of in-flight calls.
#[derive(Debug, Default)]
pub struct PendingCalls {
    ids: CallIdGenerator,
    calls: FxHashMap<CallId, PendingCall>,
    lost_through: u64,
}

impl PendingCalls {
    /// Creates an empty registry whose first id is 1.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry whose ids continue after `last`.
    #[inline]
    #[must_use]
    pub fn starting_after(last: u64) -> Self {
        Self {
            ids: CallIdGenerator::starting_after(last),
            ..Self::default()
        }
    }

    /// Allocates the next id and registers a call under it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCallId`] if the id is still held by an
    /// unanswered call after the counter wrapped.
    pub fn register(&mut self, method: Method) -> Result<(CallId, oneshot::Receiver<String>)> {
        let id = self.ids.next_id();
        if self.calls.contains_key(&id) {
            return Err(Error::duplicate_call_id(id));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.calls.insert(
            id,
            PendingCall {
                method,
                created_at: Instant::now(),
                epoch: None,
                reply_tx,
            },
        );

        Ok((id, reply_rx))
    }

    /// Removes and returns the call registered under `id`.
    #[inline]
    pub fn take(&mut self, id: CallId) -> Option<PendingCall> {
        self.calls.remove(&id)
    }

    /// Records the socket epoch a call was sent on.
    ///
    /// Returns `false` and drops the call if that socket is already known to
    /// be lost; the waiter then sees the call as abandoned.
    pub fn bind(&mut self, id: CallId, epoch: u64) -> bool {
        if epoch <= self.lost_through {
            self.calls.remove(&id);
            return false;
        }
        match self.calls.get_mut(&id) {
            Some(call) => {
                call.epoch = Some(epoch);
                true
            }
            None => false,
        }
    }

    /// Drops the calls sent on sockets up to and including `epoch`.
    ///
    /// Calls not yet bound are kept; [`PendingCalls::bind`] rejects them
    /// if they turn out to belong to a lost socket. Returns how many calls
    /// were abandoned.
    pub fn abandon_epoch(&mut self, epoch: u64) -> usize {
        self.lost_through = self.lost_through.max(epoch);
        let before = self.calls.len();
        self.calls
            .retain(|_, call| call.epoch.is_none_or(|bound| bound > epoch));
        before - self.calls.len()
    }

    /// Drops every pending call, failing their waiters.
    ///
    /// Returns how many calls were abandoned.
    pub fn abandon_all(&mut self) -> usize {
        let count = self.calls.len();
        self.calls.clear();
        count
    }

    /// Number of calls in flight.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Returns `true` if nothing is in flight.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_allocates_increasing_ids() {
        let mut pending = PendingCalls::new();
        let (first, _rx1) = pending.register(Method::GetVersion).expect("register");
        let (second, _rx2) = pending.register(Method::GetUserList).expect("register");

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_take_completes_waiter() {
        let mut pending = PendingCalls::new();
        let (id, mut rx) = pending.register(Method::GetVersion).expect("register");

        let call = pending.take(id).expect("pending");
        assert_eq!(call.method, Method::GetVersion);
        assert!(call.complete("1.0".to_string()));
        assert_eq!(rx.try_recv().expect("reply"), "1.0");
        assert!(pending.take(id).is_none());
    }

    #[test]
    fn test_duplicate_after_wrap_fails_fast() {
        let mut pending = PendingCalls::starting_after(CallId::MAX - 1);
        let (last, _rx_last) = pending.register(Method::GetVersion).expect("register");
        assert_eq!(last.get(), CallId::MAX);

        // Restart the counter so it hands out MAX again.
        pending.ids = CallIdGenerator::starting_after(CallId::MAX - 1);
        let err = pending.register(Method::GetVersion).unwrap_err();
        assert!(matches!(err, Error::DuplicateCallId { .. }));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_wrap_reuses_free_ids() {
        let mut pending = PendingCalls::starting_after(CallId::MAX);
        let (id, _rx) = pending.register(Method::GetVersion).expect("register");
        assert_eq!(id.get(), 1);
    }

    #[test]
    fn test_abandon_epoch_keeps_calls_on_newer_socket() {
        let mut pending = PendingCalls::new();
        let (old, mut old_rx) = pending.register(Method::SignData).expect("register");
        let (new, mut new_rx) = pending.register(Method::GetVersion).expect("register");
        assert!(pending.bind(old, 1));
        assert!(pending.bind(new, 2));

        assert_eq!(pending.abandon_epoch(1), 1);
        assert!(old_rx.try_recv().is_err());
        assert_eq!(pending.len(), 1);

        let call = pending.take(new).expect("survives");
        assert_eq!(call.epoch(), Some(2));
        assert!(call.complete("2.14".to_string()));
        assert_eq!(new_rx.try_recv().expect("reply"), "2.14");
    }

    #[test]
    fn test_bind_after_loss_abandons_call() {
        let mut pending = PendingCalls::new();
        let (id, mut rx) = pending.register(Method::GetVersion).expect("register");

        // Unbound calls survive the loss notice itself.
        assert_eq!(pending.abandon_epoch(3), 0);
        assert_eq!(pending.len(), 1);

        assert!(!pending.bind(id, 3));
        assert!(pending.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_abandon_all_fails_waiters() {
        let mut pending = PendingCalls::new();
        let (_, mut rx1) = pending.register(Method::SignData).expect("register");
        let (_, mut rx2) = pending.register(Method::GetVersion).expect("register");

        assert_eq!(pending.abandon_all(), 2);
        assert!(pending.is_empty());
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }
}
