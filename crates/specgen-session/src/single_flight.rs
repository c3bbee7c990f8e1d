//! Single-flight slot for the token refresh.
//!
//! At most one refresh operation is in flight. Callers arriving while one is
//! pending join it and observe the identical outcome. The slot empties itself
//! when the operation settles, whatever the outcome.

use crate::error::AuthError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Outcome shared by every caller of one refresh operation.
pub type RefreshOutcome = Result<String, Arc<AuthError>>;

/// Handle to a pending refresh operation.
pub type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct SlotState {
    pending: Option<(u64, SharedRefresh)>,
    next_id: u64,
}

#[derive(Default)]
pub struct RefreshSlot {
    state: Arc<Mutex<SlotState>>,
}

impl RefreshSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the pending operation, or start a new one with `start`.
    ///
    /// Returns the shared handle and whether this call started it.
    pub fn join_or_start<F>(&self, start: F) -> (SharedRefresh, bool)
    where
        F: FnOnce() -> BoxFuture<'static, RefreshOutcome>,
    {
        let mut state = self.state.lock();
        if let Some((_, pending)) = &state.pending {
            return (pending.clone(), false);
        }

        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);

        let guard = SettleGuard {
            slot: Arc::downgrade(&self.state),
            id,
        };
        let operation = start();
        let shared = async move {
            let _guard = guard;
            operation.await
        }
        .boxed()
        .shared();

        state.pending = Some((id, shared.clone()));
        (shared, true)
    }

    /// Whether an operation is currently in flight.
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }
}

/// Empties the slot when the operation completes or is dropped.
struct SettleGuard {
    slot: Weak<Mutex<SlotState>>,
    id: u64,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let mut state = slot.lock();
        if matches!(&state.pending, Some((id, _)) if *id == self.id) {
            state.pending = None;
        }
    }
}
