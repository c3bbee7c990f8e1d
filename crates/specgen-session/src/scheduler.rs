//! Proactive refresh scheduler.
//!
//! Watches the session store and keeps one timer armed to refresh the access
//! token shortly before it expires. Any change to the refresh token or expiry
//! replaces the timer; losing either disarms it.

use crate::error::{AuthError, AuthResult};
use crate::refresh::RefreshCoordinator;
use crate::refresh_fsm::{RefreshMachine, RefreshMachineInput, SchedulerState};
use crate::store::{SessionState, SessionStore, SubscriptionId};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long before expiry the refresh fires.
pub const REFRESH_LEAD_MS: i64 = 60_000;

/// Shortest delay ever armed.
pub const MIN_REFRESH_DELAY_MS: i64 = 1_000;

/// Delay until the proactive refresh for a token expiring at `expires_at_ms`.
pub fn refresh_delay(expires_at_ms: i64, now_ms: i64) -> Duration {
    let delay_ms = expires_at_ms
        .saturating_sub(now_ms)
        .saturating_sub(REFRESH_LEAD_MS)
        .max(MIN_REFRESH_DELAY_MS);
    Duration::from_millis(delay_ms as u64)
}

struct ArmedTimer {
    handle: JoinHandle<()>,
    delay: Duration,
    generation: u64,
}

struct SchedulerCore {
    fsm: RefreshMachine,
    timer: Option<ArmedTimer>,
    /// Last observed (refresh token, expiry) pair.
    observed: Option<(Option<String>, Option<i64>)>,
    generation: u64,
    torn_down: bool,
}

impl SchedulerCore {
    fn transition(&mut self, input: RefreshMachineInput) {
        if let Err(e) = self.fsm.consume(&input) {
            warn!(
                from = ?self.fsm.state(),
                input = ?input,
                error = ?e,
                "Invalid refresh scheduler transition"
            );
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}

struct SchedulerInner {
    store: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    runtime: Handle,
    core: Mutex<SchedulerCore>,
}

/// Keeps the access token fresh while a refresh token is available.
///
/// Dropping the scheduler tears it down.
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl RefreshScheduler {
    /// Attach to `store` and arm for the current session, if any.
    ///
    /// Must be called from within a Tokio runtime; timers run on it.
    pub fn start(
        store: Arc<SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> AuthResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            AuthError::Config(format!("Refresh scheduler requires a Tokio runtime: {e}"))
        })?;

        let inner = Arc::new(SchedulerInner {
            store: store.clone(),
            coordinator,
            runtime,
            core: Mutex::new(SchedulerCore {
                fsm: RefreshMachine::new(),
                timer: None,
                observed: None,
                generation: 0,
                torn_down: false,
            }),
        });

        let weak: Weak<SchedulerInner> = Arc::downgrade(&inner);
        let subscription = store.subscribe(move |state| {
            if let Some(inner) = weak.upgrade() {
                inner.on_state_change(state);
            }
        });

        inner.on_state_change(&store.snapshot());

        Ok(Self {
            inner,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from(self.inner.core.lock().fsm.state())
    }

    /// Delay of the currently armed timer.
    pub fn armed_delay(&self) -> Option<Duration> {
        self.inner.core.lock().timer.as_ref().map(|t| t.delay)
    }

    /// Cancel any armed timer and stop observing the store. Idempotent.
    pub fn teardown(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.inner.store.unsubscribe(id);
        }

        let mut core = self.inner.core.lock();
        if core.torn_down {
            return;
        }
        core.torn_down = true;
        core.cancel_timer();
        core.transition(RefreshMachineInput::Disarm);
        debug!("Refresh scheduler torn down");
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl SchedulerInner {
    fn on_state_change(self: &Arc<Self>, state: &SessionState) {
        let key = (state.refresh_token.clone(), state.token_expires_at);

        let mut core = self.core.lock();
        if core.torn_down || core.observed.as_ref() == Some(&key) {
            return;
        }
        core.observed = Some(key);
        core.cancel_timer();

        let (Some(_), Some(expires_at)) = (&state.refresh_token, state.token_expires_at) else {
            core.transition(RefreshMachineInput::Disarm);
            debug!("No refresh token or expiry; refresh scheduler idle");
            return;
        };

        let delay = refresh_delay(expires_at, self.store.now_ms());
        core.generation = core.generation.wrapping_add(1);
        let generation = core.generation;

        let deadline = tokio::time::Instant::now() + delay;
        let weak = Arc::downgrade(self);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire(generation).await;
            }
        });

        core.timer = Some(ArmedTimer {
            handle,
            delay,
            generation,
        });
        core.transition(RefreshMachineInput::Arm);
        debug!(
            delay_ms = delay.as_millis() as u64,
            expires_at, "Proactive token refresh scheduled"
        );
    }

    async fn fire(self: &Arc<Self>, generation: u64) {
        {
            let mut core = self.core.lock();
            let current = core.timer.as_ref().map(|t| t.generation);
            if core.torn_down || current != Some(generation) {
                return;
            }
            // Detach this task so store updates made by the refresh re-arm a
            // fresh timer instead of aborting the one running now.
            core.timer = None;
            core.transition(RefreshMachineInput::Fire);
        }

        info!("Access token nearing expiry; refreshing");
        match self.coordinator.refresh().await {
            Ok(_) => debug!("Proactive token refresh complete"),
            Err(e) => warn!(error = %e, "Proactive token refresh failed"),
        }

        // A refresh that left the token/expiry pair unchanged produced no
        // re-arm; schedule from the current state explicitly.
        let still_refreshing = {
            let mut core = self.core.lock();
            let stalled = !core.torn_down
                && SchedulerState::from(core.fsm.state()) == SchedulerState::Refreshing;
            if stalled {
                core.observed = None;
            }
            stalled
        };
        if still_refreshing {
            self.on_state_change(&self.store.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_delay_leads_expiry_by_a_minute() {
        let now = 1_000_000;
        assert_eq!(
            refresh_delay(now + 30 * 60_000, now),
            Duration::from_millis(29 * 60_000)
        );
    }

    #[test]
    fn test_refresh_delay_floor() {
        let now = 1_000_000;
        assert_eq!(refresh_delay(now + 30_000, now), Duration::from_secs(1));
        assert_eq!(refresh_delay(now - 5_000, now), Duration::from_secs(1));
        assert_eq!(refresh_delay(now + 61_000, now), Duration::from_secs(1));
        assert_eq!(refresh_delay(now + 62_000, now), Duration::from_secs(2));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        use crate::clock::ManualClock;
        use crate::gateway::{AuthGateway, HttpAuthGateway};
        use crate::client::{ApiRequest, ApiResponse, Transport};
        use async_trait::async_trait;
        use specgen_storage::{MemoryStorage, TokenVault};

        struct Offline;

        #[async_trait]
        impl Transport for Offline {
            async fn send(&self, _: &ApiRequest) -> AuthResult<ApiResponse> {
                Err(AuthError::NetworkUnavailable)
            }
        }

        let vault = TokenVault::new(Box::new(MemoryStorage::new()));
        let store = Arc::new(SessionStore::load(vault, Arc::new(ManualClock::new(0))));
        let gateway: Arc<dyn AuthGateway> = Arc::new(HttpAuthGateway::new(Arc::new(Offline)));
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), gateway));

        let result = RefreshScheduler::start(store.clone(), coordinator);
        assert!(matches!(result, Err(AuthError::Config(_))));
        assert_eq!(store.subscriber_count(), 0);
    }
}
