//! SpecGen session core.
//!
//! Owns the token lifecycle for a signed-in user:
//! - [`SessionStore`]: single source of truth for tokens, persisted and observable
//! - [`RefreshScheduler`]: refreshes the access token shortly before expiry
//! - [`RefreshCoordinator`]: single-flight refresh shared by every caller
//! - [`AuthenticatedClient`]: attaches the bearer token and recovers from one 401
//! - [`AuthGateway`]: remote login, signup, refresh, magic link, OAuth and 2FA
//! - [`AuthSession`]: the injectable context tying these together

pub mod client;
pub mod clock;
mod error;
pub mod gateway;
pub mod oauth;
pub mod refresh;
pub mod refresh_fsm;
pub mod scheduler;
mod session;
pub mod single_flight;
pub mod store;

pub use client::{
    ApiRequest, ApiResponse, AuthenticatedClient, HttpMethod, HttpTransport, Transport,
    UnauthorizedHandler,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, AuthResult};
pub use gateway::{AuthGateway, HttpAuthGateway, TokenGrant, TokenPayload, TwoFactorSetup};
pub use refresh::RefreshCoordinator;
pub use refresh_fsm::SchedulerState;
pub use scheduler::{refresh_delay, RefreshScheduler, MIN_REFRESH_DELAY_MS, REFRESH_LEAD_MS};
pub use session::{AuthSession, SessionStatus};
pub use store::{
    derive_expires_at, SessionCallback, SessionState, SessionStore, SubscriptionId,
    DEFAULT_EXPIRES_IN_SECS, MIN_EXPIRES_IN_SECS,
};
