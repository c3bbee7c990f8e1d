//! Storage key constants.

/// Storage keys used by the session core
pub struct StorageKeys;

impl StorageKeys {
    /// Bearer access token
    pub const ACCESS_TOKEN: &'static str = "specgen.accessToken";

    /// Refresh token
    pub const REFRESH_TOKEN: &'static str = "specgen.refreshToken";

    /// Access token expiry, milliseconds since epoch as a decimal string
    pub const TOKEN_EXPIRES_AT: &'static str = "specgen.tokenExpiresAt";

    /// UI locale preference
    pub const LOCALE: &'static str = "specgen.locale";
}
