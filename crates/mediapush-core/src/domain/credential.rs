//! Bearer credential entity
//!
//! One `Credential` is shared per process. The coordinator in
//! `mediapush-upload` owns the in-memory copy and refreshes it in place.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the process-wide credential
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialState {
    /// No credential stored
    #[default]
    Unauthenticated,
    /// Access token valid beyond the refresh window
    Authenticated,
    /// Access token expires within the refresh window
    ExpiringSoon,
    /// A refresh is in flight
    Refreshing,
    /// The refresh grant was revoked; only `authorize` recovers
    ReauthenticationRequired,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialState::Unauthenticated => "unauthenticated",
            CredentialState::Authenticated => "authenticated",
            CredentialState::ExpiringSoon => "expiring-soon",
            CredentialState::Refreshing => "refreshing",
            CredentialState::ReauthenticationRequired => "reauthentication-required",
        }
    }

    /// Returns true if uploads can proceed without user interaction
    pub fn can_upload(&self) -> bool {
        matches!(
            self,
            CredentialState::Authenticated
                | CredentialState::ExpiringSoon
                | CredentialState::Refreshing
        )
    }
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access token, refresh token and access-token expiry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True if the access token expires within `window` of `now`
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - now <= window
    }

    /// State as seen at `now` with the given refresh window
    pub fn state_at(&self, window: Duration, now: DateTime<Utc>) -> CredentialState {
        if self.expires_within(window, now) {
            CredentialState::ExpiringSoon
        } else {
            CredentialState::Authenticated
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_within_window() {
        let now = Utc::now();
        let cred = Credential::new("a", "r", now + Duration::seconds(200));
        assert!(cred.expires_within(Duration::seconds(300), now));
        assert!(!cred.expires_within(Duration::seconds(100), now));
    }

    #[test]
    fn test_already_expired_is_within_any_window() {
        let now = Utc::now();
        let cred = Credential::new("a", "r", now - Duration::seconds(10));
        assert!(cred.expires_within(Duration::zero(), now));
    }

    #[test]
    fn test_state_at() {
        let now = Utc::now();
        let cred = Credential::new("a", "r", now + Duration::hours(1));
        assert_eq!(
            cred.state_at(Duration::seconds(300), now),
            CredentialState::Authenticated
        );
        assert_eq!(
            cred.state_at(Duration::hours(2), now),
            CredentialState::ExpiringSoon
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let cred = Credential::new("secret-access", "secret-refresh", Utc::now());
        let debug = format!("{cred:?}");
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_state_can_upload() {
        assert!(CredentialState::Authenticated.can_upload());
        assert!(!CredentialState::Unauthenticated.can_upload());
        assert!(!CredentialState::ReauthenticationRequired.can_upload());
        assert_eq!(
            CredentialState::ReauthenticationRequired.to_string(),
            "reauthentication-required"
        );
    }
}
