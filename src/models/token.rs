//! OAuth token model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Current WHOOP token pair for a user.
///
/// Only the token manager mutates this; everyone else gets clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    /// May be absent if the `offline` scope was not granted.
    pub refresh_token: Option<String>,
    pub obtained_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthToken {
    /// Build a token from a grant response received at `now`.
    pub fn issued(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            obtained_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
        }
    }

    /// True if the token expires at or before `now + margin`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }

    /// A usable refresh token: present, non-empty and not just the access token echoed back.
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .filter(|rt| !rt.is_empty() && *rt != self.access_token)
    }
}
