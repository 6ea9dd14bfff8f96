//! Provider sessions.
//!
//! A session is the credential bundle the identity provider hands out on
//! sign-in. The session layer only reads it: sessions are created by the
//! provider, replaced on token refresh, and dropped on sign-out.

use chrono::{DateTime, Duration, Utc};
use gigdesk_core::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An active provider session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session.
    id: SessionId,
    /// The subject the session was issued to.
    user_id: UserId,
    /// When the session was issued.
    created_at: DateTime<Utc>,
    /// When the session expires.
    expires_at: DateTime<Utc>,
    /// Bearer token for API calls.
    access_token: Option<String>,
    /// Token used to obtain a fresh access token.
    refresh_token: Option<String>,
    /// Raw provider payload.
    #[serde(default)]
    raw: Value,
}

impl Session {
    /// Creates a session for the given user, valid for `duration`.
    #[must_use]
    pub fn new(id: SessionId, user_id: UserId, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            created_at: now,
            expires_at: now + duration,
            access_token: None,
            refresh_token: None,
            raw: Value::Null,
        }
    }

    /// Creates a session carrying provider tokens.
    #[must_use]
    pub fn with_tokens(
        id: SessionId,
        user_id: UserId,
        duration: Duration,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Self {
        let mut session = Self::new(id, user_id, duration);
        session.access_token = Some(access_token);
        session.refresh_token = refresh_token;
        session
    }

    /// Attaches the raw provider payload.
    #[must_use]
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the subject user ID.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns when the session was issued.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the session expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the access token, if present.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Returns the refresh token, if present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns the raw provider payload.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Rotates the tokens and extends expiration, as a provider token refresh does.
    pub fn refresh(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        duration: Duration,
    ) {
        self.access_token = Some(access_token);
        self.refresh_token = refresh_token;
        self.expires_at = Utc::now() + duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_expected_fields() {
        let user_id = UserId::new();
        let before = Utc::now();
        let session = Session::new(SessionId::new(), user_id, Duration::hours(1));

        assert_eq!(session.user_id(), user_id);
        assert!(session.created_at() >= before);
        assert!(session.expires_at() > session.created_at());
        assert!(session.access_token().is_none());
        assert!(!session.is_expired());
    }

    #[test]
    fn negative_duration_is_already_expired() {
        let session = Session::new(SessionId::new(), UserId::new(), Duration::seconds(-1));
        assert!(session.is_expired());
    }

    #[test]
    fn refresh_rotates_tokens() {
        let mut session = Session::with_tokens(
            SessionId::new(),
            UserId::new(),
            Duration::seconds(1),
            "old".to_string(),
            Some("old_refresh".to_string()),
        );
        let old_expiry = session.expires_at();

        session.refresh("new".to_string(), None, Duration::hours(2));

        assert_eq!(session.access_token(), Some("new"));
        assert!(session.refresh_token().is_none());
        assert!(session.expires_at() > old_expiry);
    }
}
