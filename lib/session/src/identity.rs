//! Identity provider seam.
//!
//! The provider verifies credentials, issues sessions, and broadcasts
//! auth-state changes. The session store depends only on this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::IdentityError;
use crate::role::Role;
use crate::session::Session;
use crate::user::IdentityUser;

/// A session together with the user it was issued to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGrant {
    /// The issued session.
    pub session: Session,
    /// The authenticated user.
    pub user: IdentityUser,
}

/// Result of a successful sign-up.
///
/// Providers that require email confirmation create the user without
/// issuing a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    /// The newly created user, with the declared role in its metadata.
    pub user: IdentityUser,
    /// The session, if the provider signed the user in immediately.
    pub session: Option<Session>,
}

/// Kind of auth-state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    /// A user signed in (here or in another tab).
    SignedIn,
    /// The session ended.
    SignedOut,
    /// The provider rotated the session tokens.
    TokenRefreshed,
    /// The user object changed (for example, new metadata).
    UserUpdated,
}

/// A single auth-state change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    /// What happened.
    pub event: AuthEvent,
    /// The session and user after the change. `None` when signed out.
    pub grant: Option<SessionGrant>,
}

impl AuthChange {
    /// A change carrying a live session.
    #[must_use]
    pub fn with_grant(event: AuthEvent, grant: SessionGrant) -> Self {
        Self {
            event,
            grant: Some(grant),
        }
    }

    /// A sign-out notification.
    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            event: AuthEvent::SignedOut,
            grant: None,
        }
    }
}

/// Client for an external identity provider.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Authenticates with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionGrant, IdentityError>;

    /// Creates an account with the declared role embedded in user metadata.
    ///
    /// The provider backend creates the persisted role record as a side
    /// effect, possibly after a delay.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        declared_role: Role,
    ) -> Result<SignUpOutcome, IdentityError>;

    /// Ends the current session.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Returns the cached session, if one exists.
    async fn get_session(&self) -> Result<Option<SessionGrant>, IdentityError>;

    /// Subscribes to auth-state changes. Dropping the receiver unsubscribes.
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChange>;
}
