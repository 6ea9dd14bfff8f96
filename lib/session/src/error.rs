//! Error types for the session crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `IdentityError`: failures reported by the identity provider
//! - `RoleStoreError`: failures of the persisted role lookup or write
//! - `AuthError`: what a store operation hands back to its caller
//!
//! Only `AuthError` crosses the crate boundary. Role store failures are
//! absorbed by the resolver's fallback policy.

use gigdesk_core::UserId;
use std::fmt;

/// Errors reported by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Email/password pair was rejected.
    InvalidCredentials,
    /// An account already exists for this email.
    EmailAlreadyRegistered { email: String },
    /// Password does not meet the provider's requirements.
    WeakPassword { reason: String },
    /// The operation needs an active session and there is none.
    NoActiveSession,
    /// The provider could not be reached.
    Network { reason: String },
    /// Any other provider-side failure.
    Provider { reason: String },
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid email or password"),
            Self::EmailAlreadyRegistered { email } => {
                write!(f, "an account already exists for {email}")
            }
            Self::WeakPassword { reason } => write!(f, "password rejected: {reason}"),
            Self::NoActiveSession => write!(f, "no active session"),
            Self::Network { reason } => {
                write!(f, "identity provider unreachable: {reason}")
            }
            Self::Provider { reason } => write!(f, "identity provider error: {reason}"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// Errors from the persisted role store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleStoreError {
    /// Reading the role record failed.
    LookupFailed { user_id: UserId, reason: String },
    /// Writing the role record failed.
    WriteFailed { user_id: UserId, reason: String },
    /// The lookup did not answer in time.
    TimedOut { user_id: UserId },
}

impl fmt::Display for RoleStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LookupFailed { user_id, reason } => {
                write!(f, "role lookup failed for {user_id}: {reason}")
            }
            Self::WriteFailed { user_id, reason } => {
                write!(f, "role write failed for {user_id}: {reason}")
            }
            Self::TimedOut { user_id } => write!(f, "role lookup timed out for {user_id}"),
        }
    }
}

impl std::error::Error for RoleStoreError {}

/// Errors returned by session store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The identity provider rejected or failed the operation.
    Identity(IdentityError),
    /// The store was disposed before the operation started.
    Disposed,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(err) => write!(f, "{err}"),
            Self::Disposed => write!(f, "session store has been disposed"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        Self::Identity(err)
    }
}
