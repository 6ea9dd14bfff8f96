//! The authenticated principal as reported by the identity provider.
//!
//! An `IdentityUser` is replaced wholesale on every auth-state change; the
//! session layer never edits one in place after receiving it.

use gigdesk_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::role::Role;

/// Metadata key under which a self-declared role is stored.
pub const ROLE_METADATA_KEY: &str = "role";

/// An authenticated user of the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    /// Provider-issued user ID.
    id: UserId,
    /// Email address the user signed up with.
    email: Option<String>,
    /// Free-form user metadata. May contain a self-declared role.
    #[serde(default)]
    metadata: Map<String, Value>,
    /// The provider's raw user object, kept for consumers that need fields
    /// this type does not model.
    #[serde(default)]
    raw: Value,
}

impl IdentityUser {
    /// Creates a user with empty metadata.
    #[must_use]
    pub fn new(id: UserId, email: Option<String>) -> Self {
        Self {
            id,
            email,
            metadata: Map::new(),
            raw: Value::Null,
        }
    }

    /// Embeds a declared role in the metadata.
    #[must_use]
    pub fn with_declared_role(mut self, role: Role) -> Self {
        self.metadata.insert(
            ROLE_METADATA_KEY.to_string(),
            Value::String(role.as_str().to_string()),
        );
        self
    }

    /// Replaces the metadata map.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attaches the provider's raw user object.
    #[must_use]
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// Returns the user's ID.
    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Returns the user's email address, if known.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Returns the raw provider object.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Returns the role the user declared for themselves, if it is a known one.
    #[must_use]
    pub fn declared_role(&self) -> Option<Role> {
        self.metadata
            .get(ROLE_METADATA_KEY)
            .and_then(Role::from_declared)
    }
}
