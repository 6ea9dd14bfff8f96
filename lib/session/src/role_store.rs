//! Persisted role records.

use async_trait::async_trait;
use gigdesk_core::UserId;

use crate::error::RoleStoreError;
use crate::role::Role;

/// Persisted user-id to role mapping.
///
/// Records are created by the identity backend at sign-up. The session
/// layer only writes through the resolver's corrective path.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Looks up the persisted role. `Ok(None)` means no record exists yet.
    async fn get_role(&self, user_id: UserId) -> Result<Option<Role>, RoleStoreError>;

    /// Writes the role record for a user.
    async fn set_role(&self, user_id: UserId, role: Role) -> Result<(), RoleStoreError>;
}
