//! Role resolution.
//!
//! Two sources report a user's role: the persisted role record and the role
//! the user declared in their identity metadata. They can disagree, most
//! often right after sign-up when the persisted record has not propagated
//! yet. [`reconcile`] merges them without doing any I/O; [`RoleResolver`]
//! performs the lookup, applies the failure fallback, and issues the
//! corrective write.

use gigdesk_core::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::RoleStoreError;
use crate::role::Role;
use crate::role_store::RoleStore;
use crate::sync::lock;
use crate::user::IdentityUser;

/// Outcome of merging the persisted and declared roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// The authoritative role.
    pub role: Option<Role>,
    /// Role to write back to the persisted record, if the sources disagree.
    pub corrective_write: Option<Role>,
}

/// Merges the persisted and declared roles.
///
/// The persisted role wins. When both are present and differ, the declared
/// role is returned as a corrective write so the record converges on the
/// most recently expressed intent.
#[must_use]
pub fn reconcile(persisted: Option<Role>, declared: Option<Role>) -> Reconciliation {
    match (persisted, declared) {
        (Some(persisted), Some(declared)) if persisted != declared => Reconciliation {
            role: Some(persisted),
            corrective_write: Some(declared),
        },
        (Some(persisted), _) => Reconciliation {
            role: Some(persisted),
            corrective_write: None,
        },
        (None, declared) => Reconciliation {
            role: declared,
            corrective_write: None,
        },
    }
}

/// Where a resolved role came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    /// The persisted role record.
    Persisted,
    /// Identity metadata, with the lookup confirming no record exists yet.
    Declared,
    /// The role declared at sign-up, set without a lookup.
    SignUp,
    /// Metadata or a previously known role, used because the lookup failed.
    Fallback,
}

impl RoleSource {
    /// Returns true if the role was confirmed against the persisted store
    /// (or set by a sign-up). Fallback roles are re-checked on the next event.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, Self::Fallback)
    }
}

/// Result of resolving one user's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved role. `None` when neither source produced one.
    pub role: Option<Role>,
    /// Where the role came from.
    pub source: Option<RoleSource>,
    /// The corrective write issued during this resolution, if any.
    pub corrective_write: Option<Role>,
}

impl Resolution {
    fn unresolved() -> Self {
        Self {
            role: None,
            source: None,
            corrective_write: None,
        }
    }
}

/// Resolves roles against a [`RoleStore`].
pub struct RoleResolver {
    store: Arc<dyn RoleStore>,
    lookup_timeout: Duration,
    issued_writes: Mutex<HashSet<(UserId, Role)>>,
}

impl RoleResolver {
    /// Creates a resolver with the given lookup timeout.
    #[must_use]
    pub fn new(store: Arc<dyn RoleStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
            issued_writes: Mutex::new(HashSet::new()),
        }
    }

    /// Resolves the role for `user`.
    ///
    /// `prior` is a role previously known for the same user; it is used only
    /// when the lookup fails and the user declares no role. Lookup and write
    /// failures never escape: they are logged and the fallback applies.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn resolve(&self, user: &IdentityUser, prior: Option<Role>) -> Resolution {
        let declared = user.declared_role();

        let persisted = match self.lookup(user.id()).await {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!(error = %err, ?declared, ?prior, "role lookup failed, using fallback");
                return match declared.or(prior) {
                    Some(role) => Resolution {
                        role: Some(role),
                        source: Some(RoleSource::Fallback),
                        corrective_write: None,
                    },
                    None => Resolution::unresolved(),
                };
            }
        };

        if persisted.is_some() && persisted == declared {
            // Converged; a later drift may need correcting again.
            lock(&self.issued_writes).retain(|(user_id, _)| *user_id != user.id());
        }

        let reconciliation = reconcile(persisted, declared);
        let source = match (persisted, reconciliation.role) {
            (Some(_), _) => Some(RoleSource::Persisted),
            (None, Some(_)) => Some(RoleSource::Declared),
            (None, None) => None,
        };

        let corrective_write = match reconciliation.corrective_write {
            Some(target) if self.heal(user.id(), target).await => Some(target),
            _ => None,
        };

        debug!(role = ?reconciliation.role, ?source, "role resolved");

        Resolution {
            role: reconciliation.role,
            source,
            corrective_write,
        }
    }

    async fn lookup(&self, user_id: UserId) -> Result<Option<Role>, RoleStoreError> {
        match tokio::time::timeout(self.lookup_timeout, self.store.get_role(user_id)).await {
            Ok(result) => result,
            Err(_) => Err(RoleStoreError::TimedOut { user_id }),
        }
    }

    /// Writes `target` to the role record unless this resolver already did.
    /// Returns true if a write was issued and succeeded.
    async fn heal(&self, user_id: UserId, target: Role) -> bool {
        if !lock(&self.issued_writes).insert((user_id, target)) {
            debug!(%target, "corrective write already issued");
            return false;
        }

        match self.store.set_role(user_id, target).await {
            Ok(()) => {
                debug!(%target, "persisted role corrected");
                true
            }
            Err(err) => {
                warn!(error = %err, %target, "corrective role write failed");
                lock(&self.issued_writes).remove(&(user_id, target));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Role store fake with switchable failures.
    #[derive(Default)]
    struct FakeRoleStore {
        persisted: Mutex<Option<Role>>,
        writes: Mutex<Vec<(UserId, Role)>>,
        fail_lookups: bool,
        fail_writes: bool,
        hang_lookups: bool,
        apply_writes: bool,
    }

    impl FakeRoleStore {
        fn with_role(role: Option<Role>) -> Self {
            Self {
                persisted: Mutex::new(role),
                ..Default::default()
            }
        }

        fn writes(&self) -> Vec<(UserId, Role)> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RoleStore for FakeRoleStore {
        async fn get_role(&self, user_id: UserId) -> Result<Option<Role>, RoleStoreError> {
            if self.hang_lookups {
                std::future::pending::<()>().await;
            }
            if self.fail_lookups {
                return Err(RoleStoreError::LookupFailed {
                    user_id,
                    reason: "connection reset".to_string(),
                });
            }
            Ok(*self.persisted.lock().unwrap())
        }

        async fn set_role(&self, user_id: UserId, role: Role) -> Result<(), RoleStoreError> {
            if self.fail_writes {
                return Err(RoleStoreError::WriteFailed {
                    user_id,
                    reason: "read-only replica".to_string(),
                });
            }
            self.writes.lock().unwrap().push((user_id, role));
            if self.apply_writes {
                *self.persisted.lock().unwrap() = Some(role);
            }
            Ok(())
        }
    }

    fn resolver(store: &Arc<FakeRoleStore>) -> RoleResolver {
        RoleResolver::new(store.clone(), Duration::from_millis(50))
    }

    fn user(declared: Option<Role>) -> IdentityUser {
        let user = IdentityUser::new(UserId::new(), Some("a@x.com".to_string()));
        match declared {
            Some(role) => user.with_declared_role(role),
            None => user,
        }
    }

    #[test]
    fn reconcile_prefers_persisted_and_heals_disagreement() {
        let r = reconcile(Some(Role::Client), Some(Role::Freelancer));
        assert_eq!(r.role, Some(Role::Client));
        assert_eq!(r.corrective_write, Some(Role::Freelancer));
    }

    #[test]
    fn reconcile_agreement_needs_no_write() {
        let r = reconcile(Some(Role::Client), Some(Role::Client));
        assert_eq!(r.role, Some(Role::Client));
        assert_eq!(r.corrective_write, None);

        let r = reconcile(Some(Role::Freelancer), None);
        assert_eq!(r.role, Some(Role::Freelancer));
        assert_eq!(r.corrective_write, None);
    }

    #[test]
    fn reconcile_falls_back_to_declared() {
        let r = reconcile(None, Some(Role::Freelancer));
        assert_eq!(r.role, Some(Role::Freelancer));
        assert_eq!(r.corrective_write, None);

        assert_eq!(reconcile(None, None).role, None);
    }

    #[tokio::test]
    async fn persisted_wins_and_declared_is_written_back() {
        let store = Arc::new(FakeRoleStore::with_role(Some(Role::Client)));
        let user = user(Some(Role::Freelancer));

        let resolution = resolver(&store).resolve(&user, None).await;

        assert_eq!(resolution.role, Some(Role::Client));
        assert_eq!(resolution.source, Some(RoleSource::Persisted));
        assert_eq!(resolution.corrective_write, Some(Role::Freelancer));
        assert_eq!(store.writes(), vec![(user.id(), Role::Freelancer)]);
    }

    #[tokio::test]
    async fn missing_record_uses_declared_without_write() {
        let store = Arc::new(FakeRoleStore::with_role(None));

        let resolution = resolver(&store)
            .resolve(&user(Some(Role::Freelancer)), None)
            .await;

        assert_eq!(resolution.role, Some(Role::Freelancer));
        assert_eq!(resolution.source, Some(RoleSource::Declared));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn failed_lookup_falls_back_to_declared() {
        let store = Arc::new(FakeRoleStore {
            fail_lookups: true,
            ..Default::default()
        });

        let resolution = resolver(&store)
            .resolve(&user(Some(Role::Client)), None)
            .await;

        assert_eq!(resolution.role, Some(Role::Client));
        assert_eq!(resolution.source, Some(RoleSource::Fallback));
        assert!(!resolution.source.unwrap().is_confirmed());
    }

    #[tokio::test]
    async fn failed_lookup_uses_prior_role_when_nothing_declared() {
        let store = Arc::new(FakeRoleStore {
            fail_lookups: true,
            ..Default::default()
        });

        let resolution = resolver(&store)
            .resolve(&user(None), Some(Role::Freelancer))
            .await;

        assert_eq!(resolution.role, Some(Role::Freelancer));
        assert_eq!(resolution.source, Some(RoleSource::Fallback));
    }

    #[tokio::test]
    async fn failed_lookup_without_any_fallback_is_unresolved() {
        let store = Arc::new(FakeRoleStore {
            fail_lookups: true,
            ..Default::default()
        });

        let resolution = resolver(&store).resolve(&user(None), None).await;

        assert_eq!(resolution, Resolution::unresolved());
    }

    #[tokio::test]
    async fn slow_lookup_times_out_into_fallback() {
        let store = Arc::new(FakeRoleStore {
            hang_lookups: true,
            ..Default::default()
        });
        let resolver = RoleResolver::new(store.clone(), Duration::from_millis(20));

        let resolution = resolver.resolve(&user(Some(Role::Client)), None).await;

        assert_eq!(resolution.role, Some(Role::Client));
        assert_eq!(resolution.source, Some(RoleSource::Fallback));
    }

    #[tokio::test]
    async fn repeated_resolution_issues_one_write() {
        // Writes are recorded but not applied, as during propagation delay.
        let store = Arc::new(FakeRoleStore::with_role(Some(Role::Client)));
        let resolver = resolver(&store);
        let user = user(Some(Role::Freelancer));

        let first = resolver.resolve(&user, None).await;
        let second = resolver.resolve(&user, None).await;

        assert_eq!(first.role, second.role);
        assert_eq!(first.corrective_write, Some(Role::Freelancer));
        assert_eq!(second.corrective_write, None);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn applied_write_converges_on_declared_role() {
        let store = Arc::new(FakeRoleStore {
            persisted: Mutex::new(Some(Role::Client)),
            apply_writes: true,
            ..Default::default()
        });
        let resolver = resolver(&store);
        let user = user(Some(Role::Freelancer));

        resolver.resolve(&user, None).await;
        let second = resolver.resolve(&user, None).await;

        assert_eq!(second.role, Some(Role::Freelancer));
        assert_eq!(second.corrective_write, None);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn failed_corrective_write_is_absorbed() {
        let store = Arc::new(FakeRoleStore {
            persisted: Mutex::new(Some(Role::Client)),
            fail_writes: true,
            ..Default::default()
        });

        let resolution = resolver(&store)
            .resolve(&user(Some(Role::Freelancer)), None)
            .await;

        assert_eq!(resolution.role, Some(Role::Client));
        assert_eq!(resolution.corrective_write, None);
    }

    #[tokio::test]
    async fn drift_after_convergence_is_corrected_again() {
        let store = Arc::new(FakeRoleStore {
            persisted: Mutex::new(Some(Role::Client)),
            apply_writes: true,
            ..Default::default()
        });
        let resolver = resolver(&store);
        let user = user(Some(Role::Freelancer));

        resolver.resolve(&user, None).await;
        resolver.resolve(&user, None).await;
        assert!(resolver.issued_writes.lock().unwrap().is_empty());

        // Something else rewrites the record back.
        *store.persisted.lock().unwrap() = Some(Role::Client);
        let resolution = resolver.resolve(&user, None).await;

        assert_eq!(resolution.corrective_write, Some(Role::Freelancer));
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn poisoned_write_log_still_heals() {
        let store = Arc::new(FakeRoleStore::with_role(Some(Role::Client)));
        let resolver = Arc::new(resolver(&store));

        let poisoner = Arc::clone(&resolver);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.issued_writes.lock().unwrap();
            panic!("poison the write log");
        })
        .join();
        assert!(resolver.issued_writes.is_poisoned());

        let resolution = resolver.resolve(&user(Some(Role::Freelancer)), None).await;

        assert_eq!(resolution.corrective_write, Some(Role::Freelancer));
        assert_eq!(store.writes().len(), 1);
    }
}
