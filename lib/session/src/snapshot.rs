//! The read-only auth state exposed to consumers.

use serde::Serialize;

use crate::identity::SessionGrant;
use crate::resolver::RoleSource;
use crate::role::Role;
use crate::session::Session;
use crate::user::IdentityUser;

/// Outcome of a settled auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// A user is signed in and has a role.
    Authenticated,
    /// Nobody is signed in.
    Anonymous,
}

/// Lifecycle phase of the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Store constructed, not started.
    Uninitialized,
    /// Probing the provider for an existing session.
    Bootstrapping,
    /// A user-triggered sign-in or sign-up is in flight.
    Authenticating,
    /// A user is known and their role is being resolved.
    Resolving,
    /// State is settled.
    Ready(Readiness),
}

/// Composite auth state.
///
/// Once [`is_loading`](Self::is_loading) is false, either both the user and
/// the role are absent, or both are present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSnapshot {
    user: Option<IdentityUser>,
    resolved_role: Option<Role>,
    session: Option<Session>,
    phase: AuthPhase,
    role_source: Option<RoleSource>,
}

impl AuthSnapshot {
    /// State of a store that has not started.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self::unsettled(AuthPhase::Uninitialized)
    }

    pub(crate) fn unsettled(phase: AuthPhase) -> Self {
        Self {
            user: None,
            resolved_role: None,
            session: None,
            phase,
            role_source: None,
        }
    }

    /// Settled state with nobody signed in.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::unsettled(AuthPhase::Ready(Readiness::Anonymous))
    }

    /// A known user whose role is still being resolved.
    pub(crate) fn resolving(grant: SessionGrant) -> Self {
        Self {
            user: Some(grant.user),
            resolved_role: None,
            session: Some(grant.session),
            phase: AuthPhase::Resolving,
            role_source: None,
        }
    }

    /// Settles a user with a role. Without a role the user is withheld and
    /// the snapshot settles anonymous; the next auth event retries.
    #[must_use]
    pub fn settled(
        user: IdentityUser,
        session: Option<Session>,
        role: Option<Role>,
        source: Option<RoleSource>,
    ) -> Self {
        match role {
            Some(role) => Self {
                user: Some(user),
                resolved_role: Some(role),
                session,
                phase: AuthPhase::Ready(Readiness::Authenticated),
                role_source: source,
            },
            None => Self::anonymous(),
        }
    }

    /// Returns the signed-in user.
    #[must_use]
    pub fn user(&self) -> Option<&IdentityUser> {
        self.user.as_ref()
    }

    /// Returns the resolved role.
    #[must_use]
    pub fn resolved_role(&self) -> Option<Role> {
        self.resolved_role
    }

    /// Returns the current session.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns the lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// Returns where the resolved role came from.
    #[must_use]
    pub fn role_source(&self) -> Option<RoleSource> {
        self.role_source
    }

    /// Returns true until the state settles.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        !matches!(self.phase, AuthPhase::Ready(_))
    }

    /// Returns true if a user is signed in and the state is settled.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.is_loading() && self.user.is_some()
    }

    /// Returns true if the settled role of a signed-in user is `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.is_authenticated() && self.resolved_role == Some(role)
    }

    /// Returns true if the snapshot satisfies the settled-state invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.is_loading() || self.user.is_some() == self.resolved_role.is_some()
    }

    /// Returns true if the role of the given user is already confirmed, so
    /// a new event for the same user does not need another resolution.
    pub(crate) fn is_confirmed_for(&self, user: &IdentityUser) -> bool {
        !self.is_loading()
            && self.user.as_ref().is_some_and(|u| u.id() == user.id())
            && self.resolved_role.is_some()
            && self.role_source.is_some_and(|s| s.is_confirmed())
    }

    /// Replaces the user and session without touching the role.
    pub(crate) fn refresh_grant(&mut self, grant: SessionGrant) {
        self.user = Some(grant.user);
        self.session = Some(grant.session);
    }

    pub(crate) fn set_phase(&mut self, phase: AuthPhase) {
        self.phase = phase;
    }

    /// Leaves the loading phase after a failed user operation. A settled
    /// previous phase is restored as-is; otherwise the snapshot settles on
    /// whatever it already holds, keeping the settled-state invariant.
    pub(crate) fn restore_after_failure(&mut self, previous: AuthPhase) {
        if let AuthPhase::Ready(readiness) = previous {
            self.phase = AuthPhase::Ready(readiness);
            return;
        }
        if self.user.is_some() && self.resolved_role.is_some() {
            self.phase = AuthPhase::Ready(Readiness::Authenticated);
        } else {
            *self = Self::anonymous();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gigdesk_core::{SessionId, UserId};

    fn grant() -> SessionGrant {
        let user = IdentityUser::new(UserId::new(), Some("a@x.com".to_string()));
        let session = Session::new(SessionId::new(), user.id(), Duration::hours(1));
        SessionGrant { session, user }
    }

    #[test]
    fn uninitialized_is_loading() {
        let snapshot = AuthSnapshot::uninitialized();
        assert!(snapshot.is_loading());
        assert!(!snapshot.is_authenticated());
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn settled_with_role_is_authenticated() {
        let grant = grant();
        let snapshot = AuthSnapshot::settled(
            grant.user,
            Some(grant.session),
            Some(Role::Client),
            Some(RoleSource::Persisted),
        );

        assert!(!snapshot.is_loading());
        assert!(snapshot.has_role(Role::Client));
        assert!(!snapshot.has_role(Role::Freelancer));
        assert_eq!(
            snapshot.phase(),
            AuthPhase::Ready(Readiness::Authenticated)
        );
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn settled_without_role_withholds_user() {
        let grant = grant();
        let snapshot = AuthSnapshot::settled(grant.user, Some(grant.session), None, None);

        assert!(!snapshot.is_loading());
        assert!(snapshot.user().is_none());
        assert!(snapshot.session().is_none());
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn resolving_user_is_loading() {
        let snapshot = AuthSnapshot::resolving(grant());
        assert!(snapshot.is_loading());
        assert!(snapshot.user().is_some());
        assert!(!snapshot.is_authenticated());
    }

    #[test]
    fn restore_after_failure_keeps_settled_state() {
        let grant = grant();
        let mut snapshot = AuthSnapshot::settled(
            grant.user,
            Some(grant.session),
            Some(Role::Freelancer),
            Some(RoleSource::Persisted),
        );
        let before = snapshot.clone();

        snapshot.set_phase(AuthPhase::Authenticating);
        assert!(snapshot.is_loading());
        snapshot.restore_after_failure(before.phase());

        assert_eq!(snapshot, before);
    }

    #[test]
    fn restore_after_failure_from_loading_settles_anonymous() {
        let mut snapshot = AuthSnapshot::resolving(grant());
        snapshot.restore_after_failure(AuthPhase::Resolving);

        assert!(!snapshot.is_loading());
        assert!(snapshot.user().is_none());
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn fallback_role_is_not_confirmed() {
        let grant = grant();
        let user = grant.user.clone();
        let snapshot = AuthSnapshot::settled(
            grant.user,
            Some(grant.session),
            Some(Role::Client),
            Some(RoleSource::Fallback),
        );
        assert!(!snapshot.is_confirmed_for(&user));
    }
}
