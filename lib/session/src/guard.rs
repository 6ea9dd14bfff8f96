//! Route guards.
//!
//! A guard looks at an [`AuthSnapshot`] and decides whether a route subtree
//! renders, shows a loading placeholder, or redirects. Guards never fail: an
//! unmet predicate is always a redirect.

use crate::config::RouteConfig;
use crate::navigate::{NavigateOptions, Navigator};
use crate::role::Role;
use crate::snapshot::AuthSnapshot;
use crate::store::SessionHandle;

/// Where a guard sends the user instead of rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Target path.
    pub to: String,
    /// Replace the current history entry.
    pub replace: bool,
}

impl Redirect {
    fn replacing(to: &str) -> Self {
        Self {
            to: to.to_string(),
            replace: true,
        }
    }
}

/// Outcome of evaluating a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the guarded subtree.
    Render,
    /// Auth state is unsettled; render a placeholder and wait.
    Loading,
    /// Send the user elsewhere.
    Redirect(Redirect),
}

impl GuardDecision {
    /// Returns true if the subtree should render.
    #[must_use]
    pub fn allows(&self) -> bool {
        matches!(self, Self::Render)
    }
}

/// An access predicate over the auth state.
pub trait RouteGuard: Send + Sync {
    /// Decides what to do for the given snapshot.
    fn evaluate(&self, snapshot: &AuthSnapshot) -> GuardDecision;

    /// Evaluates and performs the navigation for a redirect decision.
    fn enforce(&self, snapshot: &AuthSnapshot, navigator: &dyn Navigator) -> GuardDecision {
        let decision = self.evaluate(snapshot);
        if let GuardDecision::Redirect(redirect) = &decision {
            navigator.navigate(
                &redirect.to,
                NavigateOptions {
                    replace: redirect.replace,
                },
            );
        }
        decision
    }
}

/// Waits for the auth state to settle, then enforces `guard`.
///
/// Never returns [`GuardDecision::Loading`] unless the store was dropped
/// while still loading.
pub async fn settle<G: RouteGuard + ?Sized>(
    guard: &G,
    handle: &mut SessionHandle,
    navigator: &dyn Navigator,
) -> GuardDecision {
    let snapshot = handle.settled().await;
    guard.enforce(&snapshot, navigator)
}

/// Requires a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthGuard {
    login: String,
}

impl AuthGuard {
    /// Creates the guard from the route table.
    #[must_use]
    pub fn new(routes: &RouteConfig) -> Self {
        Self {
            login: routes.login.clone(),
        }
    }
}

impl RouteGuard for AuthGuard {
    fn evaluate(&self, snapshot: &AuthSnapshot) -> GuardDecision {
        // Hold while loading so a reload does not bounce a signed-in user.
        if snapshot.is_loading() {
            return GuardDecision::Loading;
        }
        if snapshot.user().is_none() {
            return GuardDecision::Redirect(Redirect::replacing(&self.login));
        }
        GuardDecision::Render
    }
}

/// Shared logic of the role guards.
#[derive(Debug, Clone)]
struct RoleGate {
    required: Role,
    auth: AuthGuard,
    other_home: String,
    landing: String,
}

impl RoleGate {
    fn new(required: Role, routes: &RouteConfig) -> Self {
        Self {
            required,
            auth: AuthGuard::new(routes),
            other_home: routes.home_for(required.other()).to_string(),
            landing: routes.landing.clone(),
        }
    }

    fn evaluate(&self, snapshot: &AuthSnapshot) -> GuardDecision {
        match self.auth.evaluate(snapshot) {
            GuardDecision::Render => {}
            other => return other,
        }
        match snapshot.resolved_role() {
            Some(role) if role == self.required => GuardDecision::Render,
            // The only other role; send them to their own home.
            Some(_) => GuardDecision::Redirect(Redirect::replacing(&self.other_home)),
            None => GuardDecision::Redirect(Redirect::replacing(&self.landing)),
        }
    }
}

/// Requires a signed-in client.
#[derive(Debug, Clone)]
pub struct ClientGuard(RoleGate);

impl ClientGuard {
    /// Creates the guard from the route table.
    #[must_use]
    pub fn new(routes: &RouteConfig) -> Self {
        Self(RoleGate::new(Role::Client, routes))
    }
}

impl RouteGuard for ClientGuard {
    fn evaluate(&self, snapshot: &AuthSnapshot) -> GuardDecision {
        self.0.evaluate(snapshot)
    }
}

/// Requires a signed-in freelancer.
#[derive(Debug, Clone)]
pub struct FreelancerGuard(RoleGate);

impl FreelancerGuard {
    /// Creates the guard from the route table.
    #[must_use]
    pub fn new(routes: &RouteConfig) -> Self {
        Self(RoleGate::new(Role::Freelancer, routes))
    }
}

impl RouteGuard for FreelancerGuard {
    fn evaluate(&self, snapshot: &AuthSnapshot) -> GuardDecision {
        self.0.evaluate(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SessionGrant;
    use crate::memory::HistoryNavigator;
    use crate::resolver::RoleSource;
    use crate::session::Session;
    use crate::user::IdentityUser;
    use chrono::Duration;
    use gigdesk_core::{SessionId, UserId};

    fn signed_in(role: Role) -> AuthSnapshot {
        let user = IdentityUser::new(UserId::new(), Some("a@x.com".to_string()));
        let session = Session::new(SessionId::new(), user.id(), Duration::hours(1));
        AuthSnapshot::settled(user, Some(session), Some(role), Some(RoleSource::Persisted))
    }

    fn resolving() -> AuthSnapshot {
        let user = IdentityUser::new(UserId::new(), None);
        let session = Session::new(SessionId::new(), user.id(), Duration::hours(1));
        AuthSnapshot::resolving(SessionGrant { session, user })
    }

    fn routes() -> RouteConfig {
        RouteConfig::default()
    }

    #[test]
    fn auth_guard_holds_while_loading() {
        let guard = AuthGuard::new(&routes());
        assert_eq!(
            guard.evaluate(&AuthSnapshot::uninitialized()),
            GuardDecision::Loading
        );
        assert_eq!(guard.evaluate(&resolving()), GuardDecision::Loading);
    }

    #[test]
    fn auth_guard_redirects_anonymous_to_login() {
        let guard = AuthGuard::new(&routes());
        assert_eq!(
            guard.evaluate(&AuthSnapshot::anonymous()),
            GuardDecision::Redirect(Redirect {
                to: "/login".to_string(),
                replace: true,
            })
        );
    }

    #[test]
    fn auth_guard_renders_for_any_role() {
        let guard = AuthGuard::new(&routes());
        assert!(guard.evaluate(&signed_in(Role::Client)).allows());
        assert!(guard.evaluate(&signed_in(Role::Freelancer)).allows());
    }

    #[test]
    fn client_guard_renders_only_for_clients() {
        let guard = ClientGuard::new(&routes());
        assert!(guard.evaluate(&signed_in(Role::Client)).allows());
        assert_eq!(
            guard.evaluate(&signed_in(Role::Freelancer)),
            GuardDecision::Redirect(Redirect {
                to: "/dashboard/freelancer".to_string(),
                replace: true,
            })
        );
    }

    #[test]
    fn freelancer_guard_sends_clients_home() {
        let guard = FreelancerGuard::new(&routes());
        assert!(guard.evaluate(&signed_in(Role::Freelancer)).allows());
        assert_eq!(
            guard.evaluate(&signed_in(Role::Client)),
            GuardDecision::Redirect(Redirect {
                to: "/dashboard/client".to_string(),
                replace: true,
            })
        );
    }

    #[test]
    fn role_guards_defer_to_auth_guard() {
        let guard = ClientGuard::new(&routes());
        assert_eq!(guard.evaluate(&resolving()), GuardDecision::Loading);
        assert_eq!(
            guard.evaluate(&AuthSnapshot::anonymous()),
            GuardDecision::Redirect(Redirect {
                to: "/login".to_string(),
                replace: true,
            })
        );
    }

    #[test]
    fn enforce_navigates_only_on_redirect() {
        let navigator = HistoryNavigator::new("/dashboard/client");
        let guard = ClientGuard::new(&routes());

        guard.enforce(&signed_in(Role::Client), &navigator);
        assert!(navigator.requests().is_empty());

        guard.enforce(&resolving(), &navigator);
        assert!(navigator.requests().is_empty());

        guard.enforce(&signed_in(Role::Freelancer), &navigator);
        assert_eq!(navigator.current(), "/dashboard/freelancer");
        assert_eq!(navigator.history(), vec!["/dashboard/freelancer"]);
    }

    #[test]
    fn custom_routes_are_respected() {
        let routes = RouteConfig {
            login: "/auth/sign-in".to_string(),
            ..RouteConfig::default()
        };
        let guard = FreelancerGuard::new(&routes);
        assert_eq!(
            guard.evaluate(&AuthSnapshot::anonymous()),
            GuardDecision::Redirect(Redirect {
                to: "/auth/sign-in".to_string(),
                replace: true,
            })
        );
    }
}
