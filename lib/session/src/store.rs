//! The session store.
//!
//! `SessionStore` is the single writer of the [`AuthSnapshot`]. It probes the
//! identity provider once at start-up, follows the provider's auth-state
//! events, resolves roles, and runs the sign-in/up/out operations. Readers
//! hold a [`SessionHandle`], which is a view onto a `watch` channel.
//!
//! Every write is tagged with a generation ticket. Starting a new transition
//! (a new event, a user operation, disposal) bumps the generation, and a
//! write carrying an older ticket is dropped. The check and the write happen
//! under the same lock, so a continuation that completes out of order can
//! never overwrite newer state.
//!
//! A sign-in or sign-up is the exception for its own user: the provider
//! echoes the new session as an event, and that echo is held until the
//! operation settles instead of starting a second resolution. A sign-out,
//! or a sign-in by a different user, still pre-empts the operation.

use gigdesk_core::UserId;
use rootcause::prelude::Report;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::error::{AuthError, IdentityError};
use crate::identity::{AuthChange, IdentityClient, SessionGrant, SignUpOutcome};
use crate::navigate::{NavigateOptions, Navigator};
use crate::notify::{Notification, Notifier};
use crate::resolver::{Resolution, RoleResolver, RoleSource};
use crate::role::Role;
use crate::role_store::RoleStore;
use crate::snapshot::{AuthPhase, AuthSnapshot};
use crate::sync::lock;

/// Proof that a write belongs to the transition that started at `generation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    generation: u64,
}

/// A sign-in or sign-up in flight.
///
/// The provider announces the operation's own session through the event
/// stream. Grant events are held here until the operation settles, so the
/// operation is not pre-empted by its own echo.
#[derive(Debug)]
struct Operation {
    generation: u64,
    /// Set once the provider has answered.
    user: Option<UserId>,
    /// Latest grant event received while in flight.
    deferred: Option<AuthChange>,
}

#[derive(Debug, Default)]
struct Gate {
    generation: u64,
    disposed: bool,
    operation: Option<Operation>,
}

struct Inner {
    identity: Arc<dyn IdentityClient>,
    resolver: RoleResolver,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    config: SessionConfig,
    state: watch::Sender<AuthSnapshot>,
    gate: Mutex<Gate>,
    initialized: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
    last_known: Mutex<Option<(UserId, Role)>>,
}

impl Inner {
    /// Starts a new transition, invalidating all outstanding tickets and
    /// pre-empting any operation in flight.
    fn begin(&self, update: impl FnOnce(&mut AuthSnapshot)) -> Option<Ticket> {
        self.begin_with(update, false)
    }

    /// Starts a user-triggered sign-in or sign-up.
    fn begin_operation(&self, update: impl FnOnce(&mut AuthSnapshot)) -> Option<Ticket> {
        self.begin_with(update, true)
    }

    fn begin_with(
        &self,
        update: impl FnOnce(&mut AuthSnapshot),
        operation: bool,
    ) -> Option<Ticket> {
        let mut gate = lock(&self.gate);
        if gate.disposed {
            return None;
        }
        gate.generation += 1;
        let generation = gate.generation;
        gate.operation = operation.then_some(Operation {
            generation,
            user: None,
            deferred: None,
        });
        self.apply(update);
        Some(Ticket { generation })
    }

    /// Records which user the operation started under `ticket` signed in.
    fn claim(&self, ticket: Ticket, user_id: UserId) {
        let mut gate = lock(&self.gate);
        if let Some(operation) = gate
            .operation
            .as_mut()
            .filter(|op| op.generation == ticket.generation)
        {
            operation.user = Some(user_id);
        }
    }

    /// Holds back a grant event while an operation is in flight. Events for
    /// a different user than the operation's, and sign-outs, are not held.
    fn defer_to_operation(&self, change: &AuthChange) -> bool {
        let Some(grant) = &change.grant else {
            return false;
        };
        let mut gate = lock(&self.gate);
        let current = gate.generation;
        let Some(operation) = gate
            .operation
            .as_mut()
            .filter(|op| op.generation == current)
        else {
            return false;
        };
        if operation.user.is_some_and(|user| user != grant.user.id()) {
            return false;
        }
        debug!(event = ?change.event, user_id = %grant.user.id(), "holding auth change until operation settles");
        operation.deferred = Some(change.clone());
        true
    }

    /// Ends the operation started under `ticket`.
    ///
    /// A held event for the operation's own user is folded into the settled
    /// snapshot. Any other held event is returned for replay.
    fn finish(&self, ticket: Ticket, user_id: Option<UserId>) -> Option<AuthChange> {
        let mut gate = lock(&self.gate);
        if gate.disposed || gate.generation != ticket.generation {
            return None;
        }
        let deferred = gate.operation.take()?.deferred?;
        let own_echo = deferred
            .grant
            .as_ref()
            .is_some_and(|grant| Some(grant.user.id()) == user_id);
        if !own_echo {
            return Some(deferred);
        }
        if let Some(grant) = deferred.grant {
            let holds_user = self
                .state
                .borrow()
                .user()
                .is_some_and(|user| user.id() == grant.user.id());
            if holds_user {
                self.apply(|snapshot| snapshot.refresh_grant(grant));
            }
        }
        None
    }

    /// Applies `update` if `ticket` is still current. Returns false for a
    /// stale ticket or a disposed store.
    fn commit(&self, ticket: Ticket, update: impl FnOnce(&mut AuthSnapshot)) -> bool {
        let gate = lock(&self.gate);
        if gate.disposed || gate.generation != ticket.generation {
            debug!(
                ticket = ticket.generation,
                current = gate.generation,
                disposed = gate.disposed,
                "discarding stale auth update"
            );
            return false;
        }
        self.apply(update);
        true
    }

    /// Caller must hold the gate.
    fn apply(&self, update: impl FnOnce(&mut AuthSnapshot)) {
        self.state.send_if_modified(|snapshot| {
            let before = snapshot.clone();
            update(snapshot);
            *snapshot != before
        });
    }

    fn is_disposed(&self) -> bool {
        lock(&self.gate).disposed
    }

    fn current(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    /// Swaps in a fresh session for a user whose role is already confirmed.
    /// Returns false if the event needs a full resolution instead.
    fn refresh_if_confirmed(&self, grant: &SessionGrant) -> bool {
        let gate = lock(&self.gate);
        if gate.disposed || !self.state.borrow().is_confirmed_for(&grant.user) {
            return false;
        }
        self.apply(|snapshot| snapshot.refresh_grant(grant.clone()));
        true
    }

    fn prior_role(&self, user_id: UserId) -> Option<Role> {
        let last_known = *lock(&self.last_known);
        last_known
            .filter(|(known, _)| *known == user_id)
            .map(|(_, role)| role)
    }

    fn remember(&self, user_id: UserId, role: Role) {
        *lock(&self.last_known) = Some((user_id, role));
    }

    fn forget(&self) {
        *lock(&self.last_known) = None;
    }

    /// Clears the state after a sign-out. Runs under the gate so a
    /// concurrent settle cannot re-remember the user's role.
    fn sign_out_state(&self, snapshot: &mut AuthSnapshot) {
        self.forget();
        *snapshot = AuthSnapshot::anonymous();
    }

    /// Builds the settled snapshot for `grant` and commits it under `ticket`.
    /// Returns `None` if the ticket was stale.
    fn settle(
        &self,
        ticket: Ticket,
        grant: SessionGrant,
        resolution: Resolution,
    ) -> Option<AuthSnapshot> {
        let user_id = grant.user.id();
        if resolution.role.is_none() {
            warn!(%user_id, "no role could be resolved; settling anonymous");
        }

        let snapshot = AuthSnapshot::settled(
            grant.user,
            Some(grant.session),
            resolution.role,
            resolution.source,
        );
        let committed = self.commit(ticket, |current| {
            if let (Some(role), Some(source)) = (resolution.role, resolution.source) {
                if source.is_confirmed() {
                    self.remember(user_id, role);
                }
            }
            *current = snapshot.clone();
        });
        if !committed {
            return None;
        }
        info!(%user_id, role = ?resolution.role, source = ?resolution.source, "auth state settled");
        Some(snapshot)
    }

    async fn resolve_and_settle(&self, ticket: Ticket, grant: SessionGrant) -> Option<AuthSnapshot> {
        let prior = self.prior_role(grant.user.id());
        let resolution = self.resolver.resolve(&grant.user, prior).await;
        self.settle(ticket, grant, resolution)
    }

    /// Asks the provider for its cached session and settles on the answer.
    async fn probe(&self, ticket: Ticket) {
        match self.identity.get_session().await {
            Ok(Some(grant)) => {
                info!(user_id = %grant.user.id(), "existing session found");
                if self.commit(ticket, |s| *s = AuthSnapshot::resolving(grant.clone())) {
                    self.resolve_and_settle(ticket, grant).await;
                }
            }
            Ok(None) => {
                if self.commit(ticket, |s| *s = AuthSnapshot::anonymous()) {
                    info!("no existing session");
                }
            }
            Err(err) => {
                warn!(error = %err, "session probe failed; treating as signed out");
                self.commit(ticket, |s| *s = AuthSnapshot::anonymous());
            }
        }
    }

    fn apply_change(self: &Arc<Self>, change: AuthChange) {
        if self.defer_to_operation(&change) {
            return;
        }
        let Some(grant) = change.grant else {
            info!(event = ?change.event, "provider reports no session");
            self.begin(|s| self.sign_out_state(s));
            return;
        };

        if self.refresh_if_confirmed(&grant) {
            debug!(event = ?change.event, user_id = %grant.user.id(), "role already confirmed; session refreshed");
            return;
        }

        info!(event = ?change.event, user_id = %grant.user.id(), "resolving role for auth change");
        let Some(ticket) = self.begin(|s| *s = AuthSnapshot::resolving(grant.clone())) else {
            return;
        };
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.resolve_and_settle(ticket, grant).await;
        });
    }

    /// Re-probes the provider after events were lost.
    fn resync(self: &Arc<Self>) {
        let Some(ticket) = self.begin(|_| {}) else {
            return;
        };
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.probe(ticket).await;
        });
    }

    /// Ends a failed user operation: leaves the loading phase, tells the
    /// user, and hands the error back.
    fn fail(
        self: &Arc<Self>,
        ticket: Ticket,
        previous: AuthPhase,
        title: &str,
        err: IdentityError,
    ) -> Report<AuthError> {
        warn!(error = %err, "{title}");
        let restored = self.commit(ticket, |s| s.restore_after_failure(previous));
        let held = self.finish(ticket, None);
        if restored && !matches!(previous, AuthPhase::Ready(_) | AuthPhase::Uninitialized) {
            // The operation pre-empted a probe or resolution; redo it.
            self.resync();
        } else if let Some(change) = held {
            self.apply_change(change);
        }
        self.notifier
            .notify(Notification::failure(title, err.to_string()));
        AuthError::Identity(err).into()
    }

    fn navigate(&self, path: &str, options: NavigateOptions) {
        debug!(path, replace = options.replace, "navigating");
        self.navigator.navigate(path, options);
    }
}

async fn listen(inner: Arc<Inner>, mut events: broadcast::Receiver<AuthChange>) {
    loop {
        match events.recv().await {
            Ok(change) => inner.apply_change(change),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "auth events dropped; re-probing session");
                inner.resync();
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("auth event stream closed");
                break;
            }
        }
    }
}

/// Process-wide authority for the auth state.
///
/// Construct one at the application root and hand [`SessionHandle`]s to
/// consumers. Dropping the store disposes it.
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Creates a store. Nothing happens until [`start`](Self::start).
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        roles: Arc<dyn RoleStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        config: SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::uninitialized());
        let resolver = RoleResolver::new(roles, config.role_lookup_timeout());
        Self {
            inner: Arc::new(Inner {
                identity,
                resolver,
                notifier,
                navigator,
                config,
                state,
                gate: Mutex::new(Gate::default()),
                initialized: AtomicBool::new(false),
                listener: Mutex::new(None),
                last_known: Mutex::new(None),
            }),
        }
    }

    /// Returns a read handle onto the auth state.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            rx: self.inner.state.subscribe(),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.current()
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Subscribes to provider events and probes for an existing session.
    ///
    /// Runs once per store; later calls are no-ops. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            debug!("session store already started");
            return;
        }

        // Subscribe before probing so an event during the probe is queued.
        let events = self.inner.identity.on_auth_state_change();
        let Some(ticket) = self
            .inner
            .begin(|s| *s = AuthSnapshot::unsettled(AuthPhase::Bootstrapping))
        else {
            return;
        };
        info!("bootstrapping session store");

        let listener = tokio::spawn(listen(Arc::clone(&self.inner), events));
        *lock(&self.inner.listener) = Some(listener);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.probe(ticket).await;
        });
    }

    /// Signs in with email and password.
    ///
    /// On success the role is resolved and the full snapshot committed before
    /// navigating to the dashboard. On failure a notification is raised and
    /// the provider error is returned; the state only leaves the loading phase.
    #[instrument(skip(self, password))]
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> gigdesk_core::Result<AuthSnapshot, AuthError> {
        let inner = &self.inner;
        let previous = inner.current().phase();
        let ticket = inner
            .begin_operation(|s| s.set_phase(AuthPhase::Authenticating))
            .ok_or(AuthError::Disposed)?;

        let grant = match inner.identity.sign_in(email, password).await {
            Ok(grant) => grant,
            Err(err) => return Err(inner.fail(ticket, previous, "Sign in failed", err)),
        };
        let user_id = grant.user.id();
        inner.claim(ticket, user_id);

        let settled = inner.resolve_and_settle(ticket, grant).await;
        let held = inner.finish(ticket, Some(user_id));
        if settled.is_none() {
            return self.superseded();
        }

        let snapshot = inner.current();
        inner.notifier.notify(Notification::success(
            "Signed in",
            format!("Welcome back, {email}"),
        ));
        self.redirect_to_dashboard();
        if let Some(change) = held {
            inner.apply_change(change);
        }
        Ok(snapshot)
    }

    /// Creates an account with the declared role.
    ///
    /// The role is set optimistically from the declaration; the persisted
    /// record is written by the provider backend and is not queried here.
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        declared_role: Role,
    ) -> gigdesk_core::Result<AuthSnapshot, AuthError> {
        let inner = &self.inner;
        let previous = inner.current().phase();
        let ticket = inner
            .begin_operation(|s| s.set_phase(AuthPhase::Authenticating))
            .ok_or(AuthError::Disposed)?;

        let SignUpOutcome { user, session } =
            match inner.identity.sign_up(email, password, declared_role).await {
                Ok(outcome) => outcome,
                Err(err) => return Err(inner.fail(ticket, previous, "Sign up failed", err)),
            };

        let user_id = user.id();
        inner.claim(ticket, user_id);

        let Some(session) = session else {
            // Provider wants the address confirmed before issuing a session.
            let committed = inner.commit(ticket, |s| *s = AuthSnapshot::anonymous());
            let held = inner.finish(ticket, Some(user_id));
            if !committed {
                return self.superseded();
            }
            inner.notifier.notify(Notification::success(
                "Confirm your email",
                format!("We sent a confirmation link to {email}"),
            ));
            if let Some(change) = held {
                inner.apply_change(change);
            }
            return Ok(AuthSnapshot::anonymous());
        };

        let snapshot = AuthSnapshot::settled(
            user,
            Some(session),
            Some(declared_role),
            Some(RoleSource::SignUp),
        );
        let committed = inner.commit(ticket, |s| {
            inner.remember(user_id, declared_role);
            *s = snapshot.clone();
        });
        let held = inner.finish(ticket, Some(user_id));
        if !committed {
            return self.superseded();
        }
        info!(role = %declared_role, "account created");

        let snapshot = inner.current();
        inner.notifier.notify(Notification::success(
            "Account created",
            format!("Welcome aboard, {email}"),
        ));
        self.redirect_to_dashboard();
        if let Some(change) = held {
            inner.apply_change(change);
        }
        Ok(snapshot)
    }

    /// Signs out.
    ///
    /// If the provider call fails the state is kept, since the session may
    /// still be valid.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> gigdesk_core::Result<(), AuthError> {
        let inner = &self.inner;
        if inner.is_disposed() {
            return Err(AuthError::Disposed.into());
        }

        if let Err(err) = inner.identity.sign_out().await {
            warn!(error = %err, "sign out failed");
            inner
                .notifier
                .notify(Notification::failure("Sign out failed", err.to_string()));
            return Err(AuthError::Identity(err).into());
        }

        if inner.begin(|s| inner.sign_out_state(s)).is_none() {
            debug!("store disposed during sign out");
            return Ok(());
        }
        info!("signed out");
        inner.notifier.notify(Notification::success(
            "Signed out",
            "You have been signed out",
        ));
        inner.navigate(&inner.config.routes.landing, NavigateOptions::replace());
        Ok(())
    }

    /// Sends the user to the generic dashboard entry point. Role-specific
    /// routing is left to the dashboard's own guards.
    pub fn redirect_to_dashboard(&self) {
        let inner = &self.inner;
        inner.navigate(&inner.config.routes.dashboard, NavigateOptions::default());
    }

    /// Result of an operation whose outcome was overtaken by a sign-out or a
    /// different user's sign-in. Nothing is announced and no navigation
    /// happens; the caller gets the state that won.
    fn superseded(&self) -> gigdesk_core::Result<AuthSnapshot, AuthError> {
        if self.inner.is_disposed() {
            return Err(AuthError::Disposed.into());
        }
        debug!("operation superseded by a newer auth change");
        Ok(self.inner.current())
    }

    /// Stops following provider events and rejects every outstanding
    /// continuation. Idempotent.
    pub fn dispose(&self) {
        {
            let mut gate = lock(&self.inner.gate);
            if gate.disposed {
                return;
            }
            gate.disposed = true;
            gate.generation += 1;
        }
        if let Some(listener) = lock(&self.inner.listener).take() {
            listener.abort();
        }
        info!("session store disposed");
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Read-only view of the auth state.
#[derive(Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<AuthSnapshot>,
}

impl SessionHandle {
    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.rx.borrow().clone()
    }

    /// Returns true if the state changed since this handle last looked.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Waits for the next change. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<AuthSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Waits until the state is no longer loading and returns it.
    pub async fn settled(&mut self) -> AuthSnapshot {
        if let Ok(snapshot) = self.rx.wait_for(|s| !s.is_loading()).await {
            return AuthSnapshot::clone(&snapshot);
        }
        self.rx.borrow().clone()
    }

    /// Returns the state as a stream, starting with the current value.
    #[must_use]
    pub fn stream(&self) -> WatchStream<AuthSnapshot> {
        WatchStream::new(self.rx.clone())
    }
}
