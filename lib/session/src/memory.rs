//! In-process implementations of the session layer's collaborators.
//!
//! These back the console demo and the tests. `InMemoryIdentityClient`
//! behaves like a hosted identity provider with a single browser tab: one
//! current session, broadcast auth events, and helpers to simulate activity
//! from other tabs.

use async_trait::async_trait;
use chrono::Duration;
use gigdesk_core::{SessionId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{IdentityError, RoleStoreError};
use crate::identity::{AuthChange, AuthEvent, IdentityClient, SessionGrant, SignUpOutcome};
use crate::navigate::{NavigateOptions, Navigator};
use crate::notify::{Notification, Notifier};
use crate::role::Role;
use crate::role_store::RoleStore;
use crate::session::Session;
use crate::sync::lock;
use crate::user::IdentityUser;

const EVENT_CAPACITY: usize = 64;
const MIN_PASSWORD_LEN: usize = 6;

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: IdentityUser,
}

/// Identity provider held entirely in memory.
pub struct InMemoryIdentityClient {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<SessionGrant>>,
    events: broadcast::Sender<AuthChange>,
    role_records: Option<Arc<InMemoryRoleStore>>,
    session_duration: Duration,
    confirm_email: AtomicBool,
    next_failure: Mutex<Option<IdentityError>>,
}

impl Default for InMemoryIdentityClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityClient {
    /// Creates a provider with no accounts.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            role_records: None,
            session_duration: Duration::hours(1),
            confirm_email: AtomicBool::new(false),
            next_failure: Mutex::new(None),
        }
    }

    /// Creates role records in `store` when accounts sign up, as the hosted
    /// backend's sign-up trigger does.
    #[must_use]
    pub fn with_role_records(mut self, store: Arc<InMemoryRoleStore>) -> Self {
        self.role_records = Some(store);
        self
    }

    /// Sets how long issued sessions last.
    #[must_use]
    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    /// When set, sign-up creates the account but issues no session.
    pub fn require_email_confirmation(&self, required: bool) {
        self.confirm_email.store(required, Ordering::SeqCst);
    }

    /// Makes the next provider operation fail with `err`.
    pub fn fail_next(&self, err: IdentityError) {
        *lock(&self.next_failure) = Some(err);
    }

    /// Adds an account directly, bypassing sign-up side effects.
    pub fn register(&self, password: &str, user: IdentityUser) {
        let email = normalize_email(user.email().unwrap_or_default());
        lock(&self.accounts).insert(
            email,
            Account {
                password: password.to_string(),
                user,
            },
        );
    }

    /// Establishes a cached session without emitting an event, as if the
    /// session survived a page reload.
    pub fn restore_session(&self, email: &str) -> Option<SessionGrant> {
        let grant = self.issue(email)?;
        *lock(&self.current) = Some(grant.clone());
        Some(grant)
    }

    /// Signs a user in from another tab: the session changes and an event
    /// fires, but no caller awaits the result.
    pub fn sign_in_elsewhere(&self, email: &str) -> Option<SessionGrant> {
        let grant = self.restore_session(email)?;
        self.emit(AuthChange::with_grant(AuthEvent::SignedIn, grant.clone()));
        Some(grant)
    }

    /// Ends the session from another tab.
    pub fn sign_out_elsewhere(&self) {
        *lock(&self.current) = None;
        self.emit(AuthChange::signed_out());
    }

    /// Rotates the current session's tokens and emits a refresh event.
    pub fn refresh_token(&self) -> Option<SessionGrant> {
        let grant = {
            let mut current = lock(&self.current);
            let grant = current.as_mut()?;
            grant.session.refresh(
                format!("{}.access", SessionId::new()),
                Some(format!("{}.refresh", SessionId::new())),
                self.session_duration,
            );
            grant.clone()
        };
        self.emit(AuthChange::with_grant(
            AuthEvent::TokenRefreshed,
            grant.clone(),
        ));
        Some(grant)
    }

    /// Returns the number of live event subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn emit(&self, change: AuthChange) {
        if self.events.send(change).is_err() {
            debug!("no auth event subscribers");
        }
    }

    fn take_failure(&self) -> Result<(), IdentityError> {
        match lock(&self.next_failure).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn issue(&self, email: &str) -> Option<SessionGrant> {
        let user = lock(&self.accounts)
            .get(&normalize_email(email))
            .map(|account| account.user.clone())?;
        Some(self.grant_for(user))
    }

    fn grant_for(&self, user: IdentityUser) -> SessionGrant {
        let session = Session::with_tokens(
            SessionId::new(),
            user.id(),
            self.session_duration,
            format!("{}.access", SessionId::new()),
            Some(format!("{}.refresh", SessionId::new())),
        );
        SessionGrant { session, user }
    }
}

#[async_trait]
impl IdentityClient for InMemoryIdentityClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionGrant, IdentityError> {
        self.take_failure()?;
        let user = {
            let accounts = lock(&self.accounts);
            match accounts.get(&normalize_email(email)) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(IdentityError::InvalidCredentials),
            }
        };

        let grant = self.grant_for(user);
        *lock(&self.current) = Some(grant.clone());
        info!(user_id = %grant.user.id(), "issued session");
        self.emit(AuthChange::with_grant(AuthEvent::SignedIn, grant.clone()));
        Ok(grant)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        declared_role: Role,
    ) -> Result<SignUpOutcome, IdentityError> {
        self.take_failure()?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword {
                reason: format!("must be at least {MIN_PASSWORD_LEN} characters"),
            });
        }

        let key = normalize_email(email);
        let user = {
            let mut accounts = lock(&self.accounts);
            if accounts.contains_key(&key) {
                return Err(IdentityError::EmailAlreadyRegistered {
                    email: email.to_string(),
                });
            }
            let user = IdentityUser::new(UserId::new(), Some(email.trim().to_string()))
                .with_declared_role(declared_role);
            accounts.insert(
                key,
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            user
        };

        if let Some(records) = &self.role_records {
            records.insert(user.id(), declared_role);
        }

        if self.confirm_email.load(Ordering::SeqCst) {
            return Ok(SignUpOutcome {
                user,
                session: None,
            });
        }

        let grant = self.grant_for(user);
        *lock(&self.current) = Some(grant.clone());
        self.emit(AuthChange::with_grant(AuthEvent::SignedIn, grant.clone()));
        Ok(SignUpOutcome {
            user: grant.user,
            session: Some(grant.session),
        })
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.take_failure()?;
        *lock(&self.current) = None;
        self.emit(AuthChange::signed_out());
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<SessionGrant>, IdentityError> {
        self.take_failure()?;
        let mut current = lock(&self.current);
        if current.as_ref().is_some_and(|grant| grant.session.is_expired()) {
            debug!("cached session expired");
            *current = None;
        }
        Ok(current.clone())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

/// Role records held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    roles: Mutex<HashMap<UserId, Role>>,
    writes: Mutex<Vec<(UserId, Role)>>,
    lookups: AtomicUsize,
    fail_lookups: AtomicBool,
}

impl InMemoryRoleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record. Not counted as a write.
    pub fn insert(&self, user_id: UserId, role: Role) {
        lock(&self.roles).insert(user_id, role);
    }

    /// Returns the stored role for a user.
    #[must_use]
    pub fn role(&self, user_id: UserId) -> Option<Role> {
        lock(&self.roles).get(&user_id).copied()
    }

    /// Returns every write made through [`RoleStore::set_role`].
    #[must_use]
    pub fn writes(&self) -> Vec<(UserId, Role)> {
        lock(&self.writes).clone()
    }

    /// Returns how many lookups were made.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Makes lookups fail until switched back.
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_role(&self, user_id: UserId) -> Result<Option<Role>, RoleStoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(RoleStoreError::LookupFailed {
                user_id,
                reason: "store unavailable".to_string(),
            });
        }
        Ok(self.role(user_id))
    }

    async fn set_role(&self, user_id: UserId, role: Role) -> Result<(), RoleStoreError> {
        lock(&self.roles).insert(user_id, role);
        lock(&self.writes).push((user_id, role));
        Ok(())
    }
}

/// Router stand-in that keeps a browser-style history stack.
#[derive(Debug)]
pub struct HistoryNavigator {
    history: Mutex<Vec<String>>,
    requests: Mutex<Vec<(String, NavigateOptions)>>,
}

impl HistoryNavigator {
    /// Creates a navigator positioned at `initial`.
    #[must_use]
    pub fn new(initial: &str) -> Self {
        Self {
            history: Mutex::new(vec![initial.to_string()]),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the current path.
    #[must_use]
    pub fn current(&self) -> String {
        lock(&self.history).last().cloned().unwrap_or_default()
    }

    /// Returns the history stack, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    /// Returns every navigation request received.
    #[must_use]
    pub fn requests(&self) -> Vec<(String, NavigateOptions)> {
        lock(&self.requests).clone()
    }
}

impl Navigator for HistoryNavigator {
    fn navigate(&self, path: &str, options: NavigateOptions) {
        lock(&self.requests).push((path.to_string(), options));
        let mut history = lock(&self.history);
        if options.replace {
            history.pop();
        }
        history.push(path.to_string());
        debug!(path, replace = options.replace, "navigated");
    }
}

/// Notification sink that records notifications and logs them.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all notifications in order.
    #[must_use]
    pub fn all(&self) -> Vec<Notification> {
        lock(&self.entries).clone()
    }

    /// Returns the failure notifications.
    #[must_use]
    pub fn failures(&self) -> Vec<Notification> {
        self.all().into_iter().filter(Notification::is_failure).collect()
    }

    /// Returns the success notifications.
    #[must_use]
    pub fn successes(&self) -> Vec<Notification> {
        self.all().into_iter().filter(|n| !n.is_failure()).collect()
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        if notification.is_failure() {
            warn!(title = %notification.title, description = %notification.description, "notification");
        } else {
            info!(title = %notification.title, description = %notification.description, "notification");
        }
        lock(&self.entries).push(notification);
    }
}
