//! Scripted walkthrough of the session layer against in-memory adapters.
//!
//! Usage: `gigdesk-console [config.toml]`

mod config;

use gigdesk_core::UserId;
use gigdesk_session::{
    AuthGuard, AuthSnapshot, ClientGuard, FreelancerGuard, HistoryNavigator, IdentityUser,
    InMemoryIdentityClient, InMemoryRoleStore, NotificationLog, RouteGuard, SessionStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ConsoleConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => ConsoleConfig::load(&path),
        None => ConsoleConfig::from_env(),
    }
    .expect("failed to load configuration");
    tracing::info!(accounts = config.accounts.len(), "Loaded configuration");

    let roles = Arc::new(InMemoryRoleStore::new());
    let identity = Arc::new(InMemoryIdentityClient::new().with_role_records(roles.clone()));
    for account in &config.accounts {
        let mut user = IdentityUser::new(UserId::new(), Some(account.email.clone()));
        if let Some(role) = account.declared_role {
            user = user.with_declared_role(role);
        }
        if let Some(role) = account.persisted_role {
            roles.insert(user.id(), role);
        }
        identity.register(&account.password, user);
    }

    let notifications = Arc::new(NotificationLog::new());
    let navigator = Arc::new(HistoryNavigator::new(&config.session.routes.landing));
    let routes = config.session.routes.clone();
    let store = SessionStore::new(
        identity.clone(),
        roles.clone(),
        notifications.clone(),
        navigator.clone(),
        config.session,
    );

    let mut handle = store.handle();
    store.start();
    print_snapshot("bootstrap", &handle.settled().await);

    let guards: [(&str, Box<dyn RouteGuard>); 3] = [
        (routes.dashboard.as_str(), Box::new(AuthGuard::new(&routes))),
        (routes.client_home.as_str(), Box::new(ClientGuard::new(&routes))),
        (
            routes.freelancer_home.as_str(),
            Box::new(FreelancerGuard::new(&routes)),
        ),
    ];

    for account in &config.accounts {
        match store.sign_in(&account.email, &account.password).await {
            Ok(snapshot) => print_snapshot(&format!("sign in {}", account.email), &snapshot),
            Err(e) => {
                tracing::warn!(email = %account.email, error = %e, "Sign in failed");
                continue;
            }
        }

        let snapshot = handle.snapshot();
        for (path, guard) in &guards {
            let decision = guard.evaluate(&snapshot);
            tracing::info!(path, ?decision, "Guard evaluated");
        }

        if let Err(e) = store.sign_out().await {
            tracing::warn!(error = %e, "Sign out failed");
        }
        print_snapshot("sign out", &handle.snapshot());
    }

    let step = &config.sign_up;
    match store.sign_up(&step.email, &step.password, step.role).await {
        Ok(snapshot) => print_snapshot(&format!("sign up {}", step.email), &snapshot),
        Err(e) => tracing::warn!(email = %step.email, error = %e, "Sign up failed"),
    }

    store.dispose();

    print_json("navigation", &navigator.history());
    print_json("notifications", &notifications.all());
    tracing::info!(corrective_writes = roles.writes().len(), "Walkthrough complete");
}

fn print_snapshot(label: &str, snapshot: &AuthSnapshot) {
    print_json(label, snapshot);
}

fn print_json<T: serde::Serialize + ?Sized>(label: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("== {label}\n{json}"),
        Err(e) => tracing::warn!(label, error = %e, "Failed to serialize"),
    }
}
