//! Session state and role resolution for gigdesk.
//!
//! This crate provides:
//! - The session store (`SessionStore`), the single owner of the auth state
//! - Role resolution (`RoleResolver`), merging the persisted and declared roles
//! - Route guards (`AuthGuard`, `ClientGuard`, `FreelancerGuard`)
//! - Seams for the identity provider, role store, router, and notifications
//! - In-memory implementations of those seams
//!
//! # Access Control Model
//!
//! Every signed-in user is either a client or a freelancer. The persisted
//! role record is authoritative; the role the user declared at sign-up is a
//! hint used when no record exists yet, and the record is corrected when the
//! two disagree.
//!
//! # Example
//!
//! ```
//! use gigdesk_session::{AuthSnapshot, ClientGuard, GuardDecision, RouteConfig, RouteGuard};
//!
//! let guard = ClientGuard::new(&RouteConfig::default());
//!
//! // Nobody signed in: send them to the login page.
//! let decision = guard.evaluate(&AuthSnapshot::anonymous());
//! assert!(matches!(decision, GuardDecision::Redirect(ref r) if r.to == "/login"));
//!
//! // Still loading: hold.
//! assert_eq!(guard.evaluate(&AuthSnapshot::uninitialized()), GuardDecision::Loading);
//! ```

pub mod config;
pub mod error;
pub mod guard;
pub mod identity;
pub mod memory;
pub mod navigate;
pub mod notify;
pub mod resolver;
pub mod role;
pub mod role_store;
pub mod session;
pub mod snapshot;
pub mod store;
mod sync;
pub mod user;

pub use config::{RouteConfig, SessionConfig};
pub use error::{AuthError, IdentityError, RoleStoreError};
pub use guard::{AuthGuard, ClientGuard, FreelancerGuard, GuardDecision, Redirect, RouteGuard};
pub use identity::{AuthChange, AuthEvent, IdentityClient, SessionGrant, SignUpOutcome};
pub use memory::{HistoryNavigator, InMemoryIdentityClient, InMemoryRoleStore, NotificationLog};
pub use navigate::{NavigateOptions, Navigator};
pub use notify::{Notification, NotificationVariant, Notifier};
pub use resolver::{Reconciliation, Resolution, RoleResolver, RoleSource, reconcile};
pub use role::{Role, UnknownRole};
pub use role_store::RoleStore;
pub use session::Session;
pub use snapshot::{AuthPhase, AuthSnapshot, Readiness};
pub use store::{SessionHandle, SessionStore};
pub use user::{IdentityUser, ROLE_METADATA_KEY};
