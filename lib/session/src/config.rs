//! Session layer configuration.
//!
//! All fields have defaults so the configuration can be deserialized from a
//! partial source (an empty table yields the stock route layout).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::role::Role;

/// Configuration for the session store and route guards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Auth-related routes.
    #[serde(default)]
    pub routes: RouteConfig,

    /// Upper bound on a single persisted role lookup, in milliseconds.
    /// A lookup that takes longer is treated as failed.
    #[serde(default = "default_role_lookup_timeout_ms")]
    pub role_lookup_timeout_ms: u64,
}

/// Route table entries the session layer navigates to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Anonymous landing page, used after sign-out.
    #[serde(default = "default_landing")]
    pub landing: String,
    /// Login page, used when a guard finds no user.
    #[serde(default = "default_login")]
    pub login: String,
    /// Generic dashboard entry point, used after sign-in and sign-up.
    #[serde(default = "default_dashboard")]
    pub dashboard: String,
    /// Default page for clients.
    #[serde(default = "default_client_home")]
    pub client_home: String,
    /// Default page for freelancers.
    #[serde(default = "default_freelancer_home")]
    pub freelancer_home: String,
}

fn default_role_lookup_timeout_ms() -> u64 {
    5_000
}

fn default_landing() -> String {
    "/".to_string()
}

fn default_login() -> String {
    "/login".to_string()
}

fn default_dashboard() -> String {
    "/dashboard".to_string()
}

fn default_client_home() -> String {
    "/dashboard/client".to_string()
}

fn default_freelancer_home() -> String {
    "/dashboard/freelancer".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            routes: RouteConfig::default(),
            role_lookup_timeout_ms: default_role_lookup_timeout_ms(),
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            landing: default_landing(),
            login: default_login(),
            dashboard: default_dashboard(),
            client_home: default_client_home(),
            freelancer_home: default_freelancer_home(),
        }
    }
}

impl SessionConfig {
    /// Returns the role lookup timeout.
    #[must_use]
    pub fn role_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.role_lookup_timeout_ms)
    }
}

impl RouteConfig {
    /// Returns the default page for a role.
    #[must_use]
    pub fn home_for(&self, role: Role) -> &str {
        match role {
            Role::Client => &self.client_home,
            Role::Freelancer => &self.freelancer_home,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.routes.landing, "/");
        assert_eq!(config.routes.login, "/login");
        assert_eq!(config.routes.dashboard, "/dashboard");
        assert_eq!(config.role_lookup_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn home_for_each_role() {
        let routes = RouteConfig::default();
        assert_eq!(routes.home_for(Role::Client), "/dashboard/client");
        assert_eq!(routes.home_for(Role::Freelancer), "/dashboard/freelancer");
    }

    #[test]
    fn deserializes_partial_config_with_defaults() {
        let json = r#"{
            "routes": { "login": "/auth/login" },
            "role_lookup_timeout_ms": 250
        }"#;

        let config: SessionConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.routes.login, "/auth/login");
        assert_eq!(config.routes.dashboard, "/dashboard");
        assert_eq!(config.role_lookup_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn deserializes_empty_object() {
        let config: SessionConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config, SessionConfig::default());
    }
}
