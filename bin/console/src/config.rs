//! Console configuration.
//!
//! Loaded via the `config` crate from an optional TOML file, then from
//! `GIGDESK__`-prefixed environment variables (`GIGDESK__SESSION__ROUTES__LOGIN`
//! overrides `session.routes.login`).

use config::{Config, ConfigError, Environment, File};
use gigdesk_session::{Role, SessionConfig};
use serde::Deserialize;
use std::path::Path;

/// Console configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ConsoleConfig {
    /// Session layer configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Accounts seeded into the in-memory identity provider.
    #[serde(default = "default_accounts")]
    pub accounts: Vec<DemoAccount>,

    /// Email and role used for the sign-up step of the walkthrough.
    #[serde(default)]
    pub sign_up: SignUpStep,
}

/// A seeded account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DemoAccount {
    pub email: String,
    pub password: String,
    /// Role stored in the user's metadata.
    #[serde(default)]
    pub declared_role: Option<Role>,
    /// Role stored in the role record.
    #[serde(default)]
    pub persisted_role: Option<Role>,
}

/// The account created during the walkthrough.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignUpStep {
    #[serde(default = "default_sign_up_email")]
    pub email: String,
    #[serde(default = "default_sign_up_password")]
    pub password: String,
    #[serde(default = "default_sign_up_role")]
    pub role: Role,
}

fn default_accounts() -> Vec<DemoAccount> {
    vec![
        DemoAccount {
            email: "client@gigdesk.test".to_string(),
            password: "client-pass".to_string(),
            declared_role: Some(Role::Client),
            persisted_role: Some(Role::Client),
        },
        DemoAccount {
            email: "freelancer@gigdesk.test".to_string(),
            password: "freelancer-pass".to_string(),
            declared_role: Some(Role::Freelancer),
            persisted_role: Some(Role::Freelancer),
        },
        // Record disagrees with metadata; signing in issues a corrective write.
        DemoAccount {
            email: "switched@gigdesk.test".to_string(),
            password: "switched-pass".to_string(),
            declared_role: Some(Role::Freelancer),
            persisted_role: Some(Role::Client),
        },
    ]
}

fn default_sign_up_email() -> String {
    "newcomer@gigdesk.test".to_string()
}

fn default_sign_up_password() -> String {
    "newcomer-pass".to_string()
}

fn default_sign_up_role() -> Role {
    Role::Freelancer
}

impl Default for SignUpStep {
    fn default() -> Self {
        Self {
            email: default_sign_up_email(),
            password: default_sign_up_password(),
            role: default_sign_up_role(),
        }
    }
}

impl ConsoleConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be deserialized.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load_with(None, environment())
    }

    /// Loads configuration from `path`, then environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed, or a variable
    /// cannot be deserialized.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(Some(path), environment())
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder.add_source(env).build()?.try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("GIGDESK")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<config::Map<String, String>>();
        environment().source(Some(source))
    }

    #[test]
    fn empty_sources_yield_defaults() {
        let config = ConsoleConfig::load_with(None, env(&[])).unwrap();

        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.accounts.len(), 3);
        assert_eq!(config.sign_up, SignUpStep::default());
    }

    #[test]
    fn environment_overrides_nested_fields() {
        let config = ConsoleConfig::load_with(
            None,
            env(&[
                ("GIGDESK__SESSION__ROLE_LOOKUP_TIMEOUT_MS", "250"),
                ("GIGDESK__SESSION__ROUTES__LOGIN", "/auth/sign-in"),
                ("GIGDESK__SIGN_UP__ROLE", "client"),
            ]),
        )
        .unwrap();

        assert_eq!(config.session.role_lookup_timeout_ms, 250);
        assert_eq!(config.session.routes.login, "/auth/sign-in");
        assert_eq!(config.session.routes.landing, "/");
        assert_eq!(config.sign_up.role, Role::Client);
    }

    #[test]
    fn file_replaces_accounts() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session.routes]
dashboard = "/home"

[[accounts]]
email = "only@x.com"
password = "secret1"
declared_role = "freelancer"
"#
        )
        .unwrap();

        let config = ConsoleConfig::load_with(Some(file.path()), env(&[])).unwrap();

        assert_eq!(config.session.routes.dashboard, "/home");
        assert_eq!(
            config.accounts,
            vec![DemoAccount {
                email: "only@x.com".to_string(),
                password: "secret1".to_string(),
                declared_role: Some(Role::Freelancer),
                persisted_role: None,
            }]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConsoleConfig::load_with(Some(&dir.path().join("absent.toml")), env(&[]));
        assert!(result.is_err());
    }
}
