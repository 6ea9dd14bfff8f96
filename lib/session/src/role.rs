//! Account roles.
//!
//! Every account on the marketplace is exactly one of two mutually exclusive
//! roles. The enum is closed: there is no "unknown" or default variant, so a
//! settled role can never take a third value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marketplace account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Posts work and hires freelancers.
    Client,
    /// Takes on work posted by clients.
    Freelancer,
}

impl Role {
    /// Returns the wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Freelancer => "freelancer",
        }
    }

    /// Returns the other role.
    #[must_use]
    pub fn other(&self) -> Self {
        match self {
            Self::Client => Self::Freelancer,
            Self::Freelancer => Self::Client,
        }
    }

    /// Interprets a loosely-typed role value, such as one found in provider
    /// metadata. Anything other than a known role name yields `None`.
    #[must_use]
    pub fn from_declared(value: &serde_json::Value) -> Option<Self> {
        value.as_str().and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known role name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "freelancer" => Ok(Self::Freelancer),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_names_case_insensitively() {
        assert_eq!("client".parse::<Role>(), Ok(Role::Client));
        assert_eq!(" Freelancer ".parse::<Role>(), Ok(Role::Freelancer));
    }

    #[test]
    fn rejects_third_values() {
        let err = "admin".parse::<Role>().unwrap_err();
        assert!(err.to_string().contains("admin"));
    }

    #[test]
    fn declared_value_must_be_a_known_string() {
        assert_eq!(Role::from_declared(&json!("client")), Some(Role::Client));
        assert_eq!(Role::from_declared(&json!("owner")), None);
        assert_eq!(Role::from_declared(&json!(1)), None);
        assert_eq!(Role::from_declared(&serde_json::Value::Null), None);
    }

    #[test]
    fn other_flips_role() {
        assert_eq!(Role::Client.other(), Role::Freelancer);
        assert_eq!(Role::Freelancer.other(), Role::Client);
    }

    #[test]
    fn serialization_format() {
        let json = serde_json::to_string(&Role::Freelancer).expect("serialize");
        assert_eq!(json, "\"freelancer\"");
        let role: Role = serde_json::from_str("\"client\"").expect("deserialize");
        assert_eq!(role, Role::Client);
    }
}
