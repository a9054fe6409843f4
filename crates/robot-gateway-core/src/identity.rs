//! Users, roles and the identity collaborator.

use std::{collections::HashMap, fmt, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque user identifier issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Identifier used for entries the gateway records on its own behalf.
    pub const SYSTEM: &'static str = "system";

    /// Create a user id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The gateway's own identity.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Self::SYSTEM)
    }

    /// Borrow as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User role, assigned when the account is provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May additionally read the operation log.
    Admin,
    /// May operate the robot.
    Operator,
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "operator" | "user" => Ok(Self::Operator),
            other => Err(IdentityError::UnknownRole(other.to_string())),
        }
    }
}

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
}

impl User {
    /// Create a user.
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            role,
        }
    }

    /// Whether the user holds the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Identity error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Missing credentials")]
    MissingCredentials,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    #[error("Identity service error: {0}")]
    Service(String),
}

/// Trait for the external identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to a user.
    async fn authenticate(&self, token: &str) -> Result<User, IdentityError>;
}

/// Identity provider backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    tokens: HashMap<String, User>,
}

impl StaticIdentity {
    /// Create an empty token table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a user.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user: User) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }

    /// Parse a table of `token:user_id:role` entries separated by commas.
    ///
    /// # Errors
    /// Returns error if an entry is malformed or names an unknown role.
    pub fn parse(table: &str) -> Result<Self, IdentityError> {
        let mut identity = Self::new();
        for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let (Some(token), Some(id), Some(role)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(IdentityError::Service(format!(
                    "malformed token entry {entry:?}"
                )));
            };
            if token.is_empty() || id.is_empty() {
                return Err(IdentityError::Service(format!(
                    "malformed token entry {entry:?}"
                )));
            }
            identity = identity.with_token(token, User::new(id, role.parse()?));
        }
        Ok(identity)
    }

    /// Number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn authenticate(&self, token: &str) -> Result<User, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::MissingCredentials);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(IdentityError::InvalidCredentials)
    }
}
