//! Local user records and the storage interface the login flow relies on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

pub mod storage;

pub use storage::{SqliteUserStore, ensure_schema};

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Requester,
    Worker,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "requester" => Ok(Self::Requester),
            "worker" => Ok(Self::Worker),
            _ => Err(UnknownRole(value.to_string())),
        }
    }
}

/// A user known to this service. `login` is the provider's immutable handle.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub username: String,
    pub avatar_url: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub login: String,
    pub username: String,
    pub avatar_url: String,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum InsertError {
    #[error("a user with this login already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_login(&self, login: &str) -> anyhow::Result<Option<User>>;

    async fn find_user_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;

    /// Insert a new user. A duplicate `login` yields `InsertError::Conflict`.
    async fn insert_user(&self, user: &NewUser) -> Result<User, InsertError>;

    async fn update_profile(
        &self,
        id: i64,
        username: &str,
        avatar_url: &str,
    ) -> anyhow::Result<Option<User>>;
}
