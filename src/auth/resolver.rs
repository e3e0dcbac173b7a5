//! Map a remote identity to a local user, creating it on first login.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::provider::RemoteIdentity;
use crate::users::{InsertError, NewUser, Role, User, UserStore};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to read user: {0:#}")]
    Lookup(anyhow::Error),
    #[error("failed to store user: {0:#}")]
    Store(anyhow::Error),
    #[error("user {0} conflicted on insert but could not be read back")]
    Vanished(String),
}

pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
    default_role: Role,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, default_role: Role) -> Self {
        Self {
            users,
            default_role,
        }
    }

    /// Return the local user for `remote`, creating it if this is its first login.
    ///
    /// Known users get `username` and `avatar_url` refreshed when the provider
    /// reports new values. A concurrent first login for the same `login` is
    /// resolved by the `UNIQUE(login)` constraint: the loser reads the winner's row.
    ///
    /// # Errors
    /// Returns an error if storage fails, or if the row is missing after a conflict.
    pub async fn resolve(&self, remote: &RemoteIdentity) -> Result<User, ResolveError> {
        let username = display_username(remote);
        let avatar_url = remote.avatar_url.clone().unwrap_or_default();

        if let Some(user) = self
            .users
            .find_user_by_login(&remote.login)
            .await
            .map_err(ResolveError::Lookup)?
        {
            return self.refresh(user, &username, &avatar_url).await;
        }

        let new_user = NewUser {
            login: remote.login.clone(),
            username,
            avatar_url,
            role: self.default_role,
        };
        match self.users.insert_user(&new_user).await {
            Ok(user) => {
                info!(user_id = user.id, login = %user.login, "created user on first login");
                Ok(user)
            }
            Err(InsertError::Conflict) => {
                debug!(login = %remote.login, "concurrent first login, reading existing user");
                self.users
                    .find_user_by_login(&remote.login)
                    .await
                    .map_err(ResolveError::Lookup)?
                    .ok_or_else(|| ResolveError::Vanished(remote.login.clone()))
            }
            Err(InsertError::Other(err)) => Err(ResolveError::Store(err)),
        }
    }

    async fn refresh(
        &self,
        user: User,
        username: &str,
        avatar_url: &str,
    ) -> Result<User, ResolveError> {
        if user.username == username && user.avatar_url == avatar_url {
            return Ok(user);
        }
        debug!(user_id = user.id, "refreshing profile fields");
        let login = user.login.clone();
        self.users
            .update_profile(user.id, username, avatar_url)
            .await
            .map_err(ResolveError::Store)?
            .ok_or(ResolveError::Vanished(login))
    }
}

/// Prefer the provider display name, falling back to the login handle.
fn display_username(remote: &RemoteIdentity) -> String {
    remote
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&remote.login)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::storage::memory_pool;
    use crate::users::{SqliteUserStore, UserStore};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn remote(login: &str, name: Option<&str>) -> RemoteIdentity {
        RemoteIdentity {
            provider_user_id: 1001,
            login: login.to_string(),
            display_name: name.map(str::to_string),
            avatar_url: Some(format!("https://avatars.example.test/{login}")),
        }
    }

    async fn sqlite_resolver() -> Result<(IdentityResolver, Arc<SqliteUserStore>)> {
        let store = Arc::new(SqliteUserStore::new(memory_pool().await?));
        let resolver = IdentityResolver::new(store.clone(), Role::Requester);
        Ok((resolver, store))
    }

    #[tokio::test]
    async fn first_login_creates_user_with_default_role() -> Result<()> {
        let store = Arc::new(SqliteUserStore::new(memory_pool().await?));
        let resolver = IdentityResolver::new(store.clone(), Role::Worker);
        let user = resolver.resolve(&remote("alice", Some("Alice"))).await?;
        assert_eq!(user.login, "alice");
        assert_eq!(user.username, "Alice");
        assert_eq!(user.avatar_url, "https://avatars.example.test/alice");
        assert_eq!(user.role, Role::Worker);
        assert_eq!(store.find_user_by_login("alice").await?, Some(user));
        Ok(())
    }

    #[tokio::test]
    async fn second_login_returns_same_user() -> Result<()> {
        let (resolver, _store) = sqlite_resolver().await?;
        let first = resolver.resolve(&remote("alice", Some("Alice"))).await?;
        let second = resolver.resolve(&remote("alice", Some("Alice"))).await?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn later_login_refreshes_profile() -> Result<()> {
        let (resolver, _store) = sqlite_resolver().await?;
        let first = resolver.resolve(&remote("alice", Some("Alice"))).await?;
        let mut renamed = remote("alice", Some("Alice Liddell"));
        renamed.avatar_url = Some("https://avatars.example.test/new".to_string());
        let second = resolver.resolve(&renamed).await?;
        assert_eq!(second.id, first.id);
        assert_eq!(second.username, "Alice Liddell");
        assert_eq!(second.avatar_url, "https://avatars.example.test/new");
        Ok(())
    }

    #[tokio::test]
    async fn missing_name_falls_back_to_login() -> Result<()> {
        let (resolver, _store) = sqlite_resolver().await?;
        let user = resolver.resolve(&remote("bob", None)).await?;
        assert_eq!(user.username, "bob");
        let user = resolver.resolve(&remote("carol", Some("  "))).await?;
        assert_eq!(user.username, "carol");
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_first_logins_share_one_row() -> Result<()> {
        let (resolver, store) = sqlite_resolver().await?;
        let identity = remote("alice", Some("Alice"));
        let (first, second) = tokio::join!(resolver.resolve(&identity), resolver.resolve(&identity));
        let (first, second) = (first?, second?);
        assert_eq!(first.id, second.id);
        assert_eq!(store.find_user_by_login("alice").await?, Some(first));
        Ok(())
    }

    /// Reports "not found" on the first lookup, then conflicts on insert,
    /// simulating a concurrent login that won the race.
    struct RacingStore {
        winner: Mutex<Option<User>>,
        lookups: AtomicUsize,
        row_survives: bool,
    }

    impl RacingStore {
        fn new(row_survives: bool) -> Self {
            Self {
                winner: Mutex::new(None),
                lookups: AtomicUsize::new(0),
                row_survives,
            }
        }
    }

    #[async_trait]
    impl UserStore for RacingStore {
        async fn find_user_by_login(&self, login: &str) -> Result<Option<User>> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 || !self.row_survives {
                return Ok(None);
            }
            let winner = self.winner.lock().map_err(|_| anyhow!("poisoned"))?;
            Ok(winner.clone().filter(|user| user.login == login))
        }

        async fn find_user_by_id(&self, _id: i64) -> Result<Option<User>> {
            Ok(None)
        }

        async fn insert_user(&self, user: &NewUser) -> Result<User, InsertError> {
            let mut winner = self.winner.lock().map_err(|_| anyhow!("poisoned"))?;
            *winner = Some(User {
                id: 7,
                login: user.login.clone(),
                username: "Winner".to_string(),
                avatar_url: String::new(),
                role: Role::Requester,
            });
            Err(InsertError::Conflict)
        }

        async fn update_profile(&self, _id: i64, _u: &str, _a: &str) -> Result<Option<User>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn conflict_falls_back_to_lookup() -> Result<()> {
        let store = Arc::new(RacingStore::new(true));
        let resolver = IdentityResolver::new(store.clone(), Role::Requester);
        let user = resolver.resolve(&remote("alice", Some("Alice"))).await?;
        assert_eq!(user.id, 7);
        assert_eq!(user.username, "Winner");
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn conflict_without_row_is_an_error() -> Result<()> {
        let resolver = IdentityResolver::new(Arc::new(RacingStore::new(false)), Role::Requester);
        let err = resolver.resolve(&remote("alice", None)).await;
        assert!(matches!(err, Err(ResolveError::Vanished(ref login)) if login == "alice"));
        Ok(())
    }
}
