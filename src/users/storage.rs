//! SQLite-backed user storage.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::Instrument;

use super::{InsertError, NewUser, Role, User, UserStore};

const USERS_SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        login TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL,
        avatar_url TEXT NOT NULL DEFAULT '',
        role TEXT NOT NULL DEFAULT 'requester'
    )
";

/// Create the users table if it does not exist yet.
///
/// # Errors
/// Returns an error if the statement fails.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "CREATE TABLE",
        db.statement = USERS_SCHEMA
    );
    sqlx::query(USERS_SCHEMA)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to create users table")?;
    Ok(())
}

#[derive(Clone, Debug)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let query = r"
            SELECT id, login, username, avatar_url, role
            FROM users
            WHERE login = ?
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(login)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up user by login")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let query = r"
            SELECT id, login, username, avatar_url, role
            FROM users
            WHERE id = ?
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up user by id")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, InsertError> {
        let query = r"
            INSERT INTO users (login, username, avatar_url, role)
            VALUES (?, ?, ?, ?)
            RETURNING id, login, username, avatar_url, role
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&user.login)
            .bind(&user.username)
            .bind(&user.avatar_url)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(user_from_row(&row)?),
            Err(err) if is_unique_violation(&err) => Err(InsertError::Conflict),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert user")
                .into()),
        }
    }

    async fn update_profile(
        &self,
        id: i64,
        username: &str,
        avatar_url: &str,
    ) -> Result<Option<User>> {
        let query = r"
            UPDATE users
            SET username = ?, avatar_url = ?
            WHERE id = ?
            RETURNING id, login, username, avatar_url, role
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "sqlite",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .bind(avatar_url)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to update user profile")?;
        row.as_ref().map(user_from_row).transpose()
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        login: row.try_get("login")?,
        username: row.try_get("username")?,
        avatar_url: row.try_get("avatar_url")?,
        role: role
            .parse::<Role>()
            .map_err(|err| anyhow!("stored user has {err}"))?,
    })
}

/// SQLite reports `UNIQUE` failures as extended code 2067 and primary key
/// failures as 1555.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                || db_err
                    .code()
                    .is_some_and(|code| matches!(code.as_ref(), "2067" | "1555"))
        }
        _ => false,
    }
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> Result<SqlitePool> {
    use sqlx::sqlite::SqlitePoolOptions;

    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}
