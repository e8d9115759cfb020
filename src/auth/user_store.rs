//! User Storage
//! Mission: Persist user accounts with SQLite

use crate::auth::models::User;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a user with this email already exists")]
    DuplicateEmail,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Credential store contract.
///
/// `insert` must be atomic with respect to email uniqueness: two concurrent
/// inserts for the same email must not both succeed.
pub trait CredentialStore: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    fn insert(&self, user: &User) -> Result<(), StoreError>;

    /// Set `last_login` and `updated_at` to `at`. Returns false if no such user.
    fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, created_at, updated_at, last_login";

/// User storage with SQLite backend
pub struct SqliteUserStore {
    db_path: String,
}

impl SqliteUserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open user database at {}", self.db_path))
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_login TEXT
            )",
            [],
        )
        .context("Failed to create users table")?;

        Ok(())
    }

    fn find_one(&self, column: &str, value: &str) -> Result<Option<User>> {
        let conn = self.open()?;
        let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);

        let raw = conn
            .query_row(&sql, params![value], RawUser::from_row)
            .optional()
            .with_context(|| format!("Failed to look up user by {}", column))?;

        raw.map(RawUser::into_user).transpose()
    }
}

impl CredentialStore for SqliteUserStore {
    fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        self.find_one("id", id)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email)
    }

    fn insert(&self, user: &User) -> Result<(), StoreError> {
        let conn = self.open()?;

        let result = conn.execute(
            "INSERT INTO users (id, name, email, password_hash, created_at, updated_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.name,
                user.email,
                user.password_hash,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
                user.last_login.map(|t| t.to_rfc3339()),
            ],
        );

        match result {
            Ok(_) => {
                info!(user_id = %user.id, "✅ Created user");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, Some(msg)))
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    && msg.contains("users.email") =>
            {
                Err(StoreError::DuplicateEmail)
            }
            Err(e) => Err(StoreError::Backend(
                anyhow::Error::new(e).context("Failed to insert user"),
            )),
        }
    }

    fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.open()?;
        let at = at.to_rfc3339();

        let rows = conn
            .execute(
                "UPDATE users SET last_login = ?1, updated_at = ?1 WHERE id = ?2",
                params![at, id],
            )
            .context("Failed to record login")?;

        Ok(rows > 0)
    }
}

/// Row as stored; timestamps are parsed outside the rusqlite closure.
struct RawUser {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    created_at: String,
    updated_at: String,
    last_login: Option<String>,
}

impl RawUser {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            last_login: row.get(6)?,
        })
    }

    fn into_user(self) -> Result<User> {
        Ok(User {
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            last_login: self.last_login.as_deref().map(parse_timestamp).transpose()?,
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp: {}", raw))
}
