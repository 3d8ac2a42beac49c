//! Token holder registry.
//!
//! When Vault is initialized the generated root token and unseal keys are
//! recorded against the people who hold them. Delivering tokens to their
//! holders happens elsewhere; this module only persists the assignment.

use chrono::{DateTime, Utc};
use log::{debug, info};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Root,
    Unseal,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Root => "root",
            TokenType::Unseal => "unseal",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "root" => Some(TokenType::Root),
            "unseal" => Some(TokenType::Unseal),
            _ => None,
        }
    }
}

/// A person entrusted with the root token or one unseal key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHolder {
    pub email: String,
    pub token: String,
    pub token_type: TokenType,
    pub date_created: DateTime<Utc>,
    pub date_initialized: Option<DateTime<Utc>>,
    pub date_delivered: Option<DateTime<Utc>>,
}

impl TokenHolder {
    pub fn new(
        email: &str,
        token: &str,
        token_type: TokenType,
        initialized: DateTime<Utc>,
    ) -> Self {
        Self {
            email: email.to_string(),
            token: token.to_string(),
            token_type,
            date_created: Utc::now(),
            date_initialized: Some(initialized),
            date_delivered: None,
        }
    }
}

// Token material stays out of logs and error messages.
impl fmt::Debug for TokenHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenHolder")
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("date_created", &self.date_created)
            .field("date_initialized", &self.date_initialized)
            .field("date_delivered", &self.date_delivered)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HolderError {
    #[error("holder database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("holder database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("holder record for {0} is corrupt")]
    Corrupt(String),

    #[error("holder database task failed: {0}")]
    Task(String),
}

/// Runs a blocking registry call on tokio's blocking pool.
pub async fn run_blocking<T, F>(call: F) -> Result<T, HolderError>
where
    F: FnOnce() -> Result<T, HolderError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| HolderError::Task(e.to_string()))?
}

/// Write-only sink for the holders produced by an init.
pub trait TokenHolderSink: Send + Sync {
    fn save_holders(&self, holders: &[TokenHolder]) -> Result<(), HolderError>;

    /// Confirms the backing store is usable. Used by the readiness probe.
    fn check(&self) -> Result<(), HolderError> {
        Ok(())
    }
}

/// SQLite-backed holder registry.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: Arc<DbPool>,
}

impl DatabaseManager {
    /// Opens (or creates) the registry at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, HolderError> {
        let manager = SqliteConnectionManager::file(db_path.as_ref());
        Self::with_pool(Pool::new(manager)?)
    }

    /// A private in-memory registry. The pool holds a single connection so
    /// every caller sees the same database.
    pub fn in_memory() -> Result<Self, HolderError> {
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())?;
        Self::with_pool(pool)
    }

    fn with_pool(pool: DbPool) -> Result<Self, HolderError> {
        let connection = pool.get()?;
        Self::init_database(&connection)?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn init_database(conn: &DbConnection) -> Result<(), HolderError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS token_holders (
                email TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                token_type TEXT NOT NULL,
                date_created TEXT NOT NULL,
                date_initialized TEXT,
                date_delivered TEXT
            )",
            [],
        )?;
        info!("Token holder database initialized");
        Ok(())
    }

    pub fn get_holder(&self, email: &str) -> Result<Option<TokenHolder>, HolderError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT email, token, token_type, date_created, date_initialized, date_delivered
                 FROM token_holders WHERE email = ?1",
                params![email],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((email, token, token_type, created, initialized, delivered)) = row else {
            return Ok(None);
        };

        let corrupt = || HolderError::Corrupt(email.clone());
        let parse = |raw: &str| {
            DateTime::parse_from_rfc3339(raw)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|_| corrupt())
        };

        Ok(Some(TokenHolder {
            token_type: TokenType::parse(&token_type).ok_or_else(&corrupt)?,
            date_created: parse(&created)?,
            date_initialized: initialized.as_deref().map(parse).transpose()?,
            date_delivered: delivered.as_deref().map(parse).transpose()?,
            token,
            email: email.clone(),
        }))
    }

    pub fn holder_count(&self) -> Result<i64, HolderError> {
        let conn = self.pool.get()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM token_holders", [], |row| row.get(0))?)
    }
}

impl TokenHolderSink for DatabaseManager {
    fn save_holders(&self, holders: &[TokenHolder]) -> Result<(), HolderError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for holder in holders {
            tx.execute(
                "INSERT OR REPLACE INTO token_holders (
                    email, token, token_type, date_created, date_initialized, date_delivered
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    holder.email,
                    holder.token,
                    holder.token_type.as_str(),
                    holder.date_created.to_rfc3339(),
                    holder.date_initialized.map(|d| d.to_rfc3339()),
                    holder.date_delivered.map(|d| d.to_rfc3339()),
                ],
            )?;
            debug!("Recorded {} holder {}", holder.token_type.as_str(), holder.email);
        }
        tx.commit()?;
        info!("Saved {} token holders", holders.len());
        Ok(())
    }

    fn check(&self) -> Result<(), HolderError> {
        self.holder_count().map(|_| ())
    }
}
