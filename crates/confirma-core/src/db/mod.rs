//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `trades` - Client trade records and lifecycle transitions
//! - `confirmations` - Bank confirmations and their status transitions
//! - `matches` - Atomic match commit and reversal
//! - `settlement_rules` - Priority-ordered settlement rules
//! - `automation` - Per-client automation settings and scheduled actions
//! - `audit` - Audit log
//!
//! Every status change is a conditional write (`UPDATE ... WHERE status = ?`)
//! inside an immediate transaction; a write that touches no row means another
//! writer got there first and surfaces as `Error::ConcurrentModification`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{ErrorCode, Row};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Field, TradeFields};

mod audit;
mod automation;
mod confirmations;
mod matches;
mod settlement_rules;
mod trades;

pub use automation::ClaimOutcome;
pub use matches::Reversal;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "CONFIRMA_DB_KEY";

/// SQLite timestamp format, always UTC
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"confirma-salt-v1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

/// Format a timestamp the way SQLite's `datetime('now')` does
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Column list for the shared trade/confirmation field set, in `Field::ALL` order
pub(crate) fn field_columns() -> String {
    Field::ALL
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read the shared field set starting at column `offset`
pub(crate) fn fields_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<TradeFields> {
    let mut fields = TradeFields::default();
    for (i, field) in Field::ALL.iter().enumerate() {
        let value: Option<String> = row.get(offset + i)?;
        fields.set(*field, value);
    }
    Ok(fields)
}

/// Field values in `Field::ALL` order, trimmed, blanks as NULL
pub(crate) fn field_values(fields: &TradeFields) -> Vec<Option<String>> {
    Field::ALL
        .iter()
        .map(|f| fields.get(*f).map(|v| v.trim().to_string()))
        .collect()
}

/// `?, ?, ...` with `n` placeholders
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Whether an error is a UNIQUE/CHECK constraint violation
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    /// Opened with a SQLCipher key
    keyed: bool,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `CONFIRMA_DB_KEY` to be set. The database is encrypted using
    /// SQLCipher with a key derived from the passphrase via Argon2.
    ///
    /// Use `new_unencrypted()` for development without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        // Key first, then a busy timeout so immediate transactions queue instead of failing
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
            keyed: passphrase.is_some(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because each pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "confirma_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Whether the database was opened with a key and SQLCipher is active
    pub fn is_encrypted(&self) -> Result<bool> {
        if !self.keyed {
            return Ok(false);
        }
        let conn = self.conn()?;
        let version: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(version.is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Row counts per table, for status output
    pub fn table_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut counts = Vec::new();
        for table in [
            "trades",
            "confirmations",
            "matches",
            "settlement_rules",
            "scheduled_actions",
            "audit_log",
        ] {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            counts.push((table.to_string(), count));
        }
        Ok(counts)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        let fields = Field::ALL
            .iter()
            .map(|f| format!("{} TEXT", f.as_str()))
            .collect::<Vec<_>>()
            .join(",\n                ");

        conn.execute_batch(&format!(
            r#"
            -- WAL mode: readers don't block the single writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Client trade records
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY,
                client_id TEXT NOT NULL,
                {fields},
                status TEXT NOT NULL DEFAULT 'unmatched'
                    CHECK (status IN ('unmatched', 'matched', 'disputed', 'confirmed', 'rejected')),
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_trades_client_status ON trades(client_id, status);

            -- Bank confirmations
            CREATE TABLE IF NOT EXISTS confirmations (
                id INTEGER PRIMARY KEY,
                client_id TEXT NOT NULL,
                {fields},
                sender TEXT,
                subject TEXT,
                received_at TEXT NOT NULL,
                source TEXT,
                fingerprint TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'matched', 'duplicate', 'unrecognized')),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_confirmations_client_status ON confirmations(client_id, status);
            CREATE INDEX IF NOT EXISTS idx_confirmations_fingerprint ON confirmations(client_id, fingerprint);

            -- Trade/confirmation bindings; reversed rows are kept for history
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY,
                client_id TEXT NOT NULL,
                trade_id INTEGER NOT NULL REFERENCES trades(id),
                confirmation_id INTEGER NOT NULL REFERENCES confirmations(id),
                confidence INTEGER NOT NULL CHECK (confidence BETWEEN 0 AND 100),
                classification TEXT NOT NULL CHECK (classification IN ('confirmed', 'disputed')),
                differing_fields TEXT NOT NULL DEFAULT '[]',
                resolved_by TEXT NOT NULL,
                confirmation_prior_status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                reversed_at TEXT
            );

            -- At most one active match per trade and per confirmation
            CREATE UNIQUE INDEX IF NOT EXISTS idx_matches_active_trade
                ON matches(trade_id) WHERE reversed_at IS NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_matches_active_confirmation
                ON matches(confirmation_id) WHERE reversed_at IS NULL;
            CREATE INDEX IF NOT EXISTS idx_matches_client ON matches(client_id);

            -- Priority-ordered settlement rules (priority is dense 1..N per client)
            CREATE TABLE IF NOT EXISTS settlement_rules (
                id INTEGER PRIMARY KEY,
                client_id TEXT NOT NULL,
                priority INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                direction TEXT NOT NULL DEFAULT 'any',
                counterparty TEXT,
                product TEXT NOT NULL,
                modality TEXT NOT NULL,
                settlement_currency TEXT,
                pay_bank TEXT NOT NULL,
                pay_swift TEXT NOT NULL,
                pay_account TEXT NOT NULL,
                pay_currency TEXT,
                receive_bank TEXT NOT NULL,
                receive_swift TEXT NOT NULL,
                receive_account TEXT NOT NULL,
                receive_currency TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(client_id, priority)
            );

            -- Per-client automation toggles (absent row = both disabled)
            CREATE TABLE IF NOT EXISTS automation_settings (
                client_id TEXT PRIMARY KEY,
                auto_confirm_enabled INTEGER NOT NULL DEFAULT 0,
                confirm_delay_minutes INTEGER NOT NULL DEFAULT 0,
                auto_dispute_enabled INTEGER NOT NULL DEFAULT 0,
                dispute_delay_minutes INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Deferred confirm/dispute notifications
            CREATE TABLE IF NOT EXISTS scheduled_actions (
                id INTEGER PRIMARY KEY,
                client_id TEXT NOT NULL,
                match_id INTEGER NOT NULL REFERENCES matches(id),
                kind TEXT NOT NULL CHECK (kind IN ('confirm', 'dispute')),
                fire_at TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'scheduled'
                    CHECK (state IN ('scheduled', 'fired', 'canceled')),
                fired_at TEXT,
                canceled_at TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_scheduled_actions_due ON scheduled_actions(state, fire_at);
            CREATE INDEX IF NOT EXISTS idx_scheduled_actions_match ON scheduled_actions(match_id);

            -- Audit log
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                client_id TEXT NOT NULL,
                timestamp TEXT NOT NULL DEFAULT (datetime('now')),
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_client ON audit_log(client_id, id);
            "#
        ))?;

        Ok(())
    }
}

/// Audit log entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub client_id: String,
    pub timestamp: String,
    pub actor: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}
