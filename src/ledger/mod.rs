//! Portfolio Ledger Engine
//!
//! The single entry point for every mutation and lookup against the
//! portfolio hierarchy (user → portfolio → stock → orders / dividends /
//! options, plus watchlists). Operations accept user-facing identifiers
//! (external user id, dense portfolio id, ticker, dense leaf id),
//! resolve them to immutable surrogate keys, and only then touch rows.
//!
//! Conventions across the surface:
//! - operations that return a record or id report a missing required
//!   parent as `Err(LedgerError::NotFound(..))`;
//! - operations that return `bool` report a missing target as
//!   `Ok(false)` with no side effects;
//! - aggregates return `Ok(None)` when there is nothing to aggregate,
//!   which is distinct from a computed zero;
//! - every multi-statement mutation runs in one IMMEDIATE transaction,
//!   so a failed step rolls the whole operation back.

mod aggregates;
mod dividends;
mod options;
mod orders;
mod portfolios;
mod reindex;
mod schema;
mod stocks;
mod users;
mod watchlists;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::LedgerConfig;
use crate::models::{parse_timestamp, timestamp_now};

/// Entity classes named by `LedgerError::NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Portfolio,
    Stock,
    Order,
    Dividend,
    Option,
    Watchlist,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::User => "user",
            Entity::Portfolio => "portfolio",
            Entity::Stock => "stock",
            Entity::Order => "order",
            Entity::Dividend => "dividend",
            Entity::Option => "option",
            Entity::Watchlist => "watchlist",
        };
        f.write_str(name)
    }
}

/// Failure taxonomy of the ledger surface. Lookup misses on optional
/// targets are NOT errors; they come back as `Ok(None)` / `Ok(false)`.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A parent the operation's contract requires does not exist.
    #[error("{0} not found")]
    NotFound(Entity),
    /// The record store rejected the operation; any open transaction
    /// for the operation has been rolled back.
    #[error("record store rejected the operation: {0}")]
    Write(#[from] rusqlite::Error),
    /// A partial update carried no `Set` field.
    #[error("update carried no fields to change")]
    EmptyUpdate,
    /// A caller-supplied timestamp is not in `MM-DD-YYYY hh:mm:ss AM/PM`.
    #[error("timestamp not in ledger format: {0}")]
    InvalidTimestamp(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Handle to the ledger database. Cheap to clone; all clones share one
/// connection behind a mutex, which serializes every mutation (the
/// engine's single-logical-writer model).
#[derive(Clone)]
pub struct PortfolioLedger {
    conn: Arc<Mutex<Connection>>,
}

impl PortfolioLedger {
    /// Open (or create) the ledger database and bootstrap the schema.
    pub fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let conn = Connection::open(&config.db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        // Cascading deletes depend on this; unlike the tuning pragmas it
        // is not allowed to fail quietly.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        conn.execute_batch(schema::SCHEMA_SQL)?;

        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap_or(0);
        info!("📒 portfolio ledger ready at {} ({users} users)", config.db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Normalize an optional caller-supplied creation timestamp: absent
    /// means "now", present must parse in the ledger format.
    fn resolve_created(supplied: Option<String>) -> LedgerResult<String> {
        match supplied {
            None => Ok(timestamp_now()),
            Some(s) => {
                if parse_timestamp(&s).is_none() {
                    return Err(LedgerError::InvalidTimestamp(s));
                }
                Ok(s)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Fresh in-memory ledger for unit tests.
    pub(crate) fn open_ledger() -> PortfolioLedger {
        PortfolioLedger::open(&LedgerConfig::new(":memory:"))
            .expect("failed to open in-memory ledger")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_creates_schema_on_disk() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_str().unwrap();

        let config = LedgerConfig::new(path);
        let _ledger = PortfolioLedger::open(&config).expect("open failed");

        // Reopening against the same file must not re-create anything.
        let _ledger2 = PortfolioLedger::open(&config).expect("reopen failed");
    }

    #[test]
    fn test_resolve_created_accepts_ledger_format_only() {
        let now = PortfolioLedger::resolve_created(None).unwrap();
        assert!(parse_timestamp(&now).is_some());

        let explicit =
            PortfolioLedger::resolve_created(Some("04-01-2024 09:30:00 AM".into())).unwrap();
        assert_eq!(explicit, "04-01-2024 09:30:00 AM");

        let bad = PortfolioLedger::resolve_created(Some("2024-04-01T09:30:00Z".into()));
        assert!(matches!(bad, Err(LedgerError::InvalidTimestamp(_))));
    }
}
