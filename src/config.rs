//! Ledger Configuration
//!
//! Explicit configuration handed to `PortfolioLedger::open`. Nothing in
//! the engine reads the environment directly; binaries build a config
//! (usually via `from_env`) and pass it in.

use std::env;

const DEFAULT_DB_FILE: &str = "stockfolio.db";

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Path to the SQLite database file, or ":memory:" for tests.
    pub db_path: String,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
}

impl LedgerConfig {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout_ms: 5_000,
        }
    }

    /// Resolve the database path from `DB_PATH`, falling back to
    /// `DATABASE_PATH`, then to a file in the working directory.
    pub fn from_env() -> Self {
        let db_path = env::var("DB_PATH")
            .or_else(|_| env::var("DATABASE_PATH"))
            .unwrap_or_else(|_| DEFAULT_DB_FILE.to_string());
        Self::new(db_path)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DB_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_working_dir_file() {
        let config = LedgerConfig::default();
        assert_eq!(config.db_path, DEFAULT_DB_FILE);
        assert!(config.busy_timeout_ms > 0);
    }

    #[test]
    fn test_explicit_path_is_kept() {
        let config = LedgerConfig::new(":memory:");
        assert_eq!(config.db_path, ":memory:");
    }
}
