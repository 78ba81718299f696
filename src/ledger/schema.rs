//! Ledger Schema
//!
//! All DDL lives here; `PortfolioLedger::open` runs it once per
//! connection. Surrogate keys are AUTOINCREMENT rowids so SQLite's
//! sequence table guarantees they are never reused after a delete;
//! dense user-visible ids renumber freely on top of them.

/// Schema for the six ledger tables plus the watchlist membership pair.
pub(crate) const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    created TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS portfolios (
    portfolio_key INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    portfolio_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    created TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_portfolios_user
    ON portfolios(user_id, portfolio_id);

CREATE TABLE IF NOT EXISTS stocks (
    stock_key INTEGER PRIMARY KEY AUTOINCREMENT,
    portfolio_key INTEGER NOT NULL REFERENCES portfolios(portfolio_key) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    created TEXT NOT NULL,
    UNIQUE (portfolio_key, ticker)
);

CREATE TABLE IF NOT EXISTS orders (
    order_key INTEGER PRIMARY KEY AUTOINCREMENT,
    portfolio_key INTEGER NOT NULL REFERENCES portfolios(portfolio_key) ON DELETE CASCADE,
    stock_key INTEGER NOT NULL REFERENCES stocks(stock_key) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    order_id INTEGER NOT NULL,
    price REAL NOT NULL,
    quantity REAL NOT NULL,
    status TEXT NOT NULL,
    side TEXT NOT NULL,
    created TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_scope
    ON orders(portfolio_key, ticker, order_id);

CREATE TABLE IF NOT EXISTS dividends (
    dividend_key INTEGER PRIMARY KEY AUTOINCREMENT,
    portfolio_key INTEGER NOT NULL REFERENCES portfolios(portfolio_key) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    dividend_id INTEGER NOT NULL,
    amount REAL NOT NULL,
    created TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dividends_scope
    ON dividends(portfolio_key, dividend_id);

CREATE TABLE IF NOT EXISTS options (
    option_key INTEGER PRIMARY KEY AUTOINCREMENT,
    portfolio_key INTEGER NOT NULL REFERENCES portfolios(portfolio_key) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    option_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    strike REAL NOT NULL,
    premium REAL NOT NULL,
    quantity REAL NOT NULL,
    expires TEXT NOT NULL,
    status TEXT NOT NULL,
    gain_loss REAL,
    created TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_options_scope
    ON options(portfolio_key, option_id);

CREATE TABLE IF NOT EXISTS watchlists (
    watchlist_key INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    watchlist_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    created TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_watchlists_user
    ON watchlists(user_id, watchlist_id);

CREATE TABLE IF NOT EXISTS watching (
    watchlist_key INTEGER NOT NULL REFERENCES watchlists(watchlist_key) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    PRIMARY KEY (watchlist_key, ticker)
);
"#;

/// SQL expression rebuilding a lexically sortable `YYYYMMDDHHMMSS` key
/// from a stored `MM-DD-YYYY hh:mm:ss AM/PM` timestamp. The 12-hour
/// clock folds as hour % 12 plus 12 for PM, so 12 AM sorts as 00 and
/// 12 PM as 12.
///
/// Column positions (1-based): MM=1, DD=4, YYYY=7, hh=12, mm=15, ss=18,
/// AM/PM=21.
pub(crate) const CREATED_SORT_EXPR: &str = "substr(created, 7, 4) || substr(created, 1, 2) || substr(created, 4, 2) \
     || printf('%02d', (CAST(substr(created, 12, 2) AS INTEGER) % 12) \
        + (CASE WHEN substr(created, 21, 2) = 'PM' THEN 12 ELSE 0 END)) \
     || substr(created, 15, 2) || substr(created, 18, 2)";

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn sort_key(conn: &Connection, created: &str) -> String {
        let sql = format!(
            "SELECT {CREATED_SORT_EXPR} FROM (SELECT ?1 AS created)"
        );
        conn.query_row(&sql, [created], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_schema_bootstraps_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        // Second run must be a no-op, not an error.
        conn.execute_batch(SCHEMA_SQL).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('users','portfolios','stocks','orders','dividends','options','watchlists','watching')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 8);
    }

    #[test]
    fn test_sort_key_rebuilds_chronological_order() {
        let conn = Connection::open_in_memory().unwrap();

        assert_eq!(sort_key(&conn, "01-15-2026 03:04:05 PM"), "20260115150405");
        assert_eq!(sort_key(&conn, "01-15-2026 03:04:05 AM"), "20260115030405");
        // Noon and midnight are the classic 12-hour traps.
        assert_eq!(sort_key(&conn, "01-15-2026 12:00:00 AM"), "20260115000000");
        assert_eq!(sort_key(&conn, "01-15-2026 12:00:00 PM"), "20260115120000");

        // Lexicographic order of keys == chronological order of inputs.
        let stamps = [
            "12-31-2025 11:59:59 PM",
            "01-01-2026 12:00:00 AM",
            "01-01-2026 11:59:59 AM",
            "01-01-2026 12:00:00 PM",
            "01-01-2026 01:00:00 PM",
        ];
        let keys: Vec<String> = stamps.iter().map(|s| sort_key(&conn, s)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
