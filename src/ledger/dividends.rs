//! Dividend operations.
//!
//! `dividend_id` is dense per portfolio and spans every ticker in it, so
//! "the next id" moves whenever any stock in the portfolio pays out.
//! Orders are scoped per ticker instead; the asymmetry is part of the
//! recorded contract.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use super::{portfolios, reindex, Entity, LedgerError, LedgerResult, PortfolioLedger};
use crate::models::{DividendRecord, PortfolioKey, UserId};

const DIVIDEND_COLS: &str = "dividend_key, portfolio_key, ticker, dividend_id, amount, created";

pub(crate) fn row_to_dividend(row: &rusqlite::Row) -> rusqlite::Result<DividendRecord> {
    Ok(DividendRecord {
        dividend_key: row.get(0)?,
        portfolio_key: row.get(1)?,
        ticker: row.get(2)?,
        dividend_id: row.get(3)?,
        amount: row.get(4)?,
        created: row.get(5)?,
    })
}

fn dividend_in_scope(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    ticker: &str,
    dividend_id: i64,
) -> rusqlite::Result<Option<DividendRecord>> {
    conn.query_row(
        &format!(
            "SELECT {DIVIDEND_COLS} FROM dividends
             WHERE portfolio_key = ?1 AND ticker = ?2 AND dividend_id = ?3"
        ),
        params![portfolio_key, ticker, dividend_id],
        row_to_dividend,
    )
    .optional()
}

pub(crate) fn dividends_in(
    conn: &Connection,
    portfolio_key: PortfolioKey,
) -> rusqlite::Result<Vec<DividendRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT dividend_key, portfolio_key, ticker, dividend_id, amount, created
         FROM dividends WHERE portfolio_key = ?1 ORDER BY dividend_id",
    )?;
    let result = stmt.query_map([portfolio_key], row_to_dividend)?.collect();
    result
}

impl PortfolioLedger {
    pub async fn dividend_exists(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        dividend_id: i64,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };
        Ok(dividend_in_scope(&conn, portfolio.portfolio_key, ticker, dividend_id)?.is_some())
    }

    /// Record a dividend payment and return its dense id. An explicit
    /// `created` must be in the ledger format; `None` stamps now.
    pub async fn add_dividend(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        amount: f64,
        created: Option<String>,
    ) -> LedgerResult<i64> {
        let created = Self::resolve_created(created)?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Err(LedgerError::NotFound(Entity::Portfolio));
        };

        let dividend_id: i64 = tx.query_row(
            "SELECT COUNT(*) FROM dividends WHERE portfolio_key = ?1",
            [portfolio.portfolio_key],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO dividends (portfolio_key, ticker, dividend_id, amount, created)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![portfolio.portfolio_key, ticker, dividend_id, amount, created],
        )?;
        let dividend_key = tx.last_insert_rowid();
        tx.commit()?;

        info!(
            "{user_id} added dividend to portfolio {} : {ticker} <-- {amount} [{dividend_key}]",
            portfolio.portfolio_key
        );
        Ok(dividend_id)
    }

    /// Delete one dividend and renumber the portfolio's remaining ones
    /// in the same transaction.
    pub async fn delete_dividend(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        dividend_id: i64,
    ) -> LedgerResult<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Ok(false);
        };
        let Some(dividend) =
            dividend_in_scope(&tx, portfolio.portfolio_key, ticker, dividend_id)?
        else {
            return Ok(false);
        };

        tx.execute(
            "DELETE FROM dividends WHERE dividend_key = ?1",
            [dividend.dividend_key],
        )?;
        reindex::dividends(&tx, portfolio.portfolio_key)?;
        tx.commit()?;

        info!(
            "{user_id} deleted dividend from portfolio {} : {ticker} <-- {}",
            portfolio.portfolio_key, dividend.dividend_key
        );
        Ok(true)
    }

    pub async fn get_dividend(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        dividend_id: i64,
    ) -> LedgerResult<Option<DividendRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(dividend_in_scope(&conn, portfolio.portfolio_key, ticker, dividend_id)?)
    }

    pub async fn list_dividends(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Vec<DividendRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(Vec::new());
        };
        Ok(dividends_in(&conn, portfolio.portfolio_key)?)
    }

    pub async fn list_dividends_by_ticker(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<Vec<DividendRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare_cached(
            "SELECT dividend_key, portfolio_key, ticker, dividend_id, amount, created
             FROM dividends WHERE portfolio_key = ?1 AND ticker = ?2 ORDER BY dividend_id",
        )?;
        let dividends = stmt
            .query_map(params![portfolio.portfolio_key, ticker], row_to_dividend)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dividends)
    }

    pub async fn dividend_count(&self, user_id: UserId, portfolio_id: i64) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(0);
        };
        let count = conn.query_row(
            "SELECT COUNT(*) FROM dividends WHERE portfolio_key = ?1",
            [portfolio.portfolio_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn dividend_count_by_ticker(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(0);
        };
        let count = conn.query_row(
            "SELECT COUNT(*) FROM dividends WHERE portfolio_key = ?1 AND ticker = ?2",
            params![portfolio.portfolio_key, ticker],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn total_dividend_count(&self) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row("SELECT COUNT(*) FROM dividends", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testutil::open_ledger;

    async fn seeded_ledger() -> PortfolioLedger {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        ledger.create_portfolio(1, "", "").await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_ids_are_dense_across_tickers() {
        let ledger = seeded_ledger().await;

        let a = ledger.add_dividend(1, 0, "ABC", 1.25, None).await.unwrap();
        let b = ledger.add_dividend(1, 0, "XYZ", 0.50, None).await.unwrap();
        let c = ledger.add_dividend(1, 0, "ABC", 1.30, None).await.unwrap();

        // One sequence for the whole portfolio, not one per ticker.
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(ledger.dividend_count(1, 0).await.unwrap(), 3);
        assert_eq!(ledger.dividend_count_by_ticker(1, 0, "ABC").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_renumbers_portfolio_scope() {
        let ledger = seeded_ledger().await;
        ledger.add_dividend(1, 0, "ABC", 1.0, None).await.unwrap();
        ledger.add_dividend(1, 0, "XYZ", 2.0, None).await.unwrap();
        ledger.add_dividend(1, 0, "ABC", 3.0, None).await.unwrap();

        assert!(ledger.delete_dividend(1, 0, "XYZ", 1).await.unwrap());

        let dividends = ledger.list_dividends(1, 0).await.unwrap();
        let view: Vec<(i64, f64)> = dividends.iter().map(|d| (d.dividend_id, d.amount)).collect();
        assert_eq!(view, vec![(0, 1.0), (1, 3.0)]);
    }

    #[tokio::test]
    async fn test_requires_portfolio_and_reports_missing_target() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();

        let err = ledger.add_dividend(1, 0, "ABC", 1.0, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::Portfolio)));

        ledger.create_portfolio(1, "", "").await.unwrap();
        assert!(!ledger.delete_dividend(1, 0, "ABC", 0).await.unwrap());
        assert!(!ledger.dividend_exists(1, 0, "ABC", 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_explicit_timestamp_is_validated() {
        let ledger = seeded_ledger().await;

        let ok = ledger
            .add_dividend(1, 0, "ABC", 1.0, Some("05-10-2024 10:00:00 AM".into()))
            .await;
        assert!(ok.is_ok());

        let bad = ledger
            .add_dividend(1, 0, "ABC", 1.0, Some("soon".into()))
            .await;
        assert!(matches!(bad, Err(LedgerError::InvalidTimestamp(_))));
    }
}
