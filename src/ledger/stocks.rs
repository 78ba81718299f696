//! Stock rows.
//!
//! A stock exists under a portfolio exactly while something references
//! its ticker; callers create it before the first order/option and the
//! row carries no dense index of its own. (portfolio_key, ticker) is
//! the identity.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::{portfolios, Entity, LedgerError, LedgerResult, PortfolioLedger};
use crate::models::{timestamp_now, PortfolioKey, StockRecord, UserId};

pub(crate) fn row_to_stock(row: &rusqlite::Row) -> rusqlite::Result<StockRecord> {
    Ok(StockRecord {
        stock_key: row.get(0)?,
        portfolio_key: row.get(1)?,
        ticker: row.get(2)?,
        created: row.get(3)?,
    })
}

/// Resolve a (portfolio_key, ticker) pair to its stock row.
pub(crate) fn stock_by_path(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    ticker: &str,
) -> rusqlite::Result<Option<StockRecord>> {
    conn.query_row(
        "SELECT stock_key, portfolio_key, ticker, created
         FROM stocks WHERE portfolio_key = ?1 AND ticker = ?2",
        params![portfolio_key, ticker],
        row_to_stock,
    )
    .optional()
}

pub(crate) fn stocks_in(
    conn: &Connection,
    portfolio_key: PortfolioKey,
) -> rusqlite::Result<Vec<StockRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT stock_key, portfolio_key, ticker, created
         FROM stocks WHERE portfolio_key = ?1 ORDER BY ticker",
    )?;
    let result = stmt.query_map([portfolio_key], row_to_stock)?.collect();
    result
}

impl PortfolioLedger {
    pub async fn stock_exists(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };
        Ok(stock_by_path(&conn, portfolio.portfolio_key, ticker)?.is_some())
    }

    /// Create the stock row for a ticker and return the portfolio's
    /// resulting stock count. Whether the ticker is already present is a
    /// caller-checked precondition; the store's unique key is the only
    /// enforcement here.
    pub async fn add_stock(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Err(LedgerError::NotFound(Entity::Portfolio));
        };

        conn.execute(
            "INSERT INTO stocks (portfolio_key, ticker, created) VALUES (?1, ?2, ?3)",
            params![portfolio.portfolio_key, ticker, timestamp_now()],
        )?;

        info!(
            "{user_id} added stock to portfolio {} : {ticker}",
            portfolio.portfolio_key
        );

        let count = conn.query_row(
            "SELECT COUNT(*) FROM stocks WHERE portfolio_key = ?1",
            [portfolio.portfolio_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Remove a stock row and, through the store's cascades, its orders.
    pub async fn delete_stock(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };

        let deleted = conn.execute(
            "DELETE FROM stocks WHERE portfolio_key = ?1 AND ticker = ?2",
            params![portfolio.portfolio_key, ticker],
        )?;
        if deleted == 0 {
            return Ok(false);
        }

        info!(
            "{user_id} deleted stock from portfolio {} : {ticker}",
            portfolio.portfolio_key
        );
        Ok(true)
    }

    pub async fn get_stock(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<Option<StockRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(stock_by_path(&conn, portfolio.portfolio_key, ticker)?)
    }

    pub async fn list_stocks(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Vec<StockRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(Vec::new());
        };
        Ok(stocks_in(&conn, portfolio.portfolio_key)?)
    }

    pub async fn stock_count(&self, user_id: UserId, portfolio_id: i64) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(0);
        };
        let count = conn.query_row(
            "SELECT COUNT(*) FROM stocks WHERE portfolio_key = ?1",
            [portfolio.portfolio_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All tickers tracked under a portfolio.
    pub async fn portfolio_tickers(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Vec<String>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare_cached(
            "SELECT ticker FROM stocks WHERE portfolio_key = ?1 ORDER BY ticker",
        )?;
        let tickers = stmt
            .query_map([portfolio.portfolio_key], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tickers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testutil::open_ledger;

    #[tokio::test]
    async fn test_add_and_list() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        ledger.create_portfolio(1, "", "").await.unwrap();

        assert_eq!(ledger.add_stock(1, 0, "MSFT").await.unwrap(), 1);
        assert_eq!(ledger.add_stock(1, 0, "AAPL").await.unwrap(), 2);

        assert!(ledger.stock_exists(1, 0, "MSFT").await.unwrap());
        assert!(!ledger.stock_exists(1, 0, "TSLA").await.unwrap());
        assert_eq!(
            ledger.portfolio_tickers(1, 0).await.unwrap(),
            vec!["AAPL", "MSFT"]
        );
    }

    #[tokio::test]
    async fn test_add_requires_portfolio() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        let err = ledger.add_stock(1, 0, "MSFT").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::Portfolio)));
    }

    #[tokio::test]
    async fn test_duplicate_ticker_is_a_store_rejection() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        ledger.create_portfolio(1, "", "").await.unwrap();
        ledger.add_stock(1, 0, "MSFT").await.unwrap();

        let err = ledger.add_stock(1, 0, "MSFT").await.unwrap_err();
        assert!(matches!(err, LedgerError::Write(_)));
    }

    #[tokio::test]
    async fn test_delete_stock() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        ledger.create_portfolio(1, "", "").await.unwrap();
        ledger.add_stock(1, 0, "MSFT").await.unwrap();

        assert!(ledger.delete_stock(1, 0, "MSFT").await.unwrap());
        assert!(!ledger.delete_stock(1, 0, "MSFT").await.unwrap());
        assert_eq!(ledger.stock_count(1, 0).await.unwrap(), 0);
    }
}
