//! Option position operations.
//!
//! Like dividends, `option_id` is dense per portfolio across tickers.
//! Settling (close / expire / exercise) is the only path that writes
//! `gain_loss`; plain updates cannot touch it.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use super::{
    portfolios, reindex, stocks, Entity, LedgerError, LedgerResult, PortfolioLedger,
};
use crate::models::{
    NewOption, OptionKind, OptionRecord, OptionStatus, OptionUpdate, PortfolioKey, UserId,
};

const OPTION_COLS: &str = "option_key, portfolio_key, ticker, option_id, kind, strike, premium, quantity, expires, status, gain_loss, created";

pub(crate) fn row_to_option(row: &rusqlite::Row) -> rusqlite::Result<OptionRecord> {
    Ok(OptionRecord {
        option_key: row.get(0)?,
        portfolio_key: row.get(1)?,
        ticker: row.get(2)?,
        option_id: row.get(3)?,
        kind: row.get(4)?,
        strike: row.get(5)?,
        premium: row.get(6)?,
        quantity: row.get(7)?,
        expires: row.get(8)?,
        status: row.get(9)?,
        gain_loss: row.get(10)?,
        created: row.get(11)?,
    })
}

fn option_in_scope(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    ticker: &str,
    option_id: i64,
) -> rusqlite::Result<Option<OptionRecord>> {
    conn.query_row(
        &format!(
            "SELECT {OPTION_COLS} FROM options
             WHERE portfolio_key = ?1 AND ticker = ?2 AND option_id = ?3"
        ),
        params![portfolio_key, ticker, option_id],
        row_to_option,
    )
    .optional()
}

impl PortfolioLedger {
    pub async fn option_exists(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        option_id: i64,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };
        Ok(option_in_scope(&conn, portfolio.portfolio_key, ticker, option_id)?.is_some())
    }

    /// Record an option position against an existing stock and return
    /// its dense id.
    pub async fn add_option(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        option: NewOption,
    ) -> LedgerResult<i64> {
        let created = Self::resolve_created(option.created)?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Err(LedgerError::NotFound(Entity::Portfolio));
        };
        if stocks::stock_by_path(&tx, portfolio.portfolio_key, ticker)?.is_none() {
            return Err(LedgerError::NotFound(Entity::Stock));
        }

        let option_id: i64 = tx.query_row(
            "SELECT COUNT(*) FROM options WHERE portfolio_key = ?1",
            [portfolio.portfolio_key],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO options (portfolio_key, ticker, option_id, kind, strike, premium, quantity, expires, status, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                portfolio.portfolio_key,
                ticker,
                option_id,
                option.kind,
                option.strike,
                option.premium,
                option.quantity,
                option.expires,
                option.status,
                created,
            ],
        )?;
        let option_key = tx.last_insert_rowid();
        tx.commit()?;

        info!(
            "{user_id} added option to portfolio {} : {ticker} <-- {option_key}",
            portfolio.portfolio_key
        );
        Ok(option_id)
    }

    /// Field-wise merge over the mutable option fields. `gain_loss`
    /// stays untouched; use the settle transitions for it.
    pub async fn update_option(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        option_id: i64,
        update: OptionUpdate,
    ) -> LedgerResult<bool> {
        if update.is_empty() {
            return Err(LedgerError::EmptyUpdate);
        }

        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };
        let Some(stored) = option_in_scope(&conn, portfolio.portfolio_key, ticker, option_id)?
        else {
            return Ok(false);
        };

        let kind = update.kind.or_stored(stored.kind);
        let strike = update.strike.or_stored(stored.strike);
        let premium = update.premium.or_stored(stored.premium);
        let quantity = update.quantity.or_stored(stored.quantity);
        let expires = update.expires.or_stored(stored.expires);
        let status = update.status.or_stored(stored.status);

        conn.execute(
            "UPDATE options SET kind = ?1, strike = ?2, premium = ?3, quantity = ?4, expires = ?5, status = ?6
             WHERE option_key = ?7",
            params![kind, strike, premium, quantity, expires, status, stored.option_key],
        )?;

        info!(
            "{user_id} updated option in portfolio {} : {ticker} <-- {option_id}",
            portfolio.portfolio_key
        );
        Ok(true)
    }

    /// Delete one option and renumber the portfolio's remaining ones in
    /// the same transaction.
    pub async fn delete_option(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        option_id: i64,
    ) -> LedgerResult<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Ok(false);
        };
        let Some(option) = option_in_scope(&tx, portfolio.portfolio_key, ticker, option_id)?
        else {
            return Ok(false);
        };

        tx.execute("DELETE FROM options WHERE option_key = ?1", [option.option_key])?;
        reindex::options(&tx, portfolio.portfolio_key)?;
        tx.commit()?;

        info!(
            "{user_id} deleted option from portfolio {} : {ticker} <-- {}",
            portfolio.portfolio_key, option.option_key
        );
        Ok(true)
    }

    async fn settle_option(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        option_id: i64,
        status: OptionStatus,
        gain_loss: f64,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };
        let Some(option) = option_in_scope(&conn, portfolio.portfolio_key, ticker, option_id)?
        else {
            return Ok(false);
        };

        conn.execute(
            "UPDATE options SET status = ?1, gain_loss = ?2 WHERE option_key = ?3",
            params![status, gain_loss, option.option_key],
        )?;

        info!(
            "{user_id} {} option in portfolio {} : {ticker} <-- {}",
            status.as_str().to_lowercase(),
            portfolio.portfolio_key,
            option.option_key
        );
        Ok(true)
    }

    /// Mark an option Closed and record the realized figure.
    pub async fn close_option(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        option_id: i64,
        gain_loss: f64,
    ) -> LedgerResult<bool> {
        self.settle_option(user_id, portfolio_id, ticker, option_id, OptionStatus::Closed, gain_loss)
            .await
    }

    /// Mark an option Expired and record the realized figure.
    pub async fn expire_option(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        option_id: i64,
        gain_loss: f64,
    ) -> LedgerResult<bool> {
        self.settle_option(user_id, portfolio_id, ticker, option_id, OptionStatus::Expired, gain_loss)
            .await
    }

    /// Mark an option Exercised and record the realized figure.
    pub async fn exercise_option(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        option_id: i64,
        gain_loss: f64,
    ) -> LedgerResult<bool> {
        self.settle_option(user_id, portfolio_id, ticker, option_id, OptionStatus::Exercised, gain_loss)
            .await
    }

    pub async fn get_option(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        option_id: i64,
    ) -> LedgerResult<Option<OptionRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(option_in_scope(&conn, portfolio.portfolio_key, ticker, option_id)?)
    }

    pub async fn list_options(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Vec<OptionRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare_cached(
            "SELECT option_key, portfolio_key, ticker, option_id, kind, strike, premium, quantity, expires, status, gain_loss, created
             FROM options WHERE portfolio_key = ?1 ORDER BY option_id",
        )?;
        let options = stmt
            .query_map([portfolio.portfolio_key], row_to_option)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(options)
    }

    pub async fn list_options_by_ticker(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<Vec<OptionRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare_cached(
            "SELECT option_key, portfolio_key, ticker, option_id, kind, strike, premium, quantity, expires, status, gain_loss, created
             FROM options WHERE portfolio_key = ?1 AND ticker = ?2 ORDER BY option_id",
        )?;
        let options = stmt
            .query_map(params![portfolio.portfolio_key, ticker], row_to_option)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(options)
    }

    pub async fn option_count(&self, user_id: UserId, portfolio_id: i64) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(0);
        };
        let count = conn.query_row(
            "SELECT COUNT(*) FROM options WHERE portfolio_key = ?1",
            [portfolio.portfolio_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn option_count_by_ticker(
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
            "SELECT COUNT(*) FROM options WHERE portfolio_key = ?1 AND ticker = ?2",
            params![portfolio.portfolio_key, ticker],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn total_option_count(&self) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row("SELECT COUNT(*) FROM options", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Calls held for a ticker. A plain filtered count, not weighted.
    pub async fn call_count(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<i64> {
        self.kind_count(user_id, portfolio_id, ticker, OptionKind::Call)
            .await
    }

    /// Puts held for a ticker.
    pub async fn put_count(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<i64> {
        self.kind_count(user_id, portfolio_id, ticker, OptionKind::Put)
            .await
    }

    async fn kind_count(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        kind: OptionKind,
    ) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(0);
        };
        let count = conn.query_row(
            "SELECT COUNT(*) FROM options WHERE portfolio_key = ?1 AND ticker = ?2 AND kind = ?3",
            params![portfolio.portfolio_key, ticker, kind],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
