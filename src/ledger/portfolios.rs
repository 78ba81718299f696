//! Portfolio operations.
//!
//! `portfolio_id` is the user-visible dense index; `portfolio_key` is
//! the immutable surrogate every child row hangs off. Deleting a
//! portfolio shifts all later ids down by one; callers are expected to
//! surface that to users.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use super::{reindex, users, Entity, LedgerError, LedgerResult, PortfolioLedger};
use crate::models::{timestamp_now, PortfolioRecord, UserId};

const DEFAULT_DESCRIPTION: &str = "No description provided.";

const PORTFOLIO_COLS: &str = "portfolio_key, user_id, portfolio_id, name, description, created";

pub(crate) fn row_to_portfolio(row: &rusqlite::Row) -> rusqlite::Result<PortfolioRecord> {
    Ok(PortfolioRecord {
        portfolio_key: row.get(0)?,
        user_id: row.get(1)?,
        portfolio_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        created: row.get(5)?,
    })
}

/// Resolve a user-facing (user_id, portfolio_id) pair to its row.
pub(crate) fn portfolio_by_path(
    conn: &Connection,
    user_id: UserId,
    portfolio_id: i64,
) -> rusqlite::Result<Option<PortfolioRecord>> {
    conn.query_row(
        &format!(
            "SELECT {PORTFOLIO_COLS} FROM portfolios WHERE user_id = ?1 AND portfolio_id = ?2"
        ),
        params![user_id, portfolio_id],
        row_to_portfolio,
    )
    .optional()
}

impl PortfolioLedger {
    /// Create a portfolio at the next dense position. Empty name and
    /// description fall back to placeholders.
    pub async fn create_portfolio(
        &self,
        user_id: UserId,
        name: &str,
        description: &str,
    ) -> LedgerResult<PortfolioRecord> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if users::user_row(&tx, user_id)?.is_none() {
            return Err(LedgerError::NotFound(Entity::User));
        }

        let portfolio_id: i64 = tx.query_row(
            "SELECT COUNT(*) FROM portfolios WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;

        let name = if name.is_empty() {
            format!("Portfolio {portfolio_id}")
        } else {
            name.to_string()
        };
        let description = if description.is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            description.to_string()
        };
        let created = timestamp_now();

        tx.execute(
            "INSERT INTO portfolios (user_id, portfolio_id, name, description, created)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, portfolio_id, name, description, created],
        )?;
        let portfolio_key = tx.last_insert_rowid();
        tx.commit()?;

        info!("{user_id} created portfolio {portfolio_key} : {name}");

        Ok(PortfolioRecord {
            portfolio_key,
            user_id,
            portfolio_id,
            name,
            description,
            created,
        })
    }

    /// Delete a portfolio and everything under it, then renumber the
    /// user's remaining portfolios. One transaction end to end.
    pub async fn delete_portfolio(&self, user_id: UserId, portfolio_id: i64) -> LedgerResult<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Ok(false);
        };

        tx.execute(
            "DELETE FROM portfolios WHERE portfolio_key = ?1",
            [portfolio.portfolio_key],
        )?;
        let renumbered = reindex::portfolios(&tx, user_id)?;
        tx.commit()?;

        info!(
            "{user_id} deleted portfolio {} ({renumbered} renumbered)",
            portfolio.portfolio_key
        );
        Ok(true)
    }

    pub async fn rename_portfolio(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        new_name: &str,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };

        conn.execute(
            "UPDATE portfolios SET name = ?1 WHERE portfolio_key = ?2",
            params![new_name, portfolio.portfolio_key],
        )?;

        info!(
            "{user_id} renamed portfolio {} : {} --> {new_name}",
            portfolio.portfolio_key, portfolio.name
        );
        Ok(true)
    }

    pub async fn update_portfolio_description(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        description: &str,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };

        conn.execute(
            "UPDATE portfolios SET description = ?1 WHERE portfolio_key = ?2",
            params![description, portfolio.portfolio_key],
        )?;

        info!(
            "{user_id} updated portfolio [{}] description : \"{}\" --> \"{description}\"",
            portfolio.portfolio_key, portfolio.description
        );
        Ok(true)
    }

    pub async fn get_portfolio(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Option<PortfolioRecord>> {
        let conn = self.conn.lock().await;
        Ok(portfolio_by_path(&conn, user_id, portfolio_id)?)
    }

    pub async fn get_portfolio_by_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> LedgerResult<Option<PortfolioRecord>> {
        let conn = self.conn.lock().await;
        let portfolio = conn
            .query_row(
                &format!("SELECT {PORTFOLIO_COLS} FROM portfolios WHERE user_id = ?1 AND name = ?2"),
                params![user_id, name],
                row_to_portfolio,
            )
            .optional()?;
        Ok(portfolio)
    }

    pub async fn first_portfolio(&self, user_id: UserId) -> LedgerResult<Option<PortfolioRecord>> {
        let conn = self.conn.lock().await;
        let portfolio = conn
            .query_row(
                &format!(
                    "SELECT {PORTFOLIO_COLS} FROM portfolios WHERE user_id = ?1
                     ORDER BY portfolio_id LIMIT 1"
                ),
                [user_id],
                row_to_portfolio,
            )
            .optional()?;
        Ok(portfolio)
    }

    pub async fn list_portfolios(&self, user_id: UserId) -> LedgerResult<Vec<PortfolioRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT portfolio_key, user_id, portfolio_id, name, description, created
             FROM portfolios WHERE user_id = ?1 ORDER BY portfolio_id",
        )?;
        let portfolios = stmt
            .query_map([user_id], row_to_portfolio)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(portfolios)
    }

    pub async fn portfolio_count(&self, user_id: UserId) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM portfolios WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn total_portfolio_count(&self) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row("SELECT COUNT(*) FROM portfolios", [], |row| row.get(0))?;
        Ok(count)
    }
}
