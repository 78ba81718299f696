//! Dense Index Compactor
//!
//! After a deletion, every remaining sibling's user-visible index is
//! reassigned to its 0-based rank by creation time (surrogate key breaks
//! second-resolution ties). Each scope renumbers with a single bulk
//! UPDATE; callers run it inside the same transaction as the deletion so
//! no reader ever observes a gapped sequence.

use rusqlite::{Connection, ToSql, TransactionBehavior};

use super::schema::CREATED_SORT_EXPR;
use super::{portfolios, users, Entity, LedgerError, LedgerResult, PortfolioLedger};
use crate::models::{PortfolioKey, UserId};

fn renumber(
    conn: &Connection,
    table: &str,
    id_col: &str,
    key_col: &str,
    scope: &str,
    params: &[&dyn ToSql],
) -> rusqlite::Result<usize> {
    let sql = format!(
        "UPDATE {table} SET {id_col} = (
             SELECT rn - 1 FROM (
                 SELECT {key_col} AS k,
                        ROW_NUMBER() OVER (ORDER BY {CREATED_SORT_EXPR} ASC, {key_col} ASC) AS rn
                 FROM {table} WHERE {scope}
             ) WHERE k = {table}.{key_col}
         ) WHERE {scope}"
    );
    conn.execute(&sql, params)
}

pub(crate) fn portfolios(conn: &Connection, user_id: UserId) -> rusqlite::Result<usize> {
    renumber(
        conn,
        "portfolios",
        "portfolio_id",
        "portfolio_key",
        "user_id = ?1",
        &[&user_id],
    )
}

pub(crate) fn orders(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    ticker: &str,
) -> rusqlite::Result<usize> {
    renumber(
        conn,
        "orders",
        "order_id",
        "order_key",
        "portfolio_key = ?1 AND ticker = ?2",
        &[&portfolio_key, &ticker],
    )
}

pub(crate) fn dividends(conn: &Connection, portfolio_key: PortfolioKey) -> rusqlite::Result<usize> {
    renumber(
        conn,
        "dividends",
        "dividend_id",
        "dividend_key",
        "portfolio_key = ?1",
        &[&portfolio_key],
    )
}

pub(crate) fn options(conn: &Connection, portfolio_key: PortfolioKey) -> rusqlite::Result<usize> {
    renumber(
        conn,
        "options",
        "option_id",
        "option_key",
        "portfolio_key = ?1",
        &[&portfolio_key],
    )
}

pub(crate) fn watchlists(conn: &Connection, user_id: UserId) -> rusqlite::Result<usize> {
    renumber(
        conn,
        "watchlists",
        "watchlist_id",
        "watchlist_key",
        "user_id = ?1",
        &[&user_id],
    )
}

impl PortfolioLedger {
    /// Renumber a user's portfolios; returns how many rows the pass
    /// touched. Mutating operations do this automatically; the public
    /// form exists for admin repair and tests.
    pub async fn reindex_portfolios(&self, user_id: UserId) -> LedgerResult<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if users::user_row(&tx, user_id)?.is_none() {
            return Err(LedgerError::NotFound(Entity::User));
        }
        let count = portfolios(&tx, user_id)?;
        tx.commit()?;
        Ok(count)
    }

    /// Renumber the orders of one (portfolio, ticker) scope.
    pub async fn reindex_orders(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Err(LedgerError::NotFound(Entity::Portfolio));
        };
        let count = orders(&tx, portfolio.portfolio_key, ticker)?;
        tx.commit()?;
        Ok(count)
    }

    /// Renumber a portfolio's dividends (one scope across all tickers).
    pub async fn reindex_dividends(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Err(LedgerError::NotFound(Entity::Portfolio));
        };
        let count = dividends(&tx, portfolio.portfolio_key)?;
        tx.commit()?;
        Ok(count)
    }

    /// Renumber a portfolio's options (one scope across all tickers).
    pub async fn reindex_options(&self, user_id: UserId, portfolio_id: i64) -> LedgerResult<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Err(LedgerError::NotFound(Entity::Portfolio));
        };
        let count = options(&tx, portfolio.portfolio_key)?;
        tx.commit()?;
        Ok(count)
    }

    /// Renumber a user's watchlists.
    pub async fn reindex_watchlists(&self, user_id: UserId) -> LedgerResult<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if users::user_row(&tx, user_id)?.is_none() {
            return Err(LedgerError::NotFound(Entity::User));
        }
        let count = watchlists(&tx, user_id)?;
        tx.commit()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testutil::open_ledger;
    use crate::models::{NewOrder, OrderSide, OrderStatus};

    fn filled_buy(created: &str) -> NewOrder {
        NewOrder {
            price: 10.0,
            quantity: 1.0,
            status: OrderStatus::Filled,
            side: OrderSide::Buy,
            created: Some(created.to_string()),
        }
    }

    #[tokio::test]
    async fn test_empty_scope_is_a_noop() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        assert_eq!(ledger.reindex_portfolios(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_parent_is_rejected() {
        let ledger = open_ledger();
        assert!(matches!(
            ledger.reindex_portfolios(1).await,
            Err(LedgerError::NotFound(Entity::User))
        ));

        ledger.create_user(1).await.unwrap();
        assert!(matches!(
            ledger.reindex_orders(1, 0, "ABC").await,
            Err(LedgerError::NotFound(Entity::Portfolio))
        ));
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        for _ in 0..3 {
            ledger.create_portfolio(1, "", "").await.unwrap();
        }
        ledger.delete_portfolio(1, 1).await.unwrap();

        let before: Vec<i64> = ledger
            .list_portfolios(1)
            .await
            .unwrap()
            .iter()
            .map(|p| p.portfolio_id)
            .collect();
        assert_eq!(before, vec![0, 1]);

        assert_eq!(ledger.reindex_portfolios(1).await.unwrap(), 2);
        let after: Vec<i64> = ledger
            .list_portfolios(1)
            .await
            .unwrap()
            .iter()
            .map(|p| p.portfolio_id)
            .collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_ranking_follows_created_not_insertion() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        ledger.create_portfolio(1, "", "").await.unwrap();
        ledger.add_stock(1, 0, "ABC").await.unwrap();

        // Inserted out of chronological order, PM before AM.
        ledger
            .add_order(1, 0, "ABC", filled_buy("06-02-2024 01:00:00 PM"))
            .await
            .unwrap();
        ledger
            .add_order(1, 0, "ABC", filled_buy("06-02-2024 09:00:00 AM"))
            .await
            .unwrap();
        ledger
            .add_order(1, 0, "ABC", filled_buy("06-01-2024 11:00:00 PM"))
            .await
            .unwrap();

        assert_eq!(ledger.reindex_orders(1, 0, "ABC").await.unwrap(), 3);

        let orders = ledger.list_orders(1, 0, "ABC").await.unwrap();
        let created_in_id_order: Vec<&str> =
            orders.iter().map(|o| o.created.as_str()).collect();
        assert_eq!(
            created_in_id_order,
            vec![
                "06-01-2024 11:00:00 PM",
                "06-02-2024 09:00:00 AM",
                "06-02-2024 01:00:00 PM",
            ]
        );
    }

    #[tokio::test]
    async fn test_equal_timestamps_tie_break_on_surrogate_key() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        ledger.create_portfolio(1, "", "").await.unwrap();
        ledger.add_stock(1, 0, "ABC").await.unwrap();

        for _ in 0..3 {
            ledger
                .add_order(1, 0, "ABC", filled_buy("06-02-2024 09:00:00 AM"))
                .await
                .unwrap();
        }
        ledger.delete_order(1, 0, "ABC", 0).await.unwrap();

        let orders = ledger.list_orders(1, 0, "ABC").await.unwrap();
        assert_eq!(orders.len(), 2);
        // Creation order (= surrogate order) survives the tie.
        assert!(orders[0].order_key < orders[1].order_key);
        assert_eq!(orders[0].order_id, 0);
        assert_eq!(orders[1].order_id, 1);
    }
}
