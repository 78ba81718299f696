//! Order operations.
//!
//! `order_id` is dense per (portfolio, ticker). The append path is the
//! common one; updates are explicit field-wise merges and deletes shift
//! every later id down by one inside the same transaction.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use super::{
    portfolios, reindex, stocks, Entity, LedgerError, LedgerResult, PortfolioLedger,
};
use crate::models::{NewOrder, OrderRecord, OrderStatus, OrderUpdate, PortfolioKey, UserId};

const ORDER_COLS: &str =
    "order_key, portfolio_key, stock_key, ticker, order_id, price, quantity, status, side, created";

pub(crate) fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<OrderRecord> {
    Ok(OrderRecord {
        order_key: row.get(0)?,
        portfolio_key: row.get(1)?,
        stock_key: row.get(2)?,
        ticker: row.get(3)?,
        order_id: row.get(4)?,
        price: row.get(5)?,
        quantity: row.get(6)?,
        status: row.get(7)?,
        side: row.get(8)?,
        created: row.get(9)?,
    })
}

fn order_in_scope(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    ticker: &str,
    order_id: i64,
) -> rusqlite::Result<Option<OrderRecord>> {
    conn.query_row(
        &format!(
            "SELECT {ORDER_COLS} FROM orders
             WHERE portfolio_key = ?1 AND ticker = ?2 AND order_id = ?3"
        ),
        params![portfolio_key, ticker, order_id],
        row_to_order,
    )
    .optional()
}

/// All orders for one (portfolio, ticker) scope, in dense-id order.
pub(crate) fn orders_in_scope(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    ticker: &str,
) -> rusqlite::Result<Vec<OrderRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT order_key, portfolio_key, stock_key, ticker, order_id, price, quantity, status, side, created
         FROM orders WHERE portfolio_key = ?1 AND ticker = ?2 ORDER BY order_id",
    )?;
    let result = stmt
        .query_map(params![portfolio_key, ticker], row_to_order)?
        .collect();
    result
}

impl PortfolioLedger {
    pub async fn order_exists(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        order_id: i64,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };
        Ok(order_in_scope(&conn, portfolio.portfolio_key, ticker, order_id)?.is_some())
    }

    /// Record an order against an existing stock and return its dense
    /// id. The stock row must already exist; callers create it first.
    pub async fn add_order(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        order: NewOrder,
    ) -> LedgerResult<i64> {
        let created = Self::resolve_created(order.created)?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Err(LedgerError::NotFound(Entity::Portfolio));
        };
        let Some(stock) = stocks::stock_by_path(&tx, portfolio.portfolio_key, ticker)? else {
            return Err(LedgerError::NotFound(Entity::Stock));
        };

        let order_id: i64 = tx.query_row(
            "SELECT COUNT(*) FROM orders WHERE portfolio_key = ?1 AND ticker = ?2",
            params![portfolio.portfolio_key, ticker],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO orders (portfolio_key, stock_key, ticker, order_id, price, quantity, status, side, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                portfolio.portfolio_key,
                stock.stock_key,
                ticker,
                order_id,
                order.price,
                order.quantity,
                order.status,
                order.side,
                created,
            ],
        )?;
        tx.commit()?;

        info!(
            "{user_id} added order to portfolio {} : {ticker} [{order_id}]",
            portfolio.portfolio_key
        );
        Ok(order_id)
    }

    /// Field-wise merge: any `Keep` field retains the stored value. The
    /// dense id never changes here.
    pub async fn update_order(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        order_id: i64,
        ticker: &str,
        update: OrderUpdate,
    ) -> LedgerResult<bool> {
        if update.is_empty() {
            return Err(LedgerError::EmptyUpdate);
        }
        if let crate::models::Field::Set(created) = &update.created {
            if crate::models::parse_timestamp(created).is_none() {
                return Err(LedgerError::InvalidTimestamp(created.clone()));
            }
        }

        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(false);
        };
        let Some(stored) = order_in_scope(&conn, portfolio.portfolio_key, ticker, order_id)? else {
            return Ok(false);
        };

        let price = update.price.or_stored(stored.price);
        let quantity = update.quantity.or_stored(stored.quantity);
        let status = update.status.or_stored(stored.status);
        let side = update.side.or_stored(stored.side);
        let created = update.created.or_stored(stored.created);

        conn.execute(
            "UPDATE orders SET price = ?1, quantity = ?2, status = ?3, side = ?4, created = ?5
             WHERE order_key = ?6",
            params![price, quantity, status, side, created, stored.order_key],
        )?;

        info!(
            "{user_id} updated order in portfolio {} : {}",
            portfolio.portfolio_key, stored.order_key
        );
        Ok(true)
    }

    /// Delete one order and renumber the remaining scope in the same
    /// transaction. The deleted dense id is immediately reoccupied by
    /// the next order that held a later position.
    pub async fn delete_order(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        order_id: i64,
    ) -> LedgerResult<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Ok(false);
        };
        let Some(order) = order_in_scope(&tx, portfolio.portfolio_key, ticker, order_id)? else {
            return Ok(false);
        };

        tx.execute("DELETE FROM orders WHERE order_key = ?1", [order.order_key])?;
        reindex::orders(&tx, portfolio.portfolio_key, ticker)?;
        tx.commit()?;

        info!(
            "{user_id} deleted order from portfolio {} : {} in {ticker}",
            portfolio.portfolio_key, order.order_key
        );
        Ok(true)
    }

    /// Bulk-delete every order with the given status, for one ticker or
    /// (with `None`) across the whole portfolio, then renumber once per
    /// affected (portfolio, ticker) scope. Returns the rows purged.
    pub async fn purge_orders(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: Option<&str>,
        status: OrderStatus,
    ) -> LedgerResult<u64> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(portfolio) = portfolios::portfolio_by_path(&tx, user_id, portfolio_id)? else {
            return Err(LedgerError::NotFound(Entity::Portfolio));
        };
        let portfolio_key = portfolio.portfolio_key;

        let affected: Vec<String> = match ticker {
            Some(t) => vec![t.to_string()],
            None => {
                let mut stmt = tx.prepare(
                    "SELECT DISTINCT ticker FROM orders
                     WHERE portfolio_key = ?1 AND status = ?2",
                )?;
                let tickers = stmt
                    .query_map(params![portfolio_key, status], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                tickers
            }
        };

        let mut purged = 0usize;
        for t in &affected {
            purged += tx.execute(
                "DELETE FROM orders WHERE portfolio_key = ?1 AND ticker = ?2 AND status = ?3",
                params![portfolio_key, t, status],
            )?;
            reindex::orders(&tx, portfolio_key, t)?;
        }
        tx.commit()?;

        info!(
            "{user_id} purged {purged} {} orders from portfolio {portfolio_key} : {}",
            status.as_str(),
            ticker.unwrap_or("all")
        );
        Ok(purged as u64)
    }

    pub async fn get_order(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
        order_id: i64,
    ) -> LedgerResult<Option<OrderRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(order_in_scope(&conn, portfolio.portfolio_key, ticker, order_id)?)
    }

    pub async fn list_orders(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<Vec<OrderRecord>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(Vec::new());
        };
        Ok(orders_in_scope(&conn, portfolio.portfolio_key, ticker)?)
    }

    /// Orders across the whole portfolio, every ticker.
    pub async fn order_count(&self, user_id: UserId, portfolio_id: i64) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(0);
        };
        let count = conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE portfolio_key = ?1",
            [portfolio.portfolio_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn total_order_count(&self) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        Ok(count)
    }
}
