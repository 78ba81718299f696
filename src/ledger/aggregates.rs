//! Aggregation Engine
//!
//! Every figure here is recomputed from the currently-stored rows on
//! each call. The schema holds no running totals, so edits and deletes
//! can never leave a stale cached sum behind. Only Filled orders
//! contribute; Pending and Cancelled rows are skipped during the fold.
//! `Ok(None)` means "nothing to aggregate", which callers must keep
//! distinct from a computed zero.

use rusqlite::Connection;

use super::{dividends, orders, portfolios, stocks, LedgerResult, PortfolioLedger};
use crate::models::{OrderSide, OrderStatus, PortfolioKey, UserId};

/// Net position size: Filled buys minus Filled sells.
fn stock_quantity_in(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    ticker: &str,
) -> rusqlite::Result<Option<f64>> {
    let rows = orders::orders_in_scope(conn, portfolio_key, ticker)?;
    if rows.is_empty() {
        return Ok(None);
    }

    let quantity = rows
        .iter()
        .filter(|o| o.status == OrderStatus::Filled)
        .fold(0.0, |acc, o| match o.side {
            OrderSide::Buy => acc + o.quantity,
            OrderSide::Sell => acc - o.quantity,
        });
    Ok(Some(quantity))
}

/// Cost basis: cash put in through Filled buys minus cash taken out
/// through Filled sells.
fn stock_investment_in(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    ticker: &str,
) -> rusqlite::Result<Option<f64>> {
    let rows = orders::orders_in_scope(conn, portfolio_key, ticker)?;
    if rows.is_empty() {
        return Ok(None);
    }

    let investment = rows
        .iter()
        .filter(|o| o.status == OrderStatus::Filled)
        .fold(0.0, |acc, o| match o.side {
            OrderSide::Buy => acc + o.price * o.quantity,
            OrderSide::Sell => acc - o.price * o.quantity,
        });
    Ok(Some(investment))
}

/// Realized gain/loss: Filled sell proceeds minus Filled buy cost.
fn stock_gain_loss_in(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    ticker: &str,
) -> rusqlite::Result<Option<f64>> {
    let rows = orders::orders_in_scope(conn, portfolio_key, ticker)?;
    if rows.is_empty() {
        return Ok(None);
    }

    let gain_loss = rows
        .iter()
        .filter(|o| o.status == OrderStatus::Filled)
        .fold(0.0, |acc, o| match o.side {
            OrderSide::Sell => acc + o.price * o.quantity,
            OrderSide::Buy => acc - o.price * o.quantity,
        });
    Ok(Some(gain_loss))
}

/// Sum a stock-level figure across a portfolio's stocks; `None` when
/// the portfolio tracks no stocks. Stocks with nothing to aggregate
/// contribute zero, matching the per-stock absent semantics.
fn sum_over_stocks(
    conn: &Connection,
    portfolio_key: PortfolioKey,
    figure: impl Fn(&Connection, PortfolioKey, &str) -> rusqlite::Result<Option<f64>>,
) -> rusqlite::Result<Option<f64>> {
    let stock_rows = stocks::stocks_in(conn, portfolio_key)?;
    if stock_rows.is_empty() {
        return Ok(None);
    }

    let mut total = 0.0;
    for stock in &stock_rows {
        total += figure(conn, portfolio_key, &stock.ticker)?.unwrap_or(0.0);
    }
    Ok(Some(total))
}

fn portfolio_dividends_in(
    conn: &Connection,
    portfolio_key: PortfolioKey,
) -> rusqlite::Result<Option<f64>> {
    let rows = dividends::dividends_in(conn, portfolio_key)?;
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(rows.iter().map(|d| d.amount).sum()))
}

fn portfolio_gain_loss_in(
    conn: &Connection,
    portfolio_key: PortfolioKey,
) -> rusqlite::Result<Option<f64>> {
    sum_over_stocks(conn, portfolio_key, stock_gain_loss_in)
}

impl PortfolioLedger {
    /// Net share count for one stock; `None` when it has no orders.
    pub async fn stock_quantity(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<Option<f64>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(stock_quantity_in(&conn, portfolio.portfolio_key, ticker)?)
    }

    /// Cost basis for one stock; `None` when it has no orders.
    pub async fn stock_investment(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<Option<f64>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(stock_investment_in(&conn, portfolio.portfolio_key, ticker)?)
    }

    /// Realized gain/loss for one stock; `None` when it has no orders.
    pub async fn stock_gain_loss(
        &self,
        user_id: UserId,
        portfolio_id: i64,
        ticker: &str,
    ) -> LedgerResult<Option<f64>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(stock_gain_loss_in(&conn, portfolio.portfolio_key, ticker)?)
    }

    /// Total share count across the portfolio; `None` without stocks.
    pub async fn portfolio_quantity(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Option<f64>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(sum_over_stocks(&conn, portfolio.portfolio_key, stock_quantity_in)?)
    }

    /// Total cost basis across the portfolio; `None` without stocks.
    pub async fn portfolio_investment(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Option<f64>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(sum_over_stocks(&conn, portfolio.portfolio_key, stock_investment_in)?)
    }

    /// Total realized gain/loss across the portfolio; `None` without
    /// stocks.
    pub async fn portfolio_gain_loss(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Option<f64>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(portfolio_gain_loss_in(&conn, portfolio.portfolio_key)?)
    }

    /// Total dividend income across the portfolio; `None` when no
    /// dividends are recorded.
    pub async fn portfolio_dividends(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Option<f64>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        Ok(portfolio_dividends_in(&conn, portfolio.portfolio_key)?)
    }

    /// The historical headline number: investment + gain/loss +
    /// dividends, present only when all three components are. Realized
    /// gain/loss is the negation of investment over the same fills, so
    /// whenever buys and sells balance this collapses to the dividend
    /// total.
    pub async fn portfolio_total(
        &self,
        user_id: UserId,
        portfolio_id: i64,
    ) -> LedgerResult<Option<f64>> {
        let conn = self.conn.lock().await;

        let Some(portfolio) = portfolios::portfolio_by_path(&conn, user_id, portfolio_id)? else {
            return Ok(None);
        };
        let key = portfolio.portfolio_key;

        let investment = sum_over_stocks(&conn, key, stock_investment_in)?;
        let gain_loss = portfolio_gain_loss_in(&conn, key)?;
        let dividends = portfolio_dividends_in(&conn, key)?;

        match (investment, gain_loss, dividends) {
            (Some(i), Some(g), Some(d)) => Ok(Some(i + g + d)),
            _ => Ok(None),
        }
    }

    /// Realized gain/loss across every portfolio the user holds,
    /// skipping portfolios with nothing to aggregate; `None` when the
    /// user has no portfolios at all.
    pub async fn user_gain_loss(&self, user_id: UserId) -> LedgerResult<Option<f64>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT portfolio_key FROM portfolios WHERE user_id = ?1 ORDER BY portfolio_id",
        )?;
        let keys = stmt
            .query_map([user_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if keys.is_empty() {
            return Ok(None);
        }

        let mut total = 0.0;
        for key in keys {
            if let Some(gain_loss) = portfolio_gain_loss_in(&conn, key)? {
                total += gain_loss;
            }
        }
        Ok(Some(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testutil::open_ledger;
    use crate::models::NewOrder;

    async fn seeded_ledger() -> PortfolioLedger {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        ledger.create_portfolio(1, "", "").await.unwrap();
        ledger.add_stock(1, 0, "ABC").await.unwrap();
        ledger
    }

    fn order(price: f64, quantity: f64, status: OrderStatus, side: OrderSide) -> NewOrder {
        NewOrder {
            price,
            quantity,
            status,
            side,
            created: None,
        }
    }

    #[tokio::test]
    async fn test_filled_buys_only() {
        let ledger = seeded_ledger().await;
        ledger
            .add_order(1, 0, "ABC", order(5.0, 10.0, OrderStatus::Filled, OrderSide::Buy))
            .await
            .unwrap();
        ledger
            .add_order(1, 0, "ABC", order(6.0, 5.0, OrderStatus::Filled, OrderSide::Buy))
            .await
            .unwrap();

        assert_eq!(ledger.stock_quantity(1, 0, "ABC").await.unwrap(), Some(15.0));
        assert_eq!(ledger.stock_investment(1, 0, "ABC").await.unwrap(), Some(80.0));
        assert_eq!(ledger.stock_gain_loss(1, 0, "ABC").await.unwrap(), Some(-80.0));
    }

    #[tokio::test]
    async fn test_pending_orders_change_nothing() {
        let ledger = seeded_ledger().await;
        ledger
            .add_order(1, 0, "ABC", order(5.0, 10.0, OrderStatus::Filled, OrderSide::Buy))
            .await
            .unwrap();
        ledger
            .add_order(1, 0, "ABC", order(6.0, 5.0, OrderStatus::Filled, OrderSide::Buy))
            .await
            .unwrap();
        ledger
            .add_order(1, 0, "ABC", order(9.0, 100.0, OrderStatus::Pending, OrderSide::Buy))
            .await
            .unwrap();
        ledger
            .add_order(1, 0, "ABC", order(9.0, 100.0, OrderStatus::Cancelled, OrderSide::Sell))
            .await
            .unwrap();

        assert_eq!(ledger.stock_quantity(1, 0, "ABC").await.unwrap(), Some(15.0));
        assert_eq!(ledger.stock_investment(1, 0, "ABC").await.unwrap(), Some(80.0));
        assert_eq!(ledger.stock_gain_loss(1, 0, "ABC").await.unwrap(), Some(-80.0));
    }

    #[tokio::test]
    async fn test_buy_then_sell_scenario() {
        let ledger = seeded_ledger().await;
        ledger
            .add_order(1, 0, "ABC", order(100.0, 10.0, OrderStatus::Filled, OrderSide::Buy))
            .await
            .unwrap();
        ledger
            .add_order(1, 0, "ABC", order(120.0, 4.0, OrderStatus::Filled, OrderSide::Sell))
            .await
            .unwrap();

        assert_eq!(ledger.stock_quantity(1, 0, "ABC").await.unwrap(), Some(6.0));
        assert_eq!(ledger.stock_investment(1, 0, "ABC").await.unwrap(), Some(520.0));
        assert_eq!(ledger.stock_gain_loss(1, 0, "ABC").await.unwrap(), Some(-520.0));
    }

    #[tokio::test]
    async fn test_absent_is_not_zero() {
        let ledger = seeded_ledger().await;

        // Stock exists but has no orders.
        assert_eq!(ledger.stock_quantity(1, 0, "ABC").await.unwrap(), None);

        // Offsetting fills produce a real zero.
        ledger
            .add_order(1, 0, "ABC", order(10.0, 5.0, OrderStatus::Filled, OrderSide::Buy))
            .await
            .unwrap();
        ledger
            .add_order(1, 0, "ABC", order(10.0, 5.0, OrderStatus::Filled, OrderSide::Sell))
            .await
            .unwrap();
        assert_eq!(ledger.stock_quantity(1, 0, "ABC").await.unwrap(), Some(0.0));

        // Missing portfolio aggregates to nothing.
        assert_eq!(ledger.stock_quantity(1, 9, "ABC").await.unwrap(), None);
        assert_eq!(ledger.portfolio_dividends(1, 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_portfolio_sums_span_stocks() {
        let ledger = seeded_ledger().await;
        ledger.add_stock(1, 0, "XYZ").await.unwrap();
        ledger
            .add_order(1, 0, "ABC", order(10.0, 2.0, OrderStatus::Filled, OrderSide::Buy))
            .await
            .unwrap();
        ledger
            .add_order(1, 0, "XYZ", order(20.0, 3.0, OrderStatus::Filled, OrderSide::Buy))
            .await
            .unwrap();
        ledger.add_dividend(1, 0, "ABC", 7.5, None).await.unwrap();
        ledger.add_dividend(1, 0, "XYZ", 2.5, None).await.unwrap();

        assert_eq!(ledger.portfolio_quantity(1, 0).await.unwrap(), Some(5.0));
        assert_eq!(ledger.portfolio_investment(1, 0).await.unwrap(), Some(80.0));
        assert_eq!(ledger.portfolio_gain_loss(1, 0).await.unwrap(), Some(-80.0));
        assert_eq!(ledger.portfolio_dividends(1, 0).await.unwrap(), Some(10.0));

        // investment + gain_loss cancel, leaving the dividend total.
        assert_eq!(ledger.portfolio_total(1, 0).await.unwrap(), Some(10.0));
    }

    #[tokio::test]
    async fn test_user_gain_loss_skips_empty_portfolios() {
        let ledger = seeded_ledger().await;
        ledger
            .add_order(1, 0, "ABC", order(50.0, 2.0, OrderStatus::Filled, OrderSide::Sell))
            .await
            .unwrap();

        // Second portfolio with no stocks contributes nothing.
        ledger.create_portfolio(1, "", "").await.unwrap();

        assert_eq!(ledger.user_gain_loss(1).await.unwrap(), Some(100.0));

        // A user with no portfolios aggregates to nothing.
        ledger.create_user(2).await.unwrap();
        assert_eq!(ledger.user_gain_loss(2).await.unwrap(), None);
    }
}
