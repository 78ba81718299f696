//! Watchlist and watching-membership operations.
//!
//! Watchlists follow the same dense-index pattern as portfolios;
//! the watching table is a plain membership set under each list.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use super::{reindex, users, Entity, LedgerError, LedgerResult, PortfolioLedger};
use crate::models::{timestamp_now, UserId, WatchlistRecord};

const WATCHLIST_COLS: &str = "watchlist_key, user_id, watchlist_id, name, description, created";

fn row_to_watchlist(row: &rusqlite::Row) -> rusqlite::Result<WatchlistRecord> {
    Ok(WatchlistRecord {
        watchlist_key: row.get(0)?,
        user_id: row.get(1)?,
        watchlist_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        created: row.get(5)?,
    })
}

fn watchlist_by_path(
    conn: &Connection,
    user_id: UserId,
    watchlist_id: i64,
) -> rusqlite::Result<Option<WatchlistRecord>> {
    conn.query_row(
        &format!(
            "SELECT {WATCHLIST_COLS} FROM watchlists WHERE user_id = ?1 AND watchlist_id = ?2"
        ),
        params![user_id, watchlist_id],
        row_to_watchlist,
    )
    .optional()
}

impl PortfolioLedger {
    /// Create a watchlist at the next dense position and return its id.
    /// An empty name falls back to `"Watchlist {id}"`.
    pub async fn create_watchlist(
        &self,
        user_id: UserId,
        name: &str,
        description: &str,
    ) -> LedgerResult<i64> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if users::user_row(&tx, user_id)?.is_none() {
            return Err(LedgerError::NotFound(Entity::User));
        }

        let watchlist_id: i64 = tx.query_row(
            "SELECT COUNT(*) FROM watchlists WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;

        let name = if name.is_empty() {
            format!("Watchlist {watchlist_id}")
        } else {
            name.to_string()
        };

        tx.execute(
            "INSERT INTO watchlists (user_id, watchlist_id, name, description, created)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, watchlist_id, name, description, timestamp_now()],
        )?;
        let watchlist_key = tx.last_insert_rowid();
        tx.commit()?;

        info!("{user_id} created watchlist {watchlist_key} : {name}");
        Ok(watchlist_id)
    }

    /// Delete a watchlist (membership rows cascade) and renumber the
    /// user's remaining lists in the same transaction.
    pub async fn delete_watchlist(&self, user_id: UserId, watchlist_id: i64) -> LedgerResult<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(watchlist) = watchlist_by_path(&tx, user_id, watchlist_id)? else {
            return Ok(false);
        };

        tx.execute(
            "DELETE FROM watchlists WHERE watchlist_key = ?1",
            [watchlist.watchlist_key],
        )?;
        reindex::watchlists(&tx, user_id)?;
        tx.commit()?;

        info!("{user_id} deleted watchlist {}", watchlist.watchlist_key);
        Ok(true)
    }

    pub async fn rename_watchlist(
        &self,
        user_id: UserId,
        watchlist_id: i64,
        new_name: &str,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(watchlist) = watchlist_by_path(&conn, user_id, watchlist_id)? else {
            return Ok(false);
        };

        conn.execute(
            "UPDATE watchlists SET name = ?1 WHERE watchlist_key = ?2",
            params![new_name, watchlist.watchlist_key],
        )?;

        info!(
            "{user_id} renamed watchlist {} : {} --> {new_name}",
            watchlist.watchlist_key, watchlist.name
        );
        Ok(true)
    }

    pub async fn update_watchlist_description(
        &self,
        user_id: UserId,
        watchlist_id: i64,
        description: &str,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(watchlist) = watchlist_by_path(&conn, user_id, watchlist_id)? else {
            return Ok(false);
        };

        conn.execute(
            "UPDATE watchlists SET description = ?1 WHERE watchlist_key = ?2",
            params![description, watchlist.watchlist_key],
        )?;

        info!(
            "{user_id} updated watchlist {}'s description : \"{}\" --> \"{description}\"",
            watchlist.watchlist_key, watchlist.description
        );
        Ok(true)
    }

    pub async fn get_watchlist(
        &self,
        user_id: UserId,
        watchlist_id: i64,
    ) -> LedgerResult<Option<WatchlistRecord>> {
        let conn = self.conn.lock().await;
        Ok(watchlist_by_path(&conn, user_id, watchlist_id)?)
    }

    pub async fn get_watchlist_by_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> LedgerResult<Option<WatchlistRecord>> {
        let conn = self.conn.lock().await;
        let watchlist = conn
            .query_row(
                &format!(
                    "SELECT {WATCHLIST_COLS} FROM watchlists WHERE user_id = ?1 AND name = ?2"
                ),
                params![user_id, name],
                row_to_watchlist,
            )
            .optional()?;
        Ok(watchlist)
    }

    pub async fn list_watchlists(&self, user_id: UserId) -> LedgerResult<Vec<WatchlistRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT watchlist_key, user_id, watchlist_id, name, description, created
             FROM watchlists WHERE user_id = ?1 ORDER BY watchlist_id",
        )?;
        let watchlists = stmt
            .query_map([user_id], row_to_watchlist)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(watchlists)
    }

    pub async fn watchlist_count(&self, user_id: UserId) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM watchlists WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn total_watchlist_count(&self) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row("SELECT COUNT(*) FROM watchlists", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Add a ticker to a watchlist. Re-adding a watched ticker is a
    /// store rejection, mirroring the membership primary key.
    pub async fn watch_ticker(
        &self,
        user_id: UserId,
        watchlist_id: i64,
        ticker: &str,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(watchlist) = watchlist_by_path(&conn, user_id, watchlist_id)? else {
            return Ok(false);
        };

        conn.execute(
            "INSERT INTO watching (watchlist_key, ticker) VALUES (?1, ?2)",
            params![watchlist.watchlist_key, ticker],
        )?;

        info!(
            "{user_id} added stock to watchlist {} : {ticker}",
            watchlist.watchlist_key
        );
        Ok(true)
    }

    pub async fn unwatch_ticker(
        &self,
        user_id: UserId,
        watchlist_id: i64,
        ticker: &str,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(watchlist) = watchlist_by_path(&conn, user_id, watchlist_id)? else {
            return Ok(false);
        };

        let removed = conn.execute(
            "DELETE FROM watching WHERE watchlist_key = ?1 AND ticker = ?2",
            params![watchlist.watchlist_key, ticker],
        )?;
        if removed == 0 {
            return Ok(false);
        }

        info!(
            "{user_id} removed stock from watchlist {} : {ticker}",
            watchlist.watchlist_key
        );
        Ok(true)
    }

    pub async fn is_ticker_watched(
        &self,
        user_id: UserId,
        watchlist_id: i64,
        ticker: &str,
    ) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let Some(watchlist) = watchlist_by_path(&conn, user_id, watchlist_id)? else {
            return Ok(false);
        };

        let watched = conn
            .query_row(
                "SELECT 1 FROM watching WHERE watchlist_key = ?1 AND ticker = ?2",
                params![watchlist.watchlist_key, ticker],
                |_| Ok(()),
            )
            .optional()?;
        Ok(watched.is_some())
    }

    pub async fn watchlist_tickers(
        &self,
        user_id: UserId,
        watchlist_id: i64,
    ) -> LedgerResult<Vec<String>> {
        let conn = self.conn.lock().await;

        let Some(watchlist) = watchlist_by_path(&conn, user_id, watchlist_id)? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare_cached(
            "SELECT ticker FROM watching WHERE watchlist_key = ?1 ORDER BY ticker",
        )?;
        let tickers = stmt
            .query_map([watchlist.watchlist_key], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tickers)
    }

    pub async fn watchlist_ticker_count(
        &self,
        user_id: UserId,
        watchlist_id: i64,
    ) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;

        let Some(watchlist) = watchlist_by_path(&conn, user_id, watchlist_id)? else {
            return Ok(0);
        };
        let count = conn.query_row(
            "SELECT COUNT(*) FROM watching WHERE watchlist_key = ?1",
            [watchlist.watchlist_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn total_watched_count(&self) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row("SELECT COUNT(*) FROM watching", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testutil::open_ledger;

    #[tokio::test]
    async fn test_create_defaults_and_dense_ids() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();

        assert_eq!(ledger.create_watchlist(1, "", "").await.unwrap(), 0);
        assert_eq!(ledger.create_watchlist(1, "Earnings", "").await.unwrap(), 1);

        let first = ledger.get_watchlist(1, 0).await.unwrap().unwrap();
        assert_eq!(first.name, "Watchlist 0");

        let err = ledger.create_watchlist(2, "", "").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(Entity::User)));
    }

    #[tokio::test]
    async fn test_membership_round_trip() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        ledger.create_watchlist(1, "", "").await.unwrap();

        assert!(ledger.watch_ticker(1, 0, "MSFT").await.unwrap());
        assert!(ledger.is_ticker_watched(1, 0, "MSFT").await.unwrap());
        assert_eq!(ledger.watchlist_tickers(1, 0).await.unwrap(), vec!["MSFT"]);

        assert!(ledger.unwatch_ticker(1, 0, "MSFT").await.unwrap());
        assert!(!ledger.unwatch_ticker(1, 0, "MSFT").await.unwrap());
        assert!(!ledger.is_ticker_watched(1, 0, "MSFT").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_renumbers_and_drops_membership() {
        let ledger = open_ledger();
        ledger.create_user(1).await.unwrap();
        for _ in 0..3 {
            ledger.create_watchlist(1, "", "").await.unwrap();
        }
        ledger.watch_ticker(1, 1, "MSFT").await.unwrap();

        assert!(ledger.delete_watchlist(1, 1).await.unwrap());

        let ids: Vec<i64> = ledger
            .list_watchlists(1)
            .await
            .unwrap()
            .iter()
            .map(|w| w.watchlist_id)
            .collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(ledger.total_watched_count().await.unwrap(), 0);
    }
}
