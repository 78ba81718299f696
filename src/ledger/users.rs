//! User operations.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::{LedgerResult, PortfolioLedger};
use crate::models::{timestamp_now, UserId, UserRecord};

pub(crate) fn user_row(conn: &Connection, user_id: UserId) -> rusqlite::Result<Option<UserRecord>> {
    conn.query_row(
        "SELECT user_id, created FROM users WHERE user_id = ?1",
        [user_id],
        |row| {
            Ok(UserRecord {
                user_id: row.get(0)?,
                created: row.get(1)?,
            })
        },
    )
    .optional()
}

impl PortfolioLedger {
    /// Register a user. Returns false when the id is already registered.
    pub async fn create_user(&self, user_id: UserId) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        if user_row(&conn, user_id)?.is_some() {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO users (user_id, created) VALUES (?1, ?2)",
            params![user_id, timestamp_now()],
        )?;

        info!("registered user {user_id}");
        Ok(true)
    }

    /// Delete a user and, through the store's cascades, every portfolio,
    /// stock, order, dividend, option and watchlist under them.
    pub async fn delete_user(&self, user_id: UserId) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;

        let deleted = conn.execute("DELETE FROM users WHERE user_id = ?1", [user_id])?;
        if deleted == 0 {
            return Ok(false);
        }

        info!("deleted user {user_id}");
        Ok(true)
    }

    pub async fn user_exists(&self, user_id: UserId) -> LedgerResult<bool> {
        let conn = self.conn.lock().await;
        Ok(user_row(&conn, user_id)?.is_some())
    }

    pub async fn get_user(&self, user_id: UserId) -> LedgerResult<Option<UserRecord>> {
        let conn = self.conn.lock().await;
        Ok(user_row(&conn, user_id)?)
    }

    pub async fn list_users(&self) -> LedgerResult<Vec<UserRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached("SELECT user_id, created FROM users ORDER BY user_id")?;
        let users = stmt
            .query_map([], |row| {
                Ok(UserRecord {
                    user_id: row.get(0)?,
                    created: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    pub async fn total_user_count(&self) -> LedgerResult<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::ledger::testutil::open_ledger;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let ledger = open_ledger();

        assert!(ledger.create_user(42).await.unwrap());
        assert!(ledger.user_exists(42).await.unwrap());
        assert!(!ledger.user_exists(7).await.unwrap());

        let user = ledger.get_user(42).await.unwrap().unwrap();
        assert_eq!(user.user_id, 42);
        assert_eq!(ledger.total_user_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_reported() {
        let ledger = open_ledger();

        assert!(ledger.create_user(42).await.unwrap());
        assert!(!ledger.create_user(42).await.unwrap());
        assert_eq!(ledger.total_user_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_user_is_false() {
        let ledger = open_ledger();
        assert!(!ledger.delete_user(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_portfolios() {
        let ledger = open_ledger();
        ledger.create_user(42).await.unwrap();
        ledger.create_portfolio(42, "", "").await.unwrap();

        assert!(ledger.delete_user(42).await.unwrap());
        assert_eq!(ledger.total_portfolio_count().await.unwrap(), 0);
    }
}
