//! Ledger Records
//!
//! One strongly typed record per stored table, built exactly once at the
//! record-store boundary, plus the enums and partial-update types the
//! ledger operations exchange with callers.

use chrono::{Local, NaiveDateTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

/// Display format every `created` / `expires` column is stored in.
/// 12-hour clock with AM/PM, local time; the engine never converts
/// timezones.
pub const DATE_FORMAT: &str = "%m-%d-%Y %I:%M:%S %p";

/// Current local time in the ledger's storage format.
pub fn timestamp_now() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

/// Parse a caller-supplied timestamp in the ledger's storage format.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATE_FORMAT).ok()
}

// Surrogate keys are plain i64 rowids; aliases keep signatures readable.
pub type UserId = i64;
pub type PortfolioKey = i64;
pub type StockKey = i64;

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    Pending,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Filled => "Filled",
            OrderStatus::Pending => "Pending",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Filled" => Some(OrderStatus::Filled),
            "Pending" => Some(OrderStatus::Pending),
            "Cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Buy or sell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Buy" => Some(OrderSide::Buy),
            "Sell" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

/// Option lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionStatus {
    Filled,
    Pending,
    Cancelled,
    Expired,
    Exercised,
    Closed,
}

impl OptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionStatus::Filled => "Filled",
            OptionStatus::Pending => "Pending",
            OptionStatus::Cancelled => "Cancelled",
            OptionStatus::Expired => "Expired",
            OptionStatus::Exercised => "Exercised",
            OptionStatus::Closed => "Closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Filled" => Some(OptionStatus::Filled),
            "Pending" => Some(OptionStatus::Pending),
            "Cancelled" => Some(OptionStatus::Cancelled),
            "Expired" => Some(OptionStatus::Expired),
            "Exercised" => Some(OptionStatus::Exercised),
            "Closed" => Some(OptionStatus::Closed),
            _ => None,
        }
    }

    /// Statuses that carry a realized gain/loss figure.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OptionStatus::Closed | OptionStatus::Expired | OptionStatus::Exercised
        )
    }
}

/// Call or put
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKind::Call => "Call",
            OptionKind::Put => "Put",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Call" => Some(OptionKind::Call),
            "Put" => Some(OptionKind::Put),
            _ => None,
        }
    }
}

macro_rules! sql_string_enum {
    ($ty:ty) => {
        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                Self::parse(s).ok_or_else(|| {
                    FromSqlError::Other(
                        format!("unrecognized {} value: {s}", stringify!($ty)).into(),
                    )
                })
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }
    };
}

sql_string_enum!(OrderStatus);
sql_string_enum!(OrderSide);
sql_string_enum!(OptionStatus);
sql_string_enum!(OptionKind);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub created: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRecord {
    pub portfolio_key: PortfolioKey,
    pub user_id: UserId,
    /// Dense 0-based position among the user's portfolios; renumbered
    /// after deletes.
    pub portfolio_id: i64,
    pub name: String,
    pub description: String,
    pub created: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecord {
    pub stock_key: StockKey,
    pub portfolio_key: PortfolioKey,
    pub ticker: String,
    pub created: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_key: i64,
    pub portfolio_key: PortfolioKey,
    pub stock_key: StockKey,
    pub ticker: String,
    /// Dense 0-based position within (portfolio, ticker).
    pub order_id: i64,
    pub price: f64,
    pub quantity: f64,
    pub status: OrderStatus,
    pub side: OrderSide,
    pub created: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DividendRecord {
    pub dividend_key: i64,
    pub portfolio_key: PortfolioKey,
    pub ticker: String,
    /// Dense 0-based position within the portfolio, across all tickers.
    pub dividend_id: i64,
    pub amount: f64,
    pub created: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionRecord {
    pub option_key: i64,
    pub portfolio_key: PortfolioKey,
    pub ticker: String,
    /// Dense 0-based position within the portfolio, across all tickers.
    pub option_id: i64,
    pub kind: OptionKind,
    pub strike: f64,
    pub premium: f64,
    pub quantity: f64,
    pub expires: String,
    pub status: OptionStatus,
    /// Realized figure; written only by close/expire/exercise.
    pub gain_loss: Option<f64>,
    pub created: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistRecord {
    pub watchlist_key: i64,
    pub user_id: UserId,
    pub watchlist_id: i64,
    pub name: String,
    pub description: String,
    pub created: String,
}

/// A new order as supplied by the caller. `created` defaults to now when
/// omitted; an explicit value must be in the ledger's storage format.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub price: f64,
    pub quantity: f64,
    pub status: OrderStatus,
    pub side: OrderSide,
    pub created: Option<String>,
}

/// A new option position as supplied by the caller.
#[derive(Debug, Clone)]
pub struct NewOption {
    pub kind: OptionKind,
    pub strike: f64,
    pub premium: f64,
    pub quantity: f64,
    pub expires: String,
    pub status: OptionStatus,
    pub created: Option<String>,
}

/// Tagged per-field update: `Keep` leaves the stored value untouched,
/// `Set` replaces it. Distinct from Option so "no change" can never be
/// confused with "clear this field".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<T> {
    Keep,
    Set(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Keep
    }
}

impl<T> Field<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Field::Set(_))
    }

    /// The value to write: the new one if set, otherwise the stored one.
    pub fn or_stored(self, stored: T) -> T {
        match self {
            Field::Set(v) => v,
            Field::Keep => stored,
        }
    }
}

/// Field-wise order update; `Keep` fields retain the stored values.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub price: Field<f64>,
    pub quantity: Field<f64>,
    pub status: Field<OrderStatus>,
    pub side: Field<OrderSide>,
    pub created: Field<String>,
}

impl OrderUpdate {
    pub fn is_empty(&self) -> bool {
        !(self.price.is_set()
            || self.quantity.is_set()
            || self.status.is_set()
            || self.side.is_set()
            || self.created.is_set())
    }
}

/// Field-wise option update. `gain_loss` is deliberately absent; it is
/// written only through the settle transitions.
#[derive(Debug, Clone, Default)]
pub struct OptionUpdate {
    pub kind: Field<OptionKind>,
    pub strike: Field<f64>,
    pub premium: Field<f64>,
    pub quantity: Field<f64>,
    pub expires: Field<String>,
    pub status: Field<OptionStatus>,
}

impl OptionUpdate {
    pub fn is_empty(&self) -> bool {
        !(self.kind.is_set()
            || self.strike.is_set()
            || self.premium.is_set()
            || self.quantity.is_set()
            || self.expires.is_set()
            || self.status.is_set())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            OrderStatus::Filled,
            OrderStatus::Pending,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("filled"), None);
        assert_eq!(OptionStatus::parse("Exercised"), Some(OptionStatus::Exercised));
        assert_eq!(OptionKind::parse("Put"), Some(OptionKind::Put));
        assert_eq!(OrderSide::parse("Sell"), Some(OrderSide::Sell));
    }

    #[test]
    fn test_settled_statuses() {
        assert!(OptionStatus::Closed.is_settled());
        assert!(OptionStatus::Expired.is_settled());
        assert!(OptionStatus::Exercised.is_settled());
        assert!(!OptionStatus::Pending.is_settled());
        assert!(!OptionStatus::Filled.is_settled());
    }

    #[test]
    fn test_timestamp_format_round_trip() {
        let now = timestamp_now();
        assert!(parse_timestamp(&now).is_some(), "generated: {now}");
        assert!(parse_timestamp("03-09-2024 11:59:59 PM").is_some());
        assert!(parse_timestamp("2024-03-09 23:59:59").is_none());
        assert!(parse_timestamp("garbage").is_none());
    }

    #[test]
    fn test_field_merge() {
        assert_eq!(Field::Set(4.0).or_stored(2.0), 4.0);
        assert_eq!(Field::<f64>::Keep.or_stored(2.0), 2.0);

        let update = OrderUpdate {
            price: Field::Set(10.0),
            ..Default::default()
        };
        assert!(!update.is_empty());
        assert!(OrderUpdate::default().is_empty());
        assert!(OptionUpdate::default().is_empty());
    }
}
