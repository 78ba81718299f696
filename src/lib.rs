//! Stockfolio Backend Library
//!
//! Exposes the portfolio ledger engine for use by binaries and tests.
//! The chat front end, market data feeds and display formatting live
//! elsewhere; everything here speaks plain scalars and typed records.

pub mod config;
pub mod ledger;
pub mod models;

pub use config::LedgerConfig;
pub use ledger::{Entity, LedgerError, LedgerResult, PortfolioLedger};
