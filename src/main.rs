//! Stockfolio Ledger CLI
//!
//! Small admin surface over the ledger database. The chat front end
//! talks to the library directly; this binary exists for operators.
//!
//! Usage:
//!   cargo run --bin stockfolio -- stats
//!   cargo run --bin stockfolio -- --db /path/to/stockfolio.db reindex --user 1234

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;

use stockfolio_backend::{LedgerConfig, PortfolioLedger};

#[derive(Parser, Debug)]
#[command(name = "stockfolio")]
#[command(about = "Inspect and repair a stockfolio ledger database")]
struct Args {
    /// Path to the SQLite ledger database
    #[arg(long, env = "DB_PATH")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print row counts and per-user holdings
    Stats,

    /// Re-run every dense-index compactor scope for one user
    Reindex {
        #[arg(long)]
        user: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stockfolio=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let config = match args.db {
        Some(db_path) => LedgerConfig::new(db_path),
        None => LedgerConfig::from_env(),
    };
    let ledger = PortfolioLedger::open(&config)
        .with_context(|| format!("failed to open ledger at {}", config.db_path))?;

    match args.command {
        Commands::Stats => print_stats(&ledger, &config.db_path).await?,
        Commands::Reindex { user } => reindex_user(&ledger, user).await?,
    }

    Ok(())
}

async fn print_stats(ledger: &PortfolioLedger, db_path: &str) -> Result<()> {
    println!("=== Stockfolio Ledger ===");
    println!("Database: {}", db_path);
    println!();
    println!("Users:      {}", ledger.total_user_count().await?);
    println!("Portfolios: {}", ledger.total_portfolio_count().await?);
    println!("Orders:     {}", ledger.total_order_count().await?);
    println!("Dividends:  {}", ledger.total_dividend_count().await?);
    println!("Options:    {}", ledger.total_option_count().await?);
    println!("Watchlists: {}", ledger.total_watchlist_count().await?);
    println!("Watched:    {}", ledger.total_watched_count().await?);
    println!();

    for user in ledger.list_users().await? {
        let portfolios = ledger.list_portfolios(user.user_id).await?;
        println!("user {} ({} portfolios)", user.user_id, portfolios.len());
        for portfolio in portfolios {
            let gain_loss = ledger
                .portfolio_gain_loss(user.user_id, portfolio.portfolio_id)
                .await?;
            let dividends = ledger
                .portfolio_dividends(user.user_id, portfolio.portfolio_id)
                .await?;
            println!(
                "  [{}] {} | gain/loss {}, dividends {}",
                portfolio.portfolio_id,
                portfolio.name,
                gain_loss.map_or_else(|| "n/a".to_string(), |v| format!("${v:.2}")),
                dividends.map_or_else(|| "n/a".to_string(), |v| format!("${v:.2}")),
            );
        }
    }

    Ok(())
}

async fn reindex_user(ledger: &PortfolioLedger, user_id: i64) -> Result<()> {
    let portfolios = ledger.reindex_portfolios(user_id).await?;
    let watchlists = ledger.reindex_watchlists(user_id).await?;
    println!("portfolios: {portfolios} renumbered");
    println!("watchlists: {watchlists} renumbered");

    for portfolio in ledger.list_portfolios(user_id).await? {
        let dividends = ledger
            .reindex_dividends(user_id, portfolio.portfolio_id)
            .await?;
        let options = ledger
            .reindex_options(user_id, portfolio.portfolio_id)
            .await?;
        let mut orders = 0;
        for ticker in ledger
            .portfolio_tickers(user_id, portfolio.portfolio_id)
            .await?
        {
            orders += ledger
                .reindex_orders(user_id, portfolio.portfolio_id, &ticker)
                .await?;
        }
        println!(
            "portfolio [{}]: {orders} orders, {dividends} dividends, {options} options renumbered",
            portfolio.portfolio_id
        );
    }

    Ok(())
}
