//! One-shot migration aligning every money column to DECIMAL(10,2).
//! Idempotent: re-running the ALTERs against already-normalized columns
//! is a no-op. Postgres only; the ALTER syntax is not portable.

use clap::Parser;
use sea_orm::{ConnectionTrait, TransactionTrait};
use tracing::info;

use bookshelf_api::config::{init_tracing, load_config};
use bookshelf_api::db;

const STATEMENTS: &[&str] = &[
    "ALTER TABLE books ALTER COLUMN price TYPE DECIMAL(10,2)",
    "ALTER TABLE orders ALTER COLUMN total_amount TYPE DECIMAL(10,2)",
    "ALTER TABLE order_details ALTER COLUMN price TYPE DECIMAL(10,2)",
    "ALTER TABLE payment_transactions ALTER COLUMN amount TYPE DECIMAL(10,2)",
];

#[derive(Parser)]
#[command(
    name = "normalize-prices",
    about = "Align all money columns to DECIMAL(10,2)"
)]
struct Args {
    /// Print the statements without executing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config()?;
    init_tracing(&config.log_level, config.log_json);

    if args.dry_run {
        for statement in STATEMENTS {
            println!("{};", statement);
        }
        return Ok(());
    }

    let pool = db::establish_connection_from_app_config(&config).await?;

    // All four columns change together or not at all.
    let txn = pool.begin().await?;
    for statement in STATEMENTS {
        info!(statement, "executing");
        txn.execute_unprepared(statement).await?;
    }
    txn.commit().await?;

    info!("Money columns normalized");
    Ok(())
}
