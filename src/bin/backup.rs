//! Dumps the bookstore database as SQL INSERT statements to a
//! timestamped file, either the full schema or a `--tables` subset.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, EntityTrait};
use tracing::info;

use bookshelf_api::config::{init_tracing, load_config};
use bookshelf_api::db;
use bookshelf_api::entities::{
    book, category, order, order_detail, payment_transaction, review, role, user,
};

/// Restore order: parents before children.
const ALL_TABLES: &[&str] = &[
    "roles",
    "users",
    "categories",
    "books",
    "orders",
    "order_details",
    "reviews",
    "payment_transactions",
];

#[derive(Parser)]
#[command(
    name = "backup",
    about = "Dump the bookstore database as SQL INSERT statements"
)]
struct Args {
    /// Comma-separated subset of tables (default: all)
    #[arg(long)]
    tables: Option<String>,

    /// Directory the dump file is written into
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config()?;
    init_tracing(&config.log_level, config.log_json);

    let selected: Vec<String> = match &args.tables {
        Some(raw) => {
            let requested: Vec<String> = raw
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            for table in &requested {
                if !ALL_TABLES.contains(&table.as_str()) {
                    anyhow::bail!("Unknown table '{}'", table);
                }
            }
            // Preserve restore order regardless of how the caller listed them.
            ALL_TABLES
                .iter()
                .filter(|t| requested.contains(&t.to_string()))
                .map(|t| t.to_string())
                .collect()
        }
        None => ALL_TABLES.iter().map(|t| t.to_string()).collect(),
    };
    if selected.is_empty() {
        anyhow::bail!("No tables selected");
    }

    let pool = db::establish_connection_from_app_config(&config).await?;

    let mut dump = String::new();
    writeln!(dump, "-- bookshelf backup {}", Utc::now().to_rfc3339())?;
    for table in &selected {
        info!(table, "dumping");
        let section = dump_table(&pool, table).await?;
        dump.push_str(&section);
    }

    let scope = if selected.len() == ALL_TABLES.len() {
        "full"
    } else {
        "partial"
    };
    let filename = format!(
        "backup_{}_{}.sql",
        scope,
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    let path = args.output_dir.join(filename);
    std::fs::write(&path, dump)?;

    info!(path = %path.display(), "backup written");
    Ok(())
}

async fn dump_table(db: &DatabaseConnection, table: &str) -> anyhow::Result<String> {
    let mut out = format!("\n-- {}\n", table);

    match table {
        "roles" => {
            for r in role::Entity::find().all(db).await? {
                writeln!(
                    out,
                    "INSERT INTO roles (id, name, description) VALUES ({}, {}, {});",
                    r.id,
                    quote(&r.name),
                    opt_str(&r.description)
                )?;
            }
        }
        "users" => {
            for u in user::Entity::find().all(db).await? {
                writeln!(
                    out,
                    "INSERT INTO users (id, username, password_hash, email, full_name, phone, address, role_id, registered_at, last_login_at, is_active) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {});",
                    u.id,
                    quote(&u.username),
                    quote(&u.password_hash),
                    quote(&u.email),
                    opt_str(&u.full_name),
                    opt_str(&u.phone),
                    opt_str(&u.address),
                    u.role_id,
                    timestamp(&u.registered_at),
                    opt_timestamp(&u.last_login_at),
                    boolean(u.is_active)
                )?;
            }
        }
        "categories" => {
            for c in category::Entity::find().all(db).await? {
                writeln!(
                    out,
                    "INSERT INTO categories (id, name, description, parent_id, is_active) VALUES ({}, {}, {}, {}, {});",
                    c.id,
                    quote(&c.name),
                    opt_str(&c.description),
                    opt_i32(c.parent_id),
                    boolean(c.is_active)
                )?;
            }
        }
        "books" => {
            for b in book::Entity::find().all(db).await? {
                writeln!(
                    out,
                    "INSERT INTO books (id, title, author, publisher, publish_year, category_id, description, price, cover_url, file_url, page_count, added_at, updated_at, is_active) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {});",
                    b.id,
                    quote(&b.title),
                    opt_str(&b.author),
                    opt_str(&b.publisher),
                    opt_i32(b.publish_year),
                    opt_i32(b.category_id),
                    opt_str(&b.description),
                    money(b.price),
                    opt_str(&b.cover_url),
                    quote(&b.file_url),
                    opt_i32(b.page_count),
                    timestamp(&b.added_at),
                    opt_timestamp(&b.updated_at),
                    boolean(b.is_active)
                )?;
            }
        }
        "orders" => {
            for o in order::Entity::find().all(db).await? {
                writeln!(
                    out,
                    "INSERT INTO orders (id, user_id, order_date, total_amount, payment_method, payment_settled, status) VALUES ({}, {}, {}, {}, {}, {}, {});",
                    o.id,
                    o.user_id,
                    timestamp(&o.order_date),
                    money(o.total_amount),
                    opt_str(&o.payment_method),
                    boolean(o.payment_settled),
                    quote(&o.status)
                )?;
            }
        }
        "order_details" => {
            for d in order_detail::Entity::find().all(db).await? {
                writeln!(
                    out,
                    "INSERT INTO order_details (id, order_id, book_id, price, downloaded, download_date) VALUES ({}, {}, {}, {}, {}, {});",
                    d.id,
                    d.order_id,
                    d.book_id,
                    money(d.price),
                    boolean(d.downloaded),
                    opt_timestamp(&d.download_date)
                )?;
            }
        }
        "reviews" => {
            for r in review::Entity::find().all(db).await? {
                writeln!(
                    out,
                    "INSERT INTO reviews (id, book_id, user_id, rating, comment, review_date, is_visible) VALUES ({}, {}, {}, {}, {}, {}, {});",
                    r.id,
                    r.book_id,
                    r.user_id,
                    r.rating,
                    opt_str(&r.comment),
                    timestamp(&r.review_date),
                    boolean(r.is_visible)
                )?;
            }
        }
        "payment_transactions" => {
            for t in payment_transaction::Entity::find().all(db).await? {
                writeln!(
                    out,
                    "INSERT INTO payment_transactions (id, order_id, amount, method, transaction_date, code, status) VALUES ({}, {}, {}, {}, {}, {}, {});",
                    t.id,
                    t.order_id,
                    money(t.amount),
                    quote(&t.method),
                    timestamp(&t.transaction_date),
                    quote(&t.code),
                    quote(&t.status)
                )?;
            }
        }
        other => anyhow::bail!("Unknown table '{}'", other),
    }

    Ok(out)
}

/// Single quotes are escaped by doubling, per SQL string literal rules.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn opt_str(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(quote)
        .unwrap_or_else(|| "NULL".to_string())
}

fn opt_i32(value: Option<i32>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "NULL".to_string())
}

fn timestamp(value: &DateTime<Utc>) -> String {
    format!("'{}'", value.format("%Y-%m-%d %H:%M:%S"))
}

fn opt_timestamp(value: &Option<DateTime<Utc>>) -> String {
    value
        .as_ref()
        .map(timestamp)
        .unwrap_or_else(|| "NULL".to_string())
}

fn boolean(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

fn money(value: Decimal) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_doubles_single_quotes() {
        assert_eq!(quote("O'Brien"), "'O''Brien'");
        assert_eq!(opt_str(&None), "NULL");
    }

    #[test]
    fn booleans_render_as_sql_keywords() {
        assert_eq!(boolean(true), "TRUE");
        assert_eq!(boolean(false), "FALSE");
    }
}
