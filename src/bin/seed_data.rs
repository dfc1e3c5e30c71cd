//! Idempotent initializer: seeds the two roles, the admin account and a
//! starter category tree. Safe to run repeatedly.
//!
//! The admin password comes from SEED_ADMIN_PASSWORD; the run aborts
//! without it rather than invent a credential.

use std::env;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::info;

use bookshelf_api::auth::hash_password;
use bookshelf_api::config::{init_tracing, load_config};
use bookshelf_api::db;
use bookshelf_api::entities::{category, role, user};
use bookshelf_api::services::accounts::{ADMIN_ROLE, MEMBER_ROLE};

const ADMIN_USERNAME: &str = "admin";
const ADMIN_EMAIL: &str = "admin@bookshelf.local";

const CATEGORY_TREE: &[(&str, &[&str])] = &[
    ("Fiction", &["Science Fiction", "Fantasy", "Mystery"]),
    ("Non-fiction", &["Biography", "History", "Science"]),
    ("Technology", &["Programming", "Databases"]),
    ("Business", &[]),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.log_level, config.log_json);

    let admin_password = env::var("SEED_ADMIN_PASSWORD")
        .map_err(|_| anyhow::anyhow!("SEED_ADMIN_PASSWORD is required to seed the admin user"))?;
    if admin_password.len() < 8 {
        anyhow::bail!("SEED_ADMIN_PASSWORD must be at least 8 characters");
    }

    let pool = db::establish_connection_from_app_config(&config).await?;
    db::run_migrations(&pool).await?;

    let admin_role_id = ensure_role(&pool, ADMIN_ROLE, "Full back-office access").await?;
    let member_role_id = ensure_role(&pool, MEMBER_ROLE, "Regular customer").await?;
    info!(admin_role_id, member_role_id, "roles ready");

    ensure_admin_user(&pool, admin_role_id, &admin_password).await?;
    ensure_categories(&pool).await?;

    info!("Seeding complete");
    Ok(())
}

async fn ensure_role(
    db: &DatabaseConnection,
    name: &str,
    description: &str,
) -> anyhow::Result<i32> {
    if let Some(existing) = role::Entity::find()
        .filter(role::Column::Name.eq(name))
        .one(db)
        .await?
    {
        return Ok(existing.id);
    }

    let created = role::ActiveModel {
        name: Set(name.to_string()),
        description: Set(Some(description.to_string())),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(role = name, id = created.id, "created role");
    Ok(created.id)
}

async fn ensure_admin_user(
    db: &DatabaseConnection,
    admin_role_id: i32,
    password: &str,
) -> anyhow::Result<()> {
    if user::Entity::find()
        .filter(user::Column::Username.eq(ADMIN_USERNAME))
        .one(db)
        .await?
        .is_some()
    {
        info!("admin user already present; leaving it untouched");
        return Ok(());
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;

    let created = user::ActiveModel {
        username: Set(ADMIN_USERNAME.to_string()),
        password_hash: Set(password_hash),
        email: Set(ADMIN_EMAIL.to_string()),
        full_name: Set(Some("Store Administrator".to_string())),
        phone: Set(None),
        address: Set(None),
        role_id: Set(admin_role_id),
        registered_at: Set(Utc::now()),
        last_login_at: Set(None),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(user_id = created.id, "created admin user");
    Ok(())
}

async fn ensure_categories(db: &DatabaseConnection) -> anyhow::Result<()> {
    for (root_name, children) in CATEGORY_TREE {
        let root_id = ensure_category(db, root_name, None).await?;
        for child_name in *children {
            ensure_category(db, child_name, Some(root_id)).await?;
        }
    }
    Ok(())
}

async fn ensure_category(
    db: &DatabaseConnection,
    name: &str,
    parent_id: Option<i32>,
) -> anyhow::Result<i32> {
    if let Some(existing) = category::Entity::find()
        .filter(category::Column::Name.eq(name))
        .one(db)
        .await?
    {
        return Ok(existing.id);
    }

    let created = category::ActiveModel {
        name: Set(name.to_string()),
        description: Set(None),
        parent_id: Set(parent_id),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(category = name, id = created.id, "created category");
    Ok(created.id)
}
