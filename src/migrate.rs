use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the catalog schema on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Key sets are stored space-joined so membership is a LIKE on ' key '.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            identity_hash TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            language TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            phonetic_keys TEXT NOT NULL DEFAULT '',
            search_tokens TEXT NOT NULL DEFAULT '',
            added_at INTEGER NOT NULL,
            locations_json TEXT NOT NULL DEFAULT '{}',
            converted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refreshes (
            id TEXT PRIMARY KEY,
            started_at INTEGER NOT NULL,
            stopped_at INTEGER NOT NULL,
            already_present INTEGER NOT NULL,
            added INTEGER NOT NULL,
            duplicate INTEGER NOT NULL,
            invalid INTEGER NOT NULL,
            rejected INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            cancelled INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_added_at ON books(added_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_refreshes_started_at ON refreshes(started_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
