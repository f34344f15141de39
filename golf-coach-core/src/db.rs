use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;
use crate::error::GolfCoachError;

/// Annotation columns added after the first release. Older databases get
/// them through `ALTER TABLE` on startup.
const ANNOTATION_COLUMNS: &[(&str, &str)] = &[
    ("club", "VARCHAR(100)"),
    ("shot_outcome", "VARCHAR(50)"),
    ("focus_area", "TEXT"),
    ("notes", "TEXT"),
];

pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

    // An in-memory database exists per connection, so keep exactly one alive.
    let in_memory = config.url.contains(":memory:");
    let max_connections = if in_memory { 1 } else { config.max_connections };

    let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
    if in_memory {
        pool_options = pool_options.min_connections(1).idle_timeout(None).max_lifetime(None);
    }
    pool_options.connect_with(options).await
}

/// Open the pool and bring the schema up to date.
pub async fn init_database(config: &DatabaseConfig) -> Result<SqlitePool, GolfCoachError> {
    let pool = create_pool(config).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS swings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            images TEXT NOT NULL,
            analysis TEXT NOT NULL,
            summary VARCHAR(500),
            rating INTEGER,
            positions_analyzed VARCHAR(200) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let added = migrate_annotation_columns(pool).await?;
    if added > 0 {
        tracing::info!(columns = added, "Added annotation columns to swings table");
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_swings_created_at ON swings (created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Add any missing annotation columns. Returns how many were added.
pub async fn migrate_annotation_columns(pool: &SqlitePool) -> Result<usize, sqlx::Error> {
    let existing: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info('swings')")
        .fetch_all(pool)
        .await?;
    let existing: Vec<String> = existing.into_iter().map(|(name,)| name).collect();

    let mut added = 0;
    for (name, column_type) in ANNOTATION_COLUMNS {
        if existing.iter().any(|c| c == name) {
            continue;
        }
        tracing::info!(column = *name, column_type = *column_type, "Adding column to swings");
        sqlx::query(&format!("ALTER TABLE swings ADD COLUMN {} {}", name, column_type))
            .execute(pool)
            .await?;
        added += 1;
    }

    Ok(added)
}

pub async fn health_check(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()").fetch_one(pool).await?;
    Ok(row.0)
}
