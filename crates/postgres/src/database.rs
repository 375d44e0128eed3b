use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// Creates a connection pool to the PostgreSQL database at `database_url`.
pub async fn create_connection_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Tests the database connection by executing a simple query.
pub async fn test_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    let row = sqlx::query("SELECT 1 as test").fetch_one(pool).await?;

    let test_value: i32 = row.get("test");
    log::info!("Database connection successful (test value: {})", test_value);

    Ok(())
}

/// Creates the `promotion_ledger` table when it does not exist yet.
///
/// One row per tracked promotion; `used_count` never exceeds `max_uses`.
/// Rows of deleted promotions stay behind with `retired_at` set.
pub async fn ensure_ledger_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS promotion_ledger (
            promotion_id TEXT PRIMARY KEY,
            max_uses INTEGER NOT NULL CHECK (max_uses > 0),
            used_count INTEGER NOT NULL DEFAULT 0 CHECK (used_count >= 0),
            retired_at TIMESTAMPTZ,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CHECK (used_count <= max_uses)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tables created before promotions could be retired
    sqlx::query("ALTER TABLE promotion_ledger ADD COLUMN IF NOT EXISTS retired_at TIMESTAMPTZ")
        .execute(pool)
        .await?;

    log::info!("Promotion ledger schema ready");
    Ok(())
}
