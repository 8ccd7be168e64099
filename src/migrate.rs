use anyhow::Context;
use sqlx::SqlitePool;
use tracing::info;

use crate::remote::now_ms;

static MIGRATIONS: &[(&str, &str)] = &[(
    "0001_households.sql",
    include_str!("../migrations/0001_households.sql"),
)];

pub async fn apply_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version TEXT PRIMARY KEY, applied_at INTEGER NOT NULL)",
    )
    .execute(pool)
    .await
    .context("create schema_migrations")?;

    for (version, sql) in MIGRATIONS {
        let applied: Option<String> =
            sqlx::query_scalar("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(*version)
                .fetch_optional(pool)
                .await
                .with_context(|| format!("check migration {version}"))?;
        if applied.is_some() {
            continue;
        }

        let mut tx = pool.begin().await.context("begin migration")?;
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("apply migration {version}"))?;
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(*version)
            .bind(now_ms())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("record migration {version}"))?;
        tx.commit()
            .await
            .with_context(|| format!("commit migration {version}"))?;
        info!(target: "hearth", event = "migration_applied", version = *version);
    }
    Ok(())
}
