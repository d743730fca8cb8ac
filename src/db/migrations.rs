//! Journal database bootstrap: connection options, schema, generation pointer.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");

/// Open (creating if needed) the journal database at `db_path`.
///
/// Every pooled connection runs in WAL mode with foreign keys enforced; the
/// position store relies on `ON DELETE CASCADE` when it drops generations.
///
/// # Errors
/// Returns an error if the directory cannot be created, the database cannot be
/// opened, or the schema fails to apply.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(dir) = Path::new(db_path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(sqlx::Error::Io)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;
    let current = current_generation(&pool).await?;

    info!(
        path = %db_path,
        current_generation = ?current,
        "Journal database ready"
    );
    Ok(pool)
}

/// Apply `schema.sql`. Every statement is `IF NOT EXISTS` / `OR IGNORE`, so
/// reopening an existing journal is a no-op.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let mut applied = 0usize;
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
        applied += 1;
    }
    debug!(applied, "Schema statements applied");
    Ok(())
}

/// The seeded `store_state` row must exist; readers follow its pointer.
async fn current_generation(pool: &SqlitePool) -> Result<Option<i64>, sqlx::Error> {
    let row = sqlx::query("SELECT current_generation_id FROM store_state WHERE id = 1")
        .fetch_one(pool)
        .await?;
    Ok(row.get::<Option<i64>, _>("current_generation_id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn db_path(dir: &TempDir) -> String {
        dir.path()
            .join("nested")
            .join("journal.db")
            .to_string_lossy()
            .to_string()
    }

    #[tokio::test]
    async fn test_init_creates_file_and_tables() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);
        let pool = init_db(&path).await.expect("init_db failed");
        assert!(Path::new(&path).exists());

        for table in [
            "fills",
            "position_generations",
            "store_state",
            "positions",
            "daily_summaries",
        ] {
            let row = sqlx::query(
                "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(row.get::<i64, _>("n"), 1, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_connections_enforce_foreign_keys_and_wal() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.unwrap();

        let fk: i64 = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);
        assert_eq!(fk, 1);

        let mode: String = sqlx::query("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_reopen_keeps_single_pointer_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);
        let pool = init_db(&path).await.unwrap();
        assert_eq!(current_generation(&pool).await.unwrap(), None);

        apply_schema(&pool).await.unwrap();
        drop(pool);
        let pool = init_db(&path).await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM store_state")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 1);
    }
}
