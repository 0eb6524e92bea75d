//! Database initialization tests

use heimdex_common::db::init_database;

async fn table_exists(pool: &sqlx::SqlitePool, name: &str) -> bool {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(pool)
            .await
            .unwrap();
    count == 1
}

#[tokio::test]
async fn init_creates_all_tables() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("heimdex.db")).await.unwrap();

    for table in ["sources", "files", "jobs", "config"] {
        assert!(table_exists(&pool, table).await, "missing table {table}");
    }
}

#[tokio::test]
async fn init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("heimdex.db");

    let pool = init_database(&db_path).await.unwrap();
    pool.close().await;

    // Re-opening an existing database must not fail or lose data.
    let pool = init_database(&db_path).await.unwrap();
    assert!(table_exists(&pool, "jobs").await);
}

#[tokio::test]
async fn running_jobs_are_failed_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("heimdex.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query(
        "INSERT INTO jobs (id, type, status, progress, created_at, updated_at) \
         VALUES ('j1', 'index', 'running', 33, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let (status, error): (String, String) =
        sqlx::query_as("SELECT status, error FROM jobs WHERE id = 'j1'")
            .fetch_one(&pool)
            .await
            .unwrap();

    assert_eq!(status, "failed");
    assert_eq!(error, "interrupted by restart");

    let running: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'running'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(running, 0);
}
