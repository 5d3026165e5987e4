//! SQLite connection management and sqlx error mapping.
//!
//! Pools are opened with WAL journaling so a reindex can run while other
//! invocations read. The database file and its parent directories are
//! created automatically.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use memory_harness_core::error::BackendError;

/// Open a pool on the SQLite file at `path`, creating it if missing.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    connect_url(&format!("sqlite:{}", path.display())).await
}

/// Open a pool from a `sqlite:` URL.
pub async fn connect_url(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Remove a SQLite file together with its WAL side files.
pub fn remove_db_files(path: &Path) -> std::io::Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        match std::fs::remove_file(&name) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Classify a sqlx error for the query path.
pub fn backend_error(e: sqlx::Error) -> BackendError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => BackendError::Unavailable(e.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            BackendError::Malformed(e.to_string())
        }
        _ => BackendError::Query(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_creates_parent_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a").join("b").join("x.db");
        let pool = connect(&path).await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
        pool.close().await;
        assert!(path.exists());
    }

    #[test]
    fn test_remove_db_files_ignores_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("gone.db");
        std::fs::write(&path, b"x").unwrap();
        std::fs::write(tmp.path().join("gone.db-wal"), b"x").unwrap();
        remove_db_files(&path).unwrap();
        assert!(!path.exists());
        assert!(!tmp.path().join("gone.db-wal").exists());
        remove_db_files(&path).unwrap();
    }

    #[test]
    fn test_pool_timeout_is_unavailable() {
        assert!(backend_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(matches!(
            backend_error(sqlx::Error::RowNotFound),
            BackendError::Query(_)
        ));
    }
}
