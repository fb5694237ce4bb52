use std::{collections::HashMap, str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    QueryBuilder, Sqlite, SqlitePool,
};

use crate::{
    db::TrapStore,
    domain::{CapturedRequest, NewCapturedRequest, Trap},
    errors::AppError,
};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS traps (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        trap_id TEXT NOT NULL REFERENCES traps(id) ON DELETE CASCADE,
        method TEXT NOT NULL,
        path TEXT NOT NULL,
        headers TEXT NOT NULL,
        body TEXT NOT NULL,
        query TEXT NOT NULL,
        ip TEXT NOT NULL,
        content_type TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_requests_trap_id ON requests(trap_id)",
    "CREATE INDEX IF NOT EXISTS idx_requests_created_at ON requests(created_at)",
];

#[derive(Clone)]
pub struct SqliteTrapStore {
    pool: SqlitePool,
}

impl SqliteTrapStore {
    /// Opens (creating if needed) the database at `database_url` and ensures the
    /// schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database lives and dies with its one connection.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// SQLite datetime modifier that moves `now` back by `age`.
fn age_modifier(age: Duration) -> String {
    format!("-{:.3} seconds", age.as_secs_f64())
}

#[async_trait]
impl TrapStore for SqliteTrapStore {
    async fn create_trap(&self, id: &str, name: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO traps (id, name) VALUES (?1, ?2)")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_trap(&self, id: &str) -> Result<Trap, AppError> {
        let trap = sqlx::query_as::<_, Trap>(
            "SELECT id, name, created_at FROM traps WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        trap.ok_or(AppError::NotFound)
    }

    async fn list_recent_traps(&self, limit: u32) -> Result<Vec<Trap>, AppError> {
        let traps = sqlx::query_as::<_, Trap>(
            r#"
            SELECT id, name, created_at
            FROM traps
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(traps)
    }

    async fn count_requests_by_trap(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT trap_id, COUNT(*) FROM requests WHERE trap_id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(") GROUP BY trap_id");

        let rows = builder
            .build_query_as::<(String, i64)>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_request(&self, request: NewCapturedRequest) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO requests (trap_id, method, path, headers, body, query, ip, content_type)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(request.trap_id)
        .bind(request.method)
        .bind(request.path)
        .bind(request.headers)
        .bind(request.body)
        .bind(request.query)
        .bind(request.ip)
        .bind(request.content_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_requests_by_trap(
        &self,
        id: &str,
        limit: u32,
    ) -> Result<Vec<CapturedRequest>, AppError> {
        let requests = sqlx::query_as::<_, CapturedRequest>(
            r#"
            SELECT id, trap_id, method, path, headers, body, query, ip, content_type, created_at
            FROM requests
            WHERE trap_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    async fn delete_trap_cascade(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM requests WHERE trap_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM traps WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_requests_older_than(&self, age: Duration) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM requests WHERE created_at < strftime('%Y-%m-%d %H:%M:%f', 'now', ?1)",
        )
        .bind(age_modifier(age))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_orphaned_stale_traps(&self, age: Duration) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM traps
            WHERE created_at < strftime('%Y-%m-%d %H:%M:%f', 'now', ?1)
              AND NOT EXISTS (SELECT 1 FROM requests WHERE requests.trap_id = traps.id)
            "#,
        )
        .bind(age_modifier(age))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
