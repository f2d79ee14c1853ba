use crate::adapter::database_error::DatabaseError;
use sqlx::{MySql, Pool};

/// 埋め込みのマイグレーション（ファイル名, SQL）
const MIGRATIONS: [(&str, &str); 2] = [
    (
        "001_create_events_table.sql",
        include_str!("../../migrations/001_create_events_table.sql"),
    ),
    (
        "002_create_bookings_table.sql",
        include_str!("../../migrations/002_create_bookings_table.sql"),
    ),
];

/// データベースマイグレーションを管理する構造体
pub struct DatabaseMigration {
    pool: Pool<MySql>,
}

impl DatabaseMigration {
    /// 新しいDatabaseMigrationインスタンスを作成
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// マイグレーションを実行
    /// べき等性を保証（CREATE TABLE IF NOT EXISTS）
    pub async fn run(&self) -> Result<(), DatabaseError> {
        for (name, migration_sql) in MIGRATIONS {
            tracing::debug!(migration = name, "Running migration");
            sqlx::query(migration_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| DatabaseError::MigrationError(format!("{} failed: {}", name, e)))?;
        }

        tracing::info!(count = MIGRATIONS.len(), "All migrations completed");
        Ok(())
    }
}
