use crate::domain::port::RepositoryError;
use sqlx::mysql::MySqlDatabaseError;

/// MySQLのロック待ちタイムアウト
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
/// MySQLのデッドロック検出
const ER_LOCK_DEADLOCK: u16 = 1213;

/// データベースエラー型
/// データベース操作で発生するエラーを表現する
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseError {
    /// データベース接続エラー
    ConnectionError(String),
    /// 行ロックの待機タイムアウト、またはデッドロックによる中断
    LockWaitTimeout(String),
    /// SQLクエリエラー
    QueryError(String),
    /// マイグレーションエラー
    MigrationError(String),
}

impl DatabaseError {
    /// sqlxのエラーを分類する
    /// ロック待ちタイムアウトとデッドロックは再試行可能なエラーとして区別する
    pub fn classify(context: &str, err: sqlx::Error) -> Self {
        let lock_conflict = err
            .as_database_error()
            .and_then(|db_err| db_err.try_downcast_ref::<MySqlDatabaseError>())
            .map(|mysql_err| {
                matches!(mysql_err.number(), ER_LOCK_WAIT_TIMEOUT | ER_LOCK_DEADLOCK)
            })
            .unwrap_or(false);

        let message = format!("{}: {}", context, err);
        if lock_conflict {
            return DatabaseError::LockWaitTimeout(message);
        }

        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DatabaseError::ConnectionError(message),
            _ => DatabaseError::QueryError(message),
        }
    }
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseError::ConnectionError(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::LockWaitTimeout(msg) => write!(f, "Database lock wait timeout: {}", msg),
            DatabaseError::QueryError(msg) => write!(f, "Database query error: {}", msg),
            DatabaseError::MigrationError(msg) => write!(f, "Migration error: {}", msg),
        }
    }
}

impl std::error::Error for DatabaseError {}

/// DatabaseErrorからRepositoryErrorへの変換
impl From<DatabaseError> for RepositoryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConnectionError(msg) => RepositoryError::ConnectionFailed(msg),
            DatabaseError::LockWaitTimeout(msg) => RepositoryError::LockWaitTimeout(msg),
            DatabaseError::QueryError(msg) => RepositoryError::OperationFailed(msg),
            DatabaseError::MigrationError(msg) => RepositoryError::OperationFailed(msg),
        }
    }
}
