use crate::domain::error::DomainError;
use crate::domain::port::RepositoryError;

/// アプリケーション層のエラー型
/// ドメインエラーとリポジトリエラーをラップする。
/// キャッシュや通知の失敗はここには現れない（ログに残して補償する）
#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    /// 残席不足（予約は作成されていない）
    #[error("Capacity exhausted for event {0}")]
    CapacityExhausted(String),
    /// エンティティが見つからない
    #[error("Not found: {0}")]
    NotFound(String),
    /// ドメインエラー（ビジネスルール違反）
    #[error("Domain error: {0}")]
    Domain(DomainError),
    /// ロック待ちタイムアウトなど、再試行で解消し得るストアの失敗
    #[error("Transient store failure: {0}")]
    TransientStoreFailure(RepositoryError),
    /// リポジトリエラー（永続化の失敗）
    #[error("Repository error: {0}")]
    Repository(RepositoryError),
    /// 永続化されたデータが不変条件を満たしていない
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl ApplicationError {
    /// 再試行可能なエラーかどうか
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApplicationError::TransientStoreFailure(_))
    }
}

// From実装でエラー変換を簡潔に
impl From<DomainError> for ApplicationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvariantViolation(msg) => ApplicationError::InvariantViolation(msg),
            other => ApplicationError::Domain(other),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        if let RepositoryError::InvariantViolation(msg) = err {
            return ApplicationError::InvariantViolation(msg);
        }
        if err.is_transient() {
            ApplicationError::TransientStoreFailure(err)
        } else {
            ApplicationError::Repository(err)
        }
    }
}
