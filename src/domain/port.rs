// 出力ポート
// ドメイン層・アプリケーション層が外部に依存する機能をトレイトとして定義
// アダプター層でこれらのトレイトを実装する

use crate::domain::message::{BookingCreated, MessageError};
use crate::domain::model::{Booking, BookingId, Event, EventId, EventStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// ログレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// ロガートレイト
/// ログ出力を抽象化するポート
pub trait Logger: Send + Sync {
    /// デバッグレベルのログを出力
    fn debug(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 情報レベルのログを出力
    fn info(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// 警告レベルのログを出力
    fn warn(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );

    /// エラーレベルのログを出力
    fn error(
        &self,
        component: &str,
        message: &str,
        correlation_id: Option<Uuid>,
        context: Option<HashMap<String, String>>,
    );
}

/// ログコンテキストを組み立てるヘルパー
pub fn log_context<const N: usize>(pairs: [(&str, String); N]) -> Option<HashMap<String, String>> {
    Some(
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

/// リポジトリエラー型
/// リポジトリ操作で発生するエラーを表現する
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    /// データベース接続に失敗
    ConnectionFailed(String),
    /// 行ロックの待機がタイムアウト（再試行可能）
    LockWaitTimeout(String),
    /// 操作に失敗
    OperationFailed(String),
    /// データの取得に失敗
    FetchFailed(String),
    /// 永続化された行が不変条件を満たしていない
    InvariantViolation(String),
}

impl RepositoryError {
    /// 再試行で解消し得るエラーかどうか
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::ConnectionFailed(_) | RepositoryError::LockWaitTimeout(_)
        )
    }
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            RepositoryError::LockWaitTimeout(msg) => write!(f, "Lock wait timeout: {}", msg),
            RepositoryError::OperationFailed(msg) => write!(f, "Operation failed: {}", msg),
            RepositoryError::FetchFailed(msg) => write!(f, "Fetch failed: {}", msg),
            RepositoryError::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// ストアのトランザクションハンドル
/// 行ロックはコミットまたはロールバックまで保持される。
/// コミットせずに破棄した場合はロールバックとして扱う
#[async_trait]
pub trait StoreTransaction: Send {
    /// イベント行を排他ロックして取得する（SELECT ... FOR UPDATE）
    /// 同一トランザクション内での再取得はロック済みの行を返す
    ///
    /// # Returns
    /// * `Ok(Some(Event))` - ロック取得成功
    /// * `Ok(None)` - イベントが存在しない
    /// * `Err(RepositoryError::LockWaitTimeout)` - ロック待ちがタイムアウト
    async fn lock_event(&mut self, event_id: EventId) -> Result<Option<Event>, RepositoryError>;

    /// ロック済みのイベント行を書き戻す
    async fn save_event(&mut self, event: &Event) -> Result<(), RepositoryError>;

    /// 予約を挿入する
    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), RepositoryError>;

    /// 予約行を排他ロックして取得する
    async fn lock_booking(&mut self, booking_id: BookingId)
        -> Result<Option<Booking>, RepositoryError>;

    /// ロック済みの予約行のステータスを書き戻す
    async fn save_booking_status(&mut self, booking: &Booking) -> Result<(), RepositoryError>;

    /// イベントに紐づく予約が1件でも存在するか
    /// イベント行をロックした後に呼ぶこと（予約の作成はイベント行のロックを取る）
    async fn has_bookings(&mut self, event_id: EventId) -> Result<bool, RepositoryError>;

    /// ロック済みのイベント行を削除する
    async fn delete_event(&mut self, event_id: EventId) -> Result<(), RepositoryError>;

    /// コミットしてロックを解放する
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    /// ロールバックしてロックを解放する
    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// 在庫ストアトレイト
/// イベントと残席数の正となる永続化を抽象化する
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// トランザクションを開始する
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, RepositoryError>;

    /// イベントを登録する
    async fn create_event(&self, event: &Event) -> Result<(), RepositoryError>;

    /// イベントIDでイベントを検索する（ロックなし）
    ///
    /// # Returns
    /// * `Ok(Some(Event))` - イベントが見つかった
    /// * `Ok(None)` - イベントが見つからなかった
    /// * `Err(RepositoryError)` - 検索失敗
    async fn find_event(&self, event_id: EventId) -> Result<Option<Event>, RepositoryError>;

    /// すべてのイベントを開始日時の昇順で取得する
    async fn list_events(&self) -> Result<Vec<Event>, RepositoryError>;

    /// 開始日時の昇順で1ページ分のイベントを取得する
    ///
    /// # Arguments
    /// * `limit` - 取得する最大件数
    /// * `offset` - 読み飛ばす件数
    async fn list_events_page(&self, limit: u32, offset: u32)
        -> Result<Vec<Event>, RepositoryError>;
}

/// 予約台帳トレイト
/// 予約の参照系を抽象化する。書き込みはStoreTransaction経由で行う
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// 予約IDで予約を検索する
    async fn find_by_id(&self, booking_id: BookingId) -> Result<Option<Booking>, RepositoryError>;

    /// 指定日時より前に作成されたPENDINGの予約を作成日時の昇順で取得する
    ///
    /// # Arguments
    /// * `cutoff` - この日時より前に作成された予約が対象
    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError>;

    /// CONFIRMEDの予約のみから販売枚数と売上を集計する
    async fn confirmed_stats(&self, event_id: EventId) -> Result<EventStats, RepositoryError>;

    /// 新しい一意の予約IDを生成する
    fn next_identity(&self) -> BookingId;
}

/// キャッシュエラー
/// 呼び出し元には伝播させず、ログに残して正のストアへフォールバックする
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    #[error("Cache entry corrupted: {0}")]
    Corrupted(String),
}

/// 在庫キャッシュトレイト
/// 残席カウンタ、統計、保留タイムアウトマーカーを保持する。いずれも欠落し得る
#[async_trait]
pub trait InventoryCache: Send + Sync {
    /// 残席カウンタを上書きする
    async fn set_remaining(&self, event_id: EventId, remaining: u32) -> Result<(), CacheError>;

    /// 残席カウンタを取得する
    async fn get_remaining(&self, event_id: EventId) -> Result<Option<i64>, CacheError>;

    /// 残席カウンタをアトミックに減算する
    /// カウンタが存在しない場合は作成せずに `Ok(None)` を返す
    async fn decrement_remaining(
        &self,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Option<i64>, CacheError>;

    /// 残席カウンタをアトミックに加算する
    async fn increment_remaining(&self, event_id: EventId, quantity: u32)
        -> Result<i64, CacheError>;

    /// イベントの残席カウンタと統計を削除する
    async fn remove_event(&self, event_id: EventId) -> Result<(), CacheError>;

    /// 統計を有効期限なしで保存する
    async fn set_stats(&self, event_id: EventId, stats: &EventStats) -> Result<(), CacheError>;

    /// 統計を取得する
    async fn get_stats(&self, event_id: EventId) -> Result<Option<EventStats>, CacheError>;

    /// 保留タイムアウトマーカーを設定する
    async fn set_pending_marker(&self, booking_id: BookingId, ttl: Duration)
        -> Result<(), CacheError>;

    /// 保留タイムアウトマーカーを削除する
    async fn clear_pending_marker(&self, booking_id: BookingId) -> Result<(), CacheError>;

    /// 保留タイムアウトマーカーが有効かどうか
    async fn has_pending_marker(&self, booking_id: BookingId) -> Result<bool, CacheError>;
}

/// 通知バスエラー
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),
    #[error(transparent)]
    Encoding(#[from] MessageError),
}

/// 通知バストレイト
/// 予約作成通知を非同期の確定処理へ引き渡す発行専用ポート
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// 予約作成通知を発行する
    async fn publish(&self, message: &BookingCreated) -> Result<(), NotificationError>;
}

/// 確定可否の判定ポート
/// 決済ゲートウェイなど、予約を確定してよいかを判断する外部の意思決定点
#[async_trait]
pub trait ConfirmationPolicy: Send + Sync {
    /// 予約を確定してよければtrue
    async fn approve(&self, message: &BookingCreated) -> bool;
}
