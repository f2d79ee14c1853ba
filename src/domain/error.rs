/// ドメイン層のエラー型
/// ビジネスルール違反を表現する
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 無効な状態遷移（例: キャンセル済みの予約を確定しようとした）
    InvalidTransition(String),
    /// 残席不足
    InsufficientSeats { requested: u32, remaining: u32 },
    /// 無効な数量（例: 0枚の予約）
    InvalidQuantity,
    /// 販売済み枚数を下回る定員への変更
    CapacityBelowSold { capacity: u32, sold: u32 },
    /// 無効な開催期間（開始が終了以降）
    InvalidSchedule(String),
    /// 不変条件違反（正しい運用では発生しない）
    InvariantViolation(String),
    /// 無効な値
    InvalidValue(String),
    /// 予約が存在するイベントの削除
    EventHasBookings(String),
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainError::InvalidTransition(msg) => write!(f, "Invalid status transition: {}", msg),
            DomainError::InsufficientSeats {
                requested,
                remaining,
            } => write!(
                f,
                "Insufficient seats: requested {}, remaining {}",
                requested, remaining
            ),
            DomainError::InvalidQuantity => write!(f, "Invalid quantity"),
            DomainError::CapacityBelowSold { capacity, sold } => write!(
                f,
                "Capacity {} is below already sold count {}",
                capacity, sold
            ),
            DomainError::InvalidSchedule(msg) => write!(f, "Invalid schedule: {}", msg),
            DomainError::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
            DomainError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            DomainError::EventHasBookings(msg) => write!(f, "Event has bookings: {}", msg),
        }
    }
}

impl std::error::Error for DomainError {}
