use chrono::{DateTime, Utc};

use crate::domain::error::DomainError;
use crate::domain::model::{EventId, Money};

/// イベント集約
/// 定員と残席数を管理する。残席数は予約と返却以外では変化しない
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: EventId,
    name: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    capacity: u32,
    remaining: u32,
    unit_price: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Event {
    /// 新しいイベントを作成
    /// 残席数は定員と同じ値で始まる
    ///
    /// # Arguments
    /// * `id` - イベントID
    /// * `name` - イベント名
    /// * `starts_at` / `ends_at` - 開催期間
    /// * `capacity` - 定員
    /// * `unit_price` - チケット単価
    /// * `now` - 作成日時
    pub fn new(
        id: EventId,
        name: String,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        capacity: u32,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Self::validate_name(&name)?;
        Self::validate_schedule(starts_at, ends_at)?;

        Ok(Self {
            id,
            name,
            starts_at,
            ends_at,
            capacity,
            remaining: capacity,
            unit_price,
            created_at: now,
            updated_at: now,
        })
    }

    /// 永続化されたデータからイベントを再構築
    /// `remaining > capacity` の行は不変条件違反として扱う
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: EventId,
        name: String,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        capacity: u32,
        remaining: u32,
        unit_price: Money,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if remaining > capacity {
            return Err(DomainError::InvariantViolation(format!(
                "イベント {} の残席数 {} が定員 {} を超えています",
                id, remaining, capacity
            )));
        }

        Ok(Self {
            id,
            name,
            starts_at,
            ends_at,
            capacity,
            remaining,
            unit_price,
            created_at,
            updated_at,
        })
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 販売済み（保留中を含む）の枚数
    pub fn sold(&self) -> u32 {
        self.capacity - self.remaining
    }

    /// 座席を予約する
    ///
    /// # Arguments
    /// * `quantity` - 予約する枚数
    /// * `now` - 更新日時
    ///
    /// # Returns
    /// * `Ok(())` - 予約成功
    /// * `Err(DomainError::InsufficientSeats)` - 残席不足（残席数は変わらない）
    pub fn reserve(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity);
        }
        if !self.has_available_seats(quantity) {
            return Err(DomainError::InsufficientSeats {
                requested: quantity,
                remaining: self.remaining,
            });
        }
        self.remaining -= quantity;
        self.updated_at = now;
        Ok(())
    }

    /// 座席を返却する（キャンセル時）
    /// 定員を超えないように丸めるため、二重返却しても定員以上にはならない
    ///
    /// # Returns
    /// * 実際に返却された枚数
    pub fn release(&mut self, quantity: u32, now: DateTime<Utc>) -> u32 {
        let restored = quantity.min(self.sold());
        self.remaining += restored;
        self.updated_at = now;
        restored
    }

    /// 指定された枚数の残席があるかチェック
    pub fn has_available_seats(&self, quantity: u32) -> bool {
        self.remaining >= quantity
    }

    /// 定員を変更する
    /// 販売済み枚数は維持し、残席数を新しい定員から再計算する
    ///
    /// # Returns
    /// * `Err(DomainError::CapacityBelowSold)` - 新しい定員が販売済み枚数未満
    pub fn change_capacity(&mut self, capacity: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        let sold = self.sold();
        if capacity < sold {
            return Err(DomainError::CapacityBelowSold { capacity, sold });
        }
        self.capacity = capacity;
        self.remaining = capacity - sold;
        self.updated_at = now;
        Ok(())
    }

    /// イベント名を変更
    pub fn rename(&mut self, name: String, now: DateTime<Utc>) -> Result<(), DomainError> {
        Self::validate_name(&name)?;
        self.name = name;
        self.updated_at = now;
        Ok(())
    }

    /// 開催期間を変更
    pub fn reschedule(
        &mut self,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        Self::validate_schedule(starts_at, ends_at)?;
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self.updated_at = now;
        Ok(())
    }

    /// 単価を変更
    /// 既存の予約は作成時の単価を保持しているため影響を受けない
    pub fn reprice(&mut self, unit_price: Money, now: DateTime<Utc>) {
        self.unit_price = unit_price;
        self.updated_at = now;
    }

    fn validate_name(name: &str) -> Result<(), DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::InvalidValue(
                "イベント名は空にできません".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_schedule(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<(), DomainError> {
        if starts_at >= ends_at {
            return Err(DomainError::InvalidSchedule(
                "開始日時は終了日時より前である必要があります".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_event(capacity: u32) -> Event {
        let now = Utc::now();
        Event::new(
            EventId::new(),
            "Summer Live".to_string(),
            now + Duration::days(7),
            now + Duration::days(7) + Duration::hours(3),
            capacity,
            Money::from_minor(5000).unwrap(),
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_event_creation() {
        let event = sample_event(10);
        assert_eq!(event.capacity(), 10);
        assert_eq!(event.remaining(), 10);
        assert_eq!(event.sold(), 0);
    }

    #[test]
    fn test_event_rejects_inverted_schedule() {
        let now = Utc::now();
        let result = Event::new(
            EventId::new(),
            "Broken".to_string(),
            now,
            now - Duration::hours(1),
            10,
            Money::zero(),
            now,
        );
        assert!(matches!(result, Err(DomainError::InvalidSchedule(_))));
    }

    #[test]
    fn test_reserve_success() {
        let mut event = sample_event(10);
        event.reserve(6, Utc::now()).unwrap();
        assert_eq!(event.remaining(), 4);
    }

    #[test]
    fn test_reserve_insufficient_seats() {
        let mut event = sample_event(5);
        let result = event.reserve(6, Utc::now());
        assert_eq!(
            result.unwrap_err(),
            DomainError::InsufficientSeats {
                requested: 6,
                remaining: 5
            }
        );
        assert_eq!(event.remaining(), 5); // 残席数は変わらない
    }

    #[test]
    fn test_reserve_exact_quantity() {
        let mut event = sample_event(10);
        event.reserve(10, Utc::now()).unwrap();
        assert_eq!(event.remaining(), 0);
        assert!(!event.has_available_seats(1));
    }

    #[test]
    fn test_release_is_clamped_to_capacity() {
        let mut event = sample_event(10);
        event.reserve(3, Utc::now()).unwrap();

        assert_eq!(event.release(3, Utc::now()), 3);
        assert_eq!(event.remaining(), 10);

        // 二重返却は定員を超えない
        assert_eq!(event.release(3, Utc::now()), 0);
        assert_eq!(event.remaining(), 10);
    }

    #[test]
    fn test_change_capacity_keeps_sold_count() {
        let mut event = sample_event(10);
        event.reserve(4, Utc::now()).unwrap();

        event.change_capacity(20, Utc::now()).unwrap();
        assert_eq!(event.capacity(), 20);
        assert_eq!(event.remaining(), 16);
        assert_eq!(event.sold(), 4);
    }

    #[test]
    fn test_change_capacity_below_sold_is_rejected() {
        let mut event = sample_event(10);
        event.reserve(8, Utc::now()).unwrap();

        let result = event.change_capacity(5, Utc::now());
        assert_eq!(
            result.unwrap_err(),
            DomainError::CapacityBelowSold {
                capacity: 5,
                sold: 8
            }
        );
        assert_eq!(event.remaining(), 2);
    }

    #[test]
    fn test_reconstruct_rejects_remaining_above_capacity() {
        let now = Utc::now();
        let result = Event::reconstruct(
            EventId::new(),
            "Corrupt".to_string(),
            now,
            now + Duration::hours(1),
            10,
            11,
            Money::zero(),
            now,
            now,
        );
        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }
}
