use crate::domain::model::{Booking, BookingId, BookingStatus, Event, EventId, EventStats};
use crate::domain::port::{BookingLedger, InventoryStore, RepositoryError, StoreTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// 行ごとのロック表
/// 表自体の排他は待機を伴わない短い区間だけなので同期Mutexを使う
type RowLockTable = Arc<std::sync::Mutex<HashMap<RowKey, Arc<Mutex<()>>>>>;

/// 行ロックのデフォルト待機時間
const DEFAULT_LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// 行ロックの対象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Event(EventId),
    Booking(BookingId),
}

/// コミット済みのデータ
#[derive(Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    bookings: HashMap<BookingId, Booking>,
}

/// インメモリのストア実装
/// InventoryStoreとBookingLedgerの両方を実装する。
/// 行ごとの非同期Mutexをトランザクションが保持し、変更はコミット時にまとめて反映する。
/// ロックなしの読み取りはコミット済みのデータのみを参照する
#[derive(Clone)]
pub struct InMemoryDatabase {
    tables: Arc<RwLock<Tables>>,
    row_locks: RowLockTable,
    lock_wait_timeout: Duration,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::with_lock_wait_timeout(DEFAULT_LOCK_WAIT_TIMEOUT)
    }

    /// ロック待機時間を指定して作成
    pub fn with_lock_wait_timeout(lock_wait_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            row_locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
            lock_wait_timeout,
        }
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// インメモリストアのトランザクション
/// 取得した行ロックと作業用コピーを保持する。
/// コミットせずに破棄すると作業用コピーは捨てられ、ロックだけが解放される
pub struct InMemoryStoreTransaction {
    tables: Arc<RwLock<Tables>>,
    row_locks: RowLockTable,
    lock_wait_timeout: Duration,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    events: HashMap<EventId, Event>,
    bookings: HashMap<BookingId, Booking>,
    deleted_events: HashSet<EventId>,
}

impl InMemoryStoreTransaction {
    /// 行ロックを取得する（取得済みなら何もしない）
    async fn acquire(&mut self, key: RowKey) -> Result<(), RepositoryError> {
        if self.held.contains_key(&key) {
            return Ok(());
        }

        let row_lock = {
            let mut locks = self.row_locks.lock().map_err(|_| {
                RepositoryError::OperationFailed("行ロック表が破損しています".to_string())
            })?;
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let guard = tokio::time::timeout(self.lock_wait_timeout, row_lock.lock_owned())
            .await
            .map_err(|_| {
                RepositoryError::LockWaitTimeout(format!(
                    "{:?} のロック取得が {:?} 以内に完了しませんでした",
                    key, self.lock_wait_timeout
                ))
            })?;

        self.held.insert(key, guard);
        Ok(())
    }

    /// 保持している行ロックを解放する
    /// 他に待機者のいないロックは表から取り除く
    fn release_locks(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let keys: Vec<RowKey> = self.held.keys().copied().collect();
        self.held.clear();

        if let Ok(mut locks) = self.row_locks.lock() {
            for key in keys {
                if locks
                    .get(&key)
                    .is_some_and(|row_lock| Arc::strong_count(row_lock) == 1)
                {
                    locks.remove(&key);
                }
            }
        }
    }
}

impl Drop for InMemoryStoreTransaction {
    fn drop(&mut self) {
        self.release_locks();
    }
}

#[async_trait]
impl StoreTransaction for InMemoryStoreTransaction {
    async fn lock_event(&mut self, event_id: EventId) -> Result<Option<Event>, RepositoryError> {
        if self.deleted_events.contains(&event_id) {
            return Ok(None);
        }
        if let Some(event) = self.events.get(&event_id) {
            return Ok(Some(event.clone()));
        }

        self.acquire(RowKey::Event(event_id)).await?;

        let committed = self.tables.read().await.events.get(&event_id).cloned();
        if let Some(event) = &committed {
            self.events.insert(event_id, event.clone());
        }
        Ok(committed)
    }

    async fn save_event(&mut self, event: &Event) -> Result<(), RepositoryError> {
        if !self.held.contains_key(&RowKey::Event(event.id())) {
            return Err(RepositoryError::OperationFailed(format!(
                "ロックしていないイベントは更新できません: {}",
                event.id()
            )));
        }
        self.events.insert(event.id(), event.clone());
        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), RepositoryError> {
        let exists = self.bookings.contains_key(&booking.id())
            || self.tables.read().await.bookings.contains_key(&booking.id());
        if exists {
            return Err(RepositoryError::OperationFailed(format!(
                "予約IDが重複しています: {}",
                booking.id()
            )));
        }

        self.acquire(RowKey::Booking(booking.id())).await?;
        self.bookings.insert(booking.id(), booking.clone());
        Ok(())
    }

    async fn lock_booking(
        &mut self,
        booking_id: BookingId,
    ) -> Result<Option<Booking>, RepositoryError> {
        if let Some(booking) = self.bookings.get(&booking_id) {
            return Ok(Some(booking.clone()));
        }

        self.acquire(RowKey::Booking(booking_id)).await?;

        let committed = self.tables.read().await.bookings.get(&booking_id).cloned();
        if let Some(booking) = &committed {
            self.bookings.insert(booking_id, booking.clone());
        }
        Ok(committed)
    }

    async fn save_booking_status(&mut self, booking: &Booking) -> Result<(), RepositoryError> {
        match self.bookings.get_mut(&booking.id()) {
            Some(current) => {
                *current = booking.clone();
                Ok(())
            }
            None => Err(RepositoryError::OperationFailed(format!(
                "ロックしていない予約は更新できません: {}",
                booking.id()
            ))),
        }
    }

    async fn has_bookings(&mut self, event_id: EventId) -> Result<bool, RepositoryError> {
        if self.bookings.values().any(|b| b.event_id() == event_id) {
            return Ok(true);
        }
        let tables = self.tables.read().await;
        Ok(tables.bookings.values().any(|b| b.event_id() == event_id))
    }

    async fn delete_event(&mut self, event_id: EventId) -> Result<(), RepositoryError> {
        if !self.held.contains_key(&RowKey::Event(event_id)) {
            return Err(RepositoryError::OperationFailed(format!(
                "ロックしていないイベントは削除できません: {}",
                event_id
            )));
        }
        self.events.remove(&event_id);
        self.deleted_events.insert(event_id);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), RepositoryError> {
        let events = std::mem::take(&mut self.events);
        let bookings = std::mem::take(&mut self.bookings);
        let deleted_events = std::mem::take(&mut self.deleted_events);

        let mut committed = self.tables.write().await;
        committed.events.extend(events);
        committed.bookings.extend(bookings);
        for event_id in deleted_events {
            committed.events.remove(&event_id);
        }
        drop(committed);

        // 反映が終わってから行ロックを解放する
        self.release_locks();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), RepositoryError> {
        self.release_locks();
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for InMemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, RepositoryError> {
        Ok(Box::new(InMemoryStoreTransaction {
            tables: self.tables.clone(),
            row_locks: self.row_locks.clone(),
            lock_wait_timeout: self.lock_wait_timeout,
            held: HashMap::new(),
            events: HashMap::new(),
            bookings: HashMap::new(),
            deleted_events: HashSet::new(),
        }))
    }

    async fn create_event(&self, event: &Event) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.events.contains_key(&event.id()) {
            return Err(RepositoryError::OperationFailed(format!(
                "イベントIDが重複しています: {}",
                event.id()
            )));
        }
        tables.events.insert(event.id(), event.clone());
        Ok(())
    }

    async fn find_event(&self, event_id: EventId) -> Result<Option<Event>, RepositoryError> {
        Ok(self.tables.read().await.events.get(&event_id).cloned())
    }

    async fn list_events(&self) -> Result<Vec<Event>, RepositoryError> {
        let mut events: Vec<Event> = self.tables.read().await.events.values().cloned().collect();
        events.sort_by_key(|event| (event.starts_at(), event.id().to_string()));
        Ok(events)
    }

    async fn list_events_page(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Event>, RepositoryError> {
        let events = self.list_events().await?;
        Ok(events
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[async_trait]
impl BookingLedger for InMemoryDatabase {
    async fn find_by_id(&self, booking_id: BookingId) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.tables.read().await.bookings.get(&booking_id).cloned())
    }

    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let mut bookings: Vec<Booking> = self
            .tables
            .read()
            .await
            .bookings
            .values()
            .filter(|booking| booking.is_stale(cutoff))
            .cloned()
            .collect();
        bookings.sort_by_key(|booking| booking.created_at());
        Ok(bookings)
    }

    async fn confirmed_stats(&self, event_id: EventId) -> Result<EventStats, RepositoryError> {
        let tables = self.tables.read().await;
        let mut stats = EventStats::default();
        for booking in tables
            .bookings
            .values()
            .filter(|b| b.event_id() == event_id && b.status() == BookingStatus::Confirmed)
        {
            let total = booking
                .total()
                .map_err(|e| RepositoryError::FetchFailed(e.to_string()))?;
            stats.tickets_sold += u64::from(booking.quantity());
            stats.revenue = stats
                .revenue
                .add(&total)
                .map_err(|e| RepositoryError::FetchFailed(e.to_string()))?;
        }
        Ok(stats)
    }

    fn next_identity(&self) -> BookingId {
        BookingId::new()
    }
}

impl InMemoryDatabase {
    /// 予約の件数（テスト・診断用）
    pub async fn booking_count(&self) -> usize {
        self.tables.read().await.bookings.len()
    }

    /// 行ロック表の件数（テスト・診断用）
    pub fn row_lock_count(&self) -> usize {
        self.row_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
