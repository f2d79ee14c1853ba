// 駆動される側アダプター（ストア、キャッシュ、通知バスなどの実装）

mod confirmation_policy;
mod in_memory_cache;
mod in_memory_database;
mod mysql_booking_ledger;
mod mysql_inventory_store;
mod mysql_rows;
mod notification_bus;
mod redis_cache;
mod tracing_logger;

pub use confirmation_policy::{AlwaysApprove, ApprovalRatePolicy};
pub use in_memory_cache::{DisabledInventoryCache, InMemoryInventoryCache};
pub use in_memory_database::InMemoryDatabase;
pub use mysql_booking_ledger::MySqlBookingLedger;
pub use mysql_inventory_store::MySqlInventoryStore;
pub use notification_bus::InMemoryNotificationBus;
pub use redis_cache::RedisInventoryCache;
pub use tracing_logger::{NoopLogger, TracingLogger};
