pub mod booking_config;
pub mod database_config;
pub mod database_error;
pub mod database_migration;
pub mod driven;
pub mod driver;

pub use booking_config::BookingConfig;
pub use database_config::{ConfigError, DatabaseConfig};
pub use database_error::DatabaseError;
pub use database_migration::DatabaseMigration;

/// 環境変数を書き換えるテストの直列化に使う
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
