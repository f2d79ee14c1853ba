// ドメインモデル（エンティティと値オブジェクト）

mod value_objects;
mod event;
mod booking;

pub use value_objects::{
    EventId, BookingId, HolderId,
    Money,
    BookingStatus, StatusChange,
    EventStats,
};

pub use event::Event;
pub use booking::Booking;
