use proptest::prelude::*;
use std::sync::Arc;
use ticket_booking::adapter::driven::{
    InMemoryDatabase, InMemoryInventoryCache, InMemoryNotificationBus, NoopLogger,
};
use ticket_booking::application::service::{
    BookingLifecycleService, BookingSettings, EventCatalogService, ReservationCoordinator,
};
use ticket_booking::domain::model::{
    Booking, BookingId, BookingStatus, Event, EventId, HolderId, Money, StatusChange,
};
use ticket_booking::domain::port::{BookingLedger, InventoryCache, InventoryStore, Logger};

use chrono::{Duration, Utc};

fn sample_event(capacity: u32) -> Event {
    let now = Utc::now();
    Event::new(
        EventId::new(),
        "Property Hall".to_string(),
        now + Duration::days(1),
        now + Duration::days(1) + Duration::hours(2),
        capacity,
        Money::from_minor(1000).unwrap(),
        now,
    )
    .unwrap()
}

/// 座席に対する操作
#[derive(Debug, Clone)]
enum SeatOp {
    Reserve(u32),
    Release(u32),
}

fn seat_op() -> impl Strategy<Value = SeatOp> {
    prop_oneof![
        (1u32..20).prop_map(SeatOp::Reserve),
        (1u32..20).prop_map(SeatOp::Release),
    ]
}

fn status_target() -> impl Strategy<Value = BookingStatus> {
    prop_oneof![
        Just(BookingStatus::Pending),
        Just(BookingStatus::Confirmed),
        Just(BookingStatus::Cancelled),
    ]
}

// Event のプロパティベーステスト
proptest! {
    /// どのような予約・返却の並びでも残席数は 0 以上かつ定員以下で、販売済みとの和は定員に等しい
    #[test]
    fn test_remaining_stays_within_capacity(
        capacity in 0u32..100,
        ops in prop::collection::vec(seat_op(), 0..50),
    ) {
        let mut event = sample_event(capacity);
        let now = Utc::now();

        for op in ops {
            match op {
                SeatOp::Reserve(quantity) => {
                    let before = event.remaining();
                    match event.reserve(quantity, now) {
                        Ok(()) => prop_assert_eq!(event.remaining(), before - quantity),
                        Err(_) => {
                            prop_assert!(quantity > before);
                            prop_assert_eq!(event.remaining(), before);
                        }
                    }
                }
                SeatOp::Release(quantity) => {
                    let sold_before = event.sold();
                    let restored = event.release(quantity, now);
                    prop_assert_eq!(restored, quantity.min(sold_before));
                }
            }

            prop_assert!(event.remaining() <= event.capacity());
            prop_assert_eq!(event.sold() + event.remaining(), event.capacity());
        }
    }

    /// 予約した枚数を返却すると残席数は元に戻る
    #[test]
    fn test_release_restores_reserved_quantity(
        capacity in 1u32..200,
        quantity in 1u32..200,
    ) {
        prop_assume!(quantity <= capacity);
        let mut event = sample_event(capacity);
        let now = Utc::now();

        event.reserve(quantity, now).unwrap();
        let restored = event.release(quantity, now);

        prop_assert_eq!(restored, quantity);
        prop_assert_eq!(event.remaining(), capacity);
    }

    /// 定員変更は販売済み枚数を維持する
    #[test]
    fn test_capacity_change_preserves_sold(
        capacity in 1u32..100,
        reserved in 0u32..100,
        new_capacity in 0u32..200,
    ) {
        prop_assume!(reserved <= capacity);
        let mut event = sample_event(capacity);
        let now = Utc::now();
        if reserved > 0 {
            event.reserve(reserved, now).unwrap();
        }

        match event.change_capacity(new_capacity, now) {
            Ok(()) => {
                prop_assert_eq!(event.sold(), reserved);
                prop_assert_eq!(event.remaining(), new_capacity - reserved);
            }
            Err(_) => {
                prop_assert!(new_capacity < reserved);
                prop_assert_eq!(event.capacity(), capacity);
            }
        }
    }
}

// Booking のプロパティベーステスト
proptest! {
    /// 終端状態に達した予約は、以後どの遷移を試みても状態が変わらない
    #[test]
    fn test_terminal_status_is_absorbing(
        targets in prop::collection::vec(status_target(), 1..20),
    ) {
        let now = Utc::now();
        let mut booking = Booking::new(
            BookingId::new(),
            EventId::new(),
            HolderId::new(),
            2,
            Money::from_minor(500).unwrap(),
            now,
        )
        .unwrap();
        let mut terminal: Option<BookingStatus> = None;

        for target in targets {
            let result = match target {
                BookingStatus::Confirmed => booking.confirm(now),
                BookingStatus::Cancelled => booking.cancel(now),
                BookingStatus::Pending => continue,
            };

            match terminal {
                None => {
                    prop_assert_eq!(result.unwrap(), StatusChange::Applied);
                    terminal = Some(target);
                }
                Some(reached) if reached == target => {
                    prop_assert_eq!(result.unwrap(), StatusChange::Unchanged);
                }
                Some(_) => {
                    prop_assert!(result.is_err());
                }
            }

            if let Some(reached) = terminal {
                prop_assert_eq!(booking.status(), reached);
            }
        }
    }

    /// 合計金額は単価 × 枚数と等しい
    #[test]
    fn test_booking_total_is_unit_price_times_quantity(
        unit_price in 0i64..1_000_000,
        quantity in 1u32..1000,
    ) {
        let booking = Booking::new(
            BookingId::new(),
            EventId::new(),
            HolderId::new(),
            quantity,
            Money::from_minor(unit_price).unwrap(),
            Utc::now(),
        )
        .unwrap();

        prop_assert_eq!(booking.total().unwrap().amount(), unit_price * i64::from(quantity));
    }
}

/// 予約に対して行う操作
#[derive(Debug, Clone, Copy)]
enum Decision {
    Confirm,
    Cancel,
    Leave,
}

fn decision() -> impl Strategy<Value = Decision> {
    prop_oneof![Just(Decision::Confirm), Just(Decision::Cancel), Just(Decision::Leave)]
}

// 販売統計のプロパティベーステスト
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// 確定・キャンセルをどの順で行っても、統計はCONFIRMEDの予約の合計と一致する
    #[test]
    fn test_stats_match_confirmed_bookings(
        plan in prop::collection::vec((1u32..5, decision(), decision()), 1..12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let database = Arc::new(InMemoryDatabase::new());
            let store: Arc<dyn InventoryStore> = database.clone();
            let ledger: Arc<dyn BookingLedger> = database.clone();
            let cache: Arc<dyn InventoryCache> = Arc::new(InMemoryInventoryCache::new());
            let logger: Arc<dyn Logger> = Arc::new(NoopLogger);
            let (bus, _receiver) = InMemoryNotificationBus::new(64);
            let coordinator = Arc::new(ReservationCoordinator::new(
                store.clone(),
                cache.clone(),
                logger.clone(),
            ));
            let bookings = BookingLifecycleService::new(
                store.clone(),
                ledger.clone(),
                cache.clone(),
                Arc::new(bus),
                coordinator.clone(),
                logger.clone(),
                BookingSettings::default(),
            );
            let catalog = EventCatalogService::new(store.clone(), ledger.clone(), cache, coordinator, logger);

            let event = sample_event(100);
            let event_id = event.id();
            store.create_event(&event).await.unwrap();

            let mut expected_sold = 0u64;
            let mut expected_held = 0u32;
            for (quantity, first, second) in plan {
                let booking_id = bookings
                    .create_booking(HolderId::new(), event_id, quantity)
                    .await
                    .unwrap();

                let mut status = BookingStatus::Pending;
                for step in [first, second] {
                    let result = match step {
                        Decision::Confirm => bookings.confirm_booking(booking_id).await,
                        Decision::Cancel => bookings.cancel_booking(booking_id).await,
                        Decision::Leave => continue,
                    };
                    if result.is_ok() && status == BookingStatus::Pending {
                        status = match step {
                            Decision::Confirm => BookingStatus::Confirmed,
                            _ => BookingStatus::Cancelled,
                        };
                    }
                }

                if status == BookingStatus::Confirmed {
                    expected_sold += u64::from(quantity);
                }
                if status.holds_seats() {
                    expected_held += quantity;
                }
            }

            let stats = catalog.stats(event_id).await.unwrap();
            let from_ledger = ledger.confirmed_stats(event_id).await.unwrap();
            let event = store.find_event(event_id).await.unwrap().unwrap();

            prop_assert_eq!(stats, from_ledger);
            prop_assert_eq!(stats.tickets_sold, expected_sold);
            prop_assert_eq!(stats.revenue.amount(), expected_sold as i64 * 1000);
            prop_assert_eq!(event.remaining(), 100 - expected_held);
            Ok(())
        })?;
    }
}
