//! PostgreSQL store tests for water-billing-service.

mod common;

use common::{domestic_tariff, period, TestApp};
use rust_decimal_macros::dec;
use service_core::error::AppError;
use std::time::Duration;
use water_billing_service::models::{
    AdditionalFee, CustomerType, FeeKind, MeterRentPrice, PaymentStatus, PenaltyTier, RateTier,
    TierLimit,
};
use water_billing_service::services::{build_cycle_payload, BillingStore, BillingTransaction};

#[tokio::test]
async fn tariff_settings_round_trip_through_jsonb() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };

    let mut tariff = domestic_tariff();
    tariff.sewerage_tiers = vec![RateTier::new(dec!(4), TierLimit::Unbounded)];
    tariff.meter_rent_prices = vec![MeterRentPrice {
        size_label: "3/4".to_string(),
        amount: dec!(25),
    }];
    tariff.additional_fees = vec![AdditionalFee {
        name: "Reconnection".to_string(),
        kind: FeeKind::Flat,
        value: dec!(50),
    }];
    tariff.penalty_tiered_rates = vec![PenaltyTier {
        month_age: 6,
        extra_rate: dec!(0.05),
    }];
    tariff.vat_rate = dec!(0.15);

    app.db.create_tariff(&tariff).await.unwrap();

    let stored = app
        .db
        .find_effective_tariff(CustomerType::Domestic, period("2024-05").period_end())
        .await
        .unwrap()
        .expect("tariff should be in force");
    assert_eq!(stored, tariff);
    assert_eq!(stored.tiers[2].upper_limit, TierLimit::Unbounded);

    let duplicate = app.db.create_tariff(&tariff).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    app.cleanup().await;
}

#[tokio::test]
async fn locked_meter_blocks_a_second_transaction() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let meter_id = app
        .seed_meter("BM-401", CustomerType::Domestic, dec!(0), dec!(25))
        .await;

    let mut first = app.db.begin().await.unwrap();
    first.lock_meter(meter_id).await.unwrap();

    let db = app.db.clone();
    let waiter = tokio::spawn(async move {
        let mut second = db.begin().await.unwrap();
        second.lock_meter(meter_id).await.map(|_| ())
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!waiter.is_finished(), "second lock should wait for the first");

    first.commit().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("second lock should be granted after commit")
        .unwrap();
    assert!(result.is_ok());

    app.cleanup().await;
}

#[tokio::test]
async fn stale_previous_reading_conflicts() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let meter_id = app
        .seed_meter("BM-402", CustomerType::Domestic, dec!(10), dec!(25))
        .await;

    let mut tx = app.db.begin().await.unwrap();
    let meter = tx.lock_meter(meter_id).await.unwrap();
    let payload = build_cycle_payload(&meter, &[], None, &[], period("2024-05"), true);

    let stale = tx
        .update_meter(meter_id, dec!(9), &payload.meter_delta)
        .await;
    assert!(matches!(stale, Err(AppError::Conflict(_))));

    tx.update_meter(meter_id, meter.previous_reading, &payload.meter_delta)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = app.db.begin().await.unwrap();
    let advanced = tx.lock_meter(meter_id).await.unwrap();
    assert_eq!(advanced.previous_reading, dec!(25));
    assert_eq!(advanced.payment_status, PaymentStatus::Unpaid);

    app.cleanup().await;
}

#[tokio::test]
async fn second_bill_for_same_month_conflicts() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let meter_id = app
        .seed_meter("BM-403", CustomerType::Domestic, dec!(0), dec!(25))
        .await;
    let tariff = domestic_tariff();

    let mut tx = app.db.begin().await.unwrap();
    let meter = tx.lock_meter(meter_id).await.unwrap();
    let payload = build_cycle_payload(&meter, &[], Some(&tariff), &[], period("2024-05"), true);
    let record = tx.insert_bill(&payload.bill).await.unwrap();
    assert_eq!(record.total_bill_amount, dec!(365));
    tx.commit().await.unwrap();

    let mut tx = app.db.begin().await.unwrap();
    assert!(tx.bill_exists(meter_id, "2024-05").await.unwrap());
    let again = tx.insert_bill(&payload.bill).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    drop(tx);

    let due = app.db.meters_due_for_billing(&period("2024-05")).await.unwrap();
    assert!(!due.contains(&meter_id));

    app.cleanup().await;
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let meter_id = app
        .seed_meter("BM-404", CustomerType::Domestic, dec!(0), dec!(25))
        .await;

    {
        let mut tx = app.db.begin().await.unwrap();
        let meter = tx.lock_meter(meter_id).await.unwrap();
        let payload = build_cycle_payload(&meter, &[], None, &[], period("2024-05"), true);
        tx.insert_bill(&payload.bill).await.unwrap();
    }

    let due = app.db.meters_due_for_billing(&period("2024-05")).await.unwrap();
    assert!(due.contains(&meter_id));

    app.cleanup().await;
}
