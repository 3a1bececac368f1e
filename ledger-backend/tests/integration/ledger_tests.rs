use crate::common::app_helper::setup_app;
use crate::common::test_data::{create_company_data, new_subscription, seed_subscription};
use chrono::{Duration, Utc};
use ledger_backend::domain::subscription_model::SubscriptionStatus;
use ledger_backend::error::AppError;
use ledger_backend::service::translation_service::WorkItemCompletion;
use ledger_backend::service::usage_ledger_service::UsageRequest;
use rust_decimal::Decimal;
use std::str::FromStr;

#[tokio::test]
async fn test_promotional_units_are_consumed_first() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 1000, 100).await;

    let period = app_state
        .ledger_service
        .record_usage(subscription.id, 50, true)
        .await
        .unwrap();
    assert_eq!(period.promotional_units_used, 50);
    assert_eq!(period.units_used, 0);
    assert_eq!(period.units_remaining, 1000);

    let period = app_state
        .ledger_service
        .record_usage(subscription.id, 80, true)
        .await
        .unwrap();
    assert_eq!(period.promotional_units_used, 100);
    assert_eq!(period.units_used, 30);
    assert_eq!(period.units_remaining, 970);
}

#[tokio::test]
async fn test_insufficient_units_leave_period_unchanged() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;
    app_state
        .ledger_service
        .record_usage(subscription.id, 90, false)
        .await
        .unwrap();

    let result = app_state
        .ledger_service
        .record_usage(subscription.id, 20, false)
        .await;
    match result {
        Err(AppError::InsufficientUnits {
            requested,
            available,
        }) => {
            assert_eq!(requested, 20);
            assert_eq!(available, 10);
        }
        other => panic!("expected InsufficientUnits, got {:?}", other),
    }

    let summary = app_state
        .ledger_service
        .get_summary(subscription.id)
        .await
        .unwrap();
    assert_eq!(summary.total_remaining, 10);
    assert_eq!(summary.total_used, 90);
}

#[tokio::test]
async fn test_invalid_units_and_missing_subscription() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;

    assert!(matches!(
        app_state.ledger_service.record_usage(subscription.id, 0, true).await,
        Err(AppError::InvalidArgument { .. })
    ));
    assert!(matches!(
        app_state
            .ledger_service
            .record_usage(uuid::Uuid::new_v4(), 5, true)
            .await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_usage_never_overdraws() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = app_state.ledger_service.clone();
        let id = subscription.id;
        handles.push(tokio::spawn(async move {
            ledger.record_usage(id, 20, false).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientUnits { .. }) | Err(AppError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    let summary = app_state
        .ledger_service
        .get_summary(subscription.id)
        .await
        .unwrap();
    assert!(succeeded <= 5);
    assert_eq!(summary.total_used, succeeded * 20);
    assert_eq!(summary.total_remaining, 100 - succeeded * 20);
}

#[tokio::test]
async fn test_record_usage_once_replays_without_double_charging() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;

    let request = UsageRequest {
        subscription_id: Some(subscription.id),
        units: 30,
        prefer_promotional: true,
        company_name: Some("Acme".to_string()),
        ..Default::default()
    };

    let first = app_state
        .ledger_service
        .record_usage_once("usage:job-1", request.clone())
        .await
        .unwrap();
    assert!(!first.replayed);
    assert_eq!(first.period.as_ref().map(|p| p.units_remaining), Some(70));

    let second = app_state
        .ledger_service
        .record_usage_once("usage:job-1", request)
        .await
        .unwrap();
    assert!(second.replayed);
    assert_eq!(second.transaction.id, first.transaction.id);

    let summary = app_state
        .ledger_service
        .get_summary(subscription.id)
        .await
        .unwrap();
    assert_eq!(summary.total_used, 30);
}

#[tokio::test]
async fn test_failed_usage_does_not_claim_key() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 10, 0).await;

    let request = UsageRequest {
        subscription_id: Some(subscription.id),
        units: 20,
        ..Default::default()
    };
    assert!(matches!(
        app_state
            .ledger_service
            .record_usage_once("usage:too-big", request.clone())
            .await,
        Err(AppError::InsufficientUnits { .. })
    ));

    // 期間を追加すれば同じキーで記録できる
    let now = Utc::now();
    app_state
        .ledger_service
        .add_usage_period(subscription.id, now - Duration::hours(1), now + Duration::days(30), 100)
        .await
        .unwrap();
    let outcome = app_state
        .ledger_service
        .record_usage_once("usage:too-big", request)
        .await
        .unwrap();
    assert!(!outcome.replayed);
    assert_eq!(outcome.transaction.units, 20);
}

#[tokio::test]
async fn test_work_item_completion_is_charged_once() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;

    let completion = WorkItemCompletion {
        work_item_id: "wi-42".to_string(),
        subscription_id: Some(subscription.id),
        company_name: Some("Acme".to_string()),
        user_id: None,
        units: 12,
        prefer_promotional: true,
        source_language: Some("en".to_string()),
        target_language: Some("ja".to_string()),
    };

    let first = app_state
        .translation_service
        .complete_work_item(completion.clone())
        .await
        .unwrap();
    let second = app_state
        .translation_service
        .complete_work_item(completion)
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.transaction.idempotency_key, "work:wi-42");

    let summary = app_state
        .ledger_service
        .get_summary(subscription.id)
        .await
        .unwrap();
    assert_eq!(summary.total_used, 12);
}

#[tokio::test]
async fn test_periods_are_appended_in_sequence() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, first) = seed_subscription(&app_state, "Acme", 100, 0).await;

    let now = Utc::now();
    let second = app_state
        .ledger_service
        .add_usage_period(subscription.id, now + Duration::days(29), now + Duration::days(59), 100)
        .await
        .unwrap();
    assert_eq!(first.sequence, 1);
    assert_eq!(second.sequence, 2);

    assert!(matches!(
        app_state
            .ledger_service
            .add_usage_period(subscription.id, now, now - Duration::days(1), 100)
            .await,
        Err(AppError::InvalidArgument { .. })
    ));

    let summary = app_state
        .ledger_service
        .get_summary(subscription.id)
        .await
        .unwrap();
    assert_eq!(summary.period_count, 2);
    assert_eq!(summary.total_allocated, 200);
    assert_eq!(summary.current_period.map(|p| p.id), Some(first.id));
}

#[tokio::test]
async fn test_expire_subscriptions_is_idempotent() {
    let (_app, app_state, _db) = setup_app().await;
    app_state
        .company_service
        .create_company(create_company_data("Acme"))
        .await
        .unwrap();

    let now = Utc::now();
    let mut ended = new_subscription("Acme", 100, 0);
    ended.start_date = now - Duration::days(60);
    ended.end_date = Some(now - Duration::days(1));
    let ended = app_state
        .ledger_service
        .create_subscription(ended)
        .await
        .unwrap();

    let mut running = new_subscription("Acme", 100, 0);
    running.end_date = Some(now + Duration::days(30));
    let running = app_state
        .ledger_service
        .create_subscription(running)
        .await
        .unwrap();

    assert_eq!(app_state.ledger_service.expire_subscriptions(now).await.unwrap(), 1);
    assert_eq!(app_state.ledger_service.expire_subscriptions(now).await.unwrap(), 0);

    let ended = app_state.ledger_service.get_subscription(ended.id).await.unwrap();
    let running = app_state.ledger_service.get_subscription(running.id).await.unwrap();
    assert_eq!(ended.status, SubscriptionStatus::Expired.as_str());
    assert_eq!(running.status, SubscriptionStatus::Active.as_str());

    // 期限切れは終端状態
    assert!(matches!(
        app_state
            .ledger_service
            .set_subscription_status(ended.id, SubscriptionStatus::Active)
            .await,
        Err(AppError::InvalidTransition { .. })
    ));
    assert!(matches!(
        app_state.ledger_service.record_usage(ended.id, 1, true).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_subscription_validation_rejects_bad_pricing() {
    let (_app, app_state, _db) = setup_app().await;
    app_state
        .company_service
        .create_company(create_company_data("Acme"))
        .await
        .unwrap();

    let mut bad = new_subscription("Acme", 100, 0);
    bad.discount = rust_decimal::Decimal::new(15, 1);
    assert!(matches!(
        app_state.ledger_service.create_subscription(bad).await,
        Err(AppError::InvalidArgument { .. })
    ));

    let bad = new_subscription("Acme", 0, 0);
    assert!(matches!(
        app_state.ledger_service.create_subscription(bad).await,
        Err(AppError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_subscription_pricing_is_stored_exactly() {
    let (_app, app_state, _db) = setup_app().await;
    app_state
        .company_service
        .create_company(create_company_data("Acme"))
        .await
        .unwrap();

    // NUMERIC(7,6) に入らない桁は丸めずに拒否する
    let mut bad = new_subscription("Acme", 100, 0);
    bad.discount = Decimal::from_str("0.0000004").unwrap();
    assert!(matches!(
        app_state.ledger_service.create_subscription(bad).await,
        Err(AppError::InvalidArgument { ref field, .. }) if field == "discount"
    ));

    let mut bad = new_subscription("Acme", 100, 0);
    bad.price_per_unit = Decimal::from_str("0.1234567").unwrap();
    assert!(matches!(
        app_state.ledger_service.create_subscription(bad).await,
        Err(AppError::InvalidArgument { ref field, .. }) if field == "price_per_unit"
    ));

    let mut exact = new_subscription("Acme", 100, 0);
    exact.price_per_unit = Decimal::from_str("0.123456").unwrap();
    exact.discount = Decimal::from_str("0.999999").unwrap();
    let created = app_state
        .ledger_service
        .create_subscription(exact)
        .await
        .unwrap();
    let stored = app_state
        .ledger_service
        .get_subscription(created.id)
        .await
        .unwrap();
    assert_eq!(stored.price_per_unit, Decimal::from_str("0.123456").unwrap());
    assert_eq!(stored.discount, Decimal::from_str("0.999999").unwrap());
}
