use crate::common::app_helper::setup_app;
use crate::common::test_data::{payment_payload, refund_payload, seed_subscription};
use chrono::{Duration, Utc};
use ledger_backend::api::AppState;
use ledger_backend::domain::payment_model::{self, PaymentStatus};
use ledger_backend::domain::translation_transaction_model;
use ledger_backend::error::AppError;
use ledger_backend::repository::translation_transaction_repository::TranslationTransactionRepository;
use ledger_backend::service::reconciler_service::{
    PaymentOutcome, RefundOutcome, WebhookAck,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::{json, Value};

async fn send(app_state: &AppState, payload: &Value) -> Result<WebhookAck, AppError> {
    app_state
        .reconciler_service
        .handle_webhook(payload.to_string().as_bytes(), None)
        .await
}

fn payment_outcome(ack: WebhookAck) -> PaymentOutcome {
    match ack {
        WebhookAck::Payment(result) => result.outcome,
        other => panic!("expected payment ack, got {:?}", other),
    }
}

/// 非同期の連携が終わるまで待つ
async fn wait_for_transaction(
    app_state: &AppState,
    key: &str,
) -> Option<translation_transaction_model::Model> {
    let repo = TranslationTransactionRepository::new(app_state.db.clone());
    for _ in 0..100 {
        if let Some(transaction) = repo.find_by_key(key).await.unwrap() {
            return Some(transaction);
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    None
}

#[tokio::test]
async fn test_payment_event_replay_is_idempotent() {
    let (_app, app_state, _db) = setup_app().await;
    let payload = payment_payload("sq_replay", "pending", 1000);

    assert_eq!(
        payment_outcome(send(&app_state, &payload).await.unwrap()),
        PaymentOutcome::Created
    );
    assert_eq!(
        payment_outcome(send(&app_state, &payload).await.unwrap()),
        PaymentOutcome::Unchanged
    );

    let completed = payment_payload("sq_replay", "completed", 1000);
    assert_eq!(
        payment_outcome(send(&app_state, &completed).await.unwrap()),
        PaymentOutcome::Transitioned {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Completed,
        }
    );

    // 遅れて届いた pending は適用しない
    assert_eq!(
        payment_outcome(send(&app_state, &payload).await.unwrap()),
        PaymentOutcome::TransitionRejected {
            from: PaymentStatus::Completed,
            to: PaymentStatus::Pending,
        }
    );

    let payment = app_state
        .reconciler_service
        .get_payment("sq_replay")
        .await
        .unwrap();
    assert_eq!(payment.status, "completed");
    assert_eq!(payment.amount, 1000);
}

#[tokio::test]
async fn test_refunds_are_appended_once_and_bounded() {
    let (_app, app_state, _db) = setup_app().await;
    send(&app_state, &payment_payload("sq_1", "completed", 1000))
        .await
        .unwrap();

    let ack = send(&app_state, &refund_payload("sq_1", "r1", 300))
        .await
        .unwrap();
    match ack {
        WebhookAck::Refund(result) => {
            assert_eq!(result.outcome, RefundOutcome::Appended);
            assert_eq!(result.payment.status, "partially_refunded");
            assert_eq!(result.payment.refunded_amount, 300);
        }
        other => panic!("expected refund ack, got {:?}", other),
    }

    // 同じ refund_id の再送は何もしない
    let ack = send(&app_state, &refund_payload("sq_1", "r1", 300))
        .await
        .unwrap();
    assert!(matches!(
        ack,
        WebhookAck::Refund(ref result) if result.outcome == RefundOutcome::Replayed
    ));

    // 300 + 800 > 1000
    let result = send(&app_state, &refund_payload("sq_1", "r2", 800)).await;
    assert!(matches!(result, Err(AppError::RefundExceedsPayment { .. })));

    let payment = app_state.reconciler_service.get_payment("sq_1").await.unwrap();
    let refunds = app_state
        .reconciler_service
        .list_refunds(payment.id)
        .await
        .unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].refund_id, "r1");
    assert_eq!(payment.refunded_amount, 300);
    assert_eq!(payment.status, "partially_refunded");

    // 残額ちょうどの返金で refunded になる
    send(&app_state, &refund_payload("sq_1", "r3", 700))
        .await
        .unwrap();
    let payment = app_state.reconciler_service.get_payment("sq_1").await.unwrap();
    assert_eq!(payment.status, "refunded");
    assert_eq!(payment.refunded_amount, 1000);

    let result = send(&app_state, &refund_payload("sq_1", "r4", 1)).await;
    assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_concurrent_refunds_never_exceed_payment() {
    let (_app, app_state, _db) = setup_app().await;
    send(&app_state, &payment_payload("sq_race", "completed", 1000))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let state = app_state.clone();
        handles.push(tokio::spawn(async move {
            send(&state, &refund_payload("sq_race", &format!("r{}", i), 300)).await
        }));
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    let payment = app_state.reconciler_service.get_payment("sq_race").await.unwrap();
    let refunds = app_state
        .reconciler_service
        .list_refunds(payment.id)
        .await
        .unwrap();
    let total: i64 = refunds.iter().map(|r| r.amount).sum();
    assert!(total <= 1000);
    assert_eq!(total, payment.refunded_amount);
    assert!(!refunds.is_empty() && refunds.len() <= 3);
}

#[tokio::test]
async fn test_refund_for_unknown_payment_or_wrong_currency() {
    let (_app, app_state, _db) = setup_app().await;

    let result = send(&app_state, &refund_payload("sq_missing", "r1", 100)).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    send(&app_state, &payment_payload("sq_usd", "completed", 1000))
        .await
        .unwrap();
    let payload = json!({
        "gateway_transaction_id": "sq_usd",
        "refund": { "refund_id": "r1", "amount": 100, "currency": "EUR" }
    });
    let result = send(&app_state, &payload).await;
    assert!(matches!(result, Err(AppError::InvalidArgument { .. })));
}

#[tokio::test]
async fn test_completed_payment_is_linked_to_usage_once() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;

    let payload = json!({
        "gateway_transaction_id": "sq_usage",
        "status": "completed",
        "amount": 2500,
        "currency": "USD",
        "company_name": "Acme",
        "metadata": {
            "units": 25,
            "subscription_id": subscription.id.to_string(),
            "source_language": "en",
            "target_language": "de"
        }
    });
    send(&app_state, &payload).await.unwrap();

    let transaction = wait_for_transaction(&app_state, "payment:sq_usage")
        .await
        .expect("usage should be linked");
    assert_eq!(transaction.units, 25);
    assert_eq!(transaction.subscription_id, Some(subscription.id));

    // 再送しても二重に消費しない
    send(&app_state, &payload).await.unwrap();
    let report = app_state
        .reconciler_service
        .relink_completed_payments(100)
        .await
        .unwrap();
    assert_eq!(report.scanned, 0);

    let summary = app_state
        .ledger_service
        .get_summary(subscription.id)
        .await
        .unwrap();
    assert_eq!(summary.total_used, 25);
}

#[tokio::test]
async fn test_individual_purchase_is_recorded_without_subscription() {
    let (_app, app_state, _db) = setup_app().await;

    let payload = json!({
        "gateway_transaction_id": "sq_single",
        "status": "completed",
        "amount": 900,
        "company_name": "Walk-in",
        "metadata": { "units": 3 }
    });
    send(&app_state, &payload).await.unwrap();

    let transaction = wait_for_transaction(&app_state, "payment:sq_single")
        .await
        .expect("individual purchase should be recorded");
    assert_eq!(transaction.units, 3);
    assert!(transaction.subscription_id.is_none());
    assert!(transaction.payment_id.is_some());
}

#[tokio::test]
async fn test_relink_picks_up_abandoned_links() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 10, 0).await;

    let payload = json!({
        "gateway_transaction_id": "sq_later",
        "status": "completed",
        "amount": 5000,
        "metadata": { "units": 50, "subscription_id": subscription.id.to_string() }
    });
    send(&app_state, &payload).await.unwrap();

    // 単位不足で連携は諦められる
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let repo = TranslationTransactionRepository::new(app_state.db.clone());
    assert!(repo.find_by_key("payment:sq_later").await.unwrap().is_none());

    let report = app_state
        .reconciler_service
        .relink_completed_payments(100)
        .await
        .unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.linked, 0);
    assert_eq!(report.failed.len(), 1);

    let now = Utc::now();
    app_state
        .ledger_service
        .add_usage_period(subscription.id, now - Duration::hours(1), now + Duration::days(30), 100)
        .await
        .unwrap();

    let report = app_state
        .reconciler_service
        .relink_completed_payments(100)
        .await
        .unwrap();
    assert_eq!(report.linked, 1);
    assert!(report.failed.is_empty());

    let report = app_state
        .reconciler_service
        .relink_completed_payments(100)
        .await
        .unwrap();
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn test_oversized_refund_amount_is_rejected_without_overflow() {
    let (_app, app_state, _db) = setup_app().await;
    send(&app_state, &payment_payload("sq_huge", "completed", 1000))
        .await
        .unwrap();
    send(&app_state, &refund_payload("sq_huge", "r1", 300))
        .await
        .unwrap();

    // 300 + i64::MAX は i64 に収まらない
    let result = send(&app_state, &refund_payload("sq_huge", "r2", i64::MAX)).await;
    match result {
        Err(AppError::RefundExceedsPayment {
            payment_amount,
            already_refunded,
            requested,
        }) => {
            assert_eq!(payment_amount, 1000);
            assert_eq!(already_refunded, 300);
            assert_eq!(requested, i64::MAX);
        }
        other => panic!("expected RefundExceedsPayment, got {:?}", other),
    }

    let payment = app_state.reconciler_service.get_payment("sq_huge").await.unwrap();
    assert_eq!(payment.refunded_amount, 300);
    assert_eq!(payment.status, "partially_refunded");
    let refunds = app_state
        .reconciler_service
        .list_refunds(payment.id)
        .await
        .unwrap();
    assert_eq!(refunds.len(), 1);
}

#[tokio::test]
async fn test_concurrent_identical_payment_events_record_once() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;

    let payload = json!({
        "gateway_transaction_id": "sq_burst",
        "status": "completed",
        "amount": 1200,
        "currency": "USD",
        "company_name": "Acme",
        "metadata": { "units": 12, "subscription_id": subscription.id.to_string() }
    });

    let mut handles = Vec::new();
    for _ in 0..8 {
        let state = app_state.clone();
        let payload = payload.clone();
        handles.push(tokio::spawn(async move { send(&state, &payload).await }));
    }

    let mut created = 0;
    for handle in handles {
        match payment_outcome(handle.await.unwrap().unwrap()) {
            PaymentOutcome::Created => created += 1,
            PaymentOutcome::Unchanged => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(created, 1);

    let rows = payment_model::Entity::find()
        .filter(payment_model::Column::GatewayTransactionId.eq("sq_burst"))
        .count(&app_state.db)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let transaction = wait_for_transaction(&app_state, "payment:sq_burst")
        .await
        .expect("usage should be linked");
    assert_eq!(transaction.units, 12);

    // 連携が落ち着くのを待ってから消費が1回分だけであることを確認する
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let summary = app_state
        .ledger_service
        .get_summary(subscription.id)
        .await
        .unwrap();
    assert_eq!(summary.total_used, 12);
}

#[tokio::test]
async fn test_completion_metadata_is_merged_and_linked() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;

    send(
        &app_state,
        &json!({
            "gateway_transaction_id": "sq_late_meta",
            "status": "pending",
            "amount": 700,
            "metadata": { "order": "A-7" }
        }),
    )
    .await
    .unwrap();

    // 利用単位は完了通知で初めて届く
    let ack = send(
        &app_state,
        &json!({
            "gateway_transaction_id": "sq_late_meta",
            "status": "completed",
            "amount": 700,
            "metadata": { "units": 7, "subscription_id": subscription.id.to_string() }
        }),
    )
    .await
    .unwrap();
    match ack {
        WebhookAck::Payment(result) => {
            assert_eq!(result.payment.metadata["order"], "A-7");
            assert_eq!(result.payment.metadata["units"], 7);
        }
        other => panic!("expected payment ack, got {:?}", other),
    }

    let transaction = wait_for_transaction(&app_state, "payment:sq_late_meta")
        .await
        .expect("usage should be linked after completion");
    assert_eq!(transaction.units, 7);
    assert_eq!(transaction.subscription_id, Some(subscription.id));
}

#[tokio::test]
async fn test_relink_reaches_payments_behind_permanent_failures() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 10, 0).await;
    let base = Utc::now() - Duration::hours(1);

    // 利用単位が壊れた古い支払いが走査の先頭を占める
    for i in 0..4 {
        let payload = json!({
            "gateway_transaction_id": format!("sq_broken_{}", i),
            "status": "completed",
            "amount": 100,
            "payment_date": (base + Duration::minutes(i)).to_rfc3339(),
            "metadata": { "units": "many" }
        });
        send(&app_state, &payload).await.unwrap();
    }
    let payload = json!({
        "gateway_transaction_id": "sq_behind",
        "status": "completed",
        "amount": 5000,
        "payment_date": (base + Duration::minutes(10)).to_rfc3339(),
        "metadata": { "units": 50, "subscription_id": subscription.id.to_string() }
    });
    send(&app_state, &payload).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let repo = TranslationTransactionRepository::new(app_state.db.clone());
    assert!(repo.find_by_key("payment:sq_behind").await.unwrap().is_none());

    let now = Utc::now();
    app_state
        .ledger_service
        .add_usage_period(subscription.id, now - Duration::hours(1), now + Duration::days(30), 100)
        .await
        .unwrap();

    let first = app_state
        .reconciler_service
        .relink_completed_payments(3)
        .await
        .unwrap();
    assert_eq!(first.scanned, 3);
    assert_eq!(first.linked, 0);
    assert_eq!(first.failed.len(), 3);

    // 失敗済みの支払いは後回しになり、未試行の支払いに順番が回る
    let second = app_state
        .reconciler_service
        .relink_completed_payments(3)
        .await
        .unwrap();
    assert_eq!(second.scanned, 3);
    assert_eq!(second.linked, 1);
    assert!(repo.find_by_key("payment:sq_behind").await.unwrap().is_some());

    let broken = app_state
        .reconciler_service
        .get_payment("sq_broken_0")
        .await
        .unwrap();
    assert_eq!(broken.link_attempts, 2);
    assert!(broken.last_link_attempt_at.is_some());
}
