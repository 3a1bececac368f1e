use crate::common::app_helper::setup_app;
use crate::common::test_data::{payment_payload, refund_payload, seed_subscription};
use chrono::{Duration, Utc};
use ledger_backend::domain::payment_model::PaymentStatus;
use ledger_backend::error::AppError;
use ledger_backend::repository::payment_repository::PaymentFilter;
use ledger_backend::types::{PaginationQuery, SortOrder};

async fn seed_payments(app_state: &ledger_backend::api::AppState) {
    for (id, status, amount) in [
        ("sq_a", "completed", 1000),
        ("sq_b", "completed", 2000),
        ("sq_c", "pending", 500),
        ("sq_d", "failed", 700),
    ] {
        app_state
            .reconciler_service
            .handle_webhook(payment_payload(id, status, amount).to_string().as_bytes(), None)
            .await
            .unwrap();
    }
    app_state
        .reconciler_service
        .handle_webhook(refund_payload("sq_a", "r1", 250).to_string().as_bytes(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_dashboard_metrics_aggregate_ledger() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 1000, 100).await;
    app_state
        .ledger_service
        .record_usage(subscription.id, 150, true)
        .await
        .unwrap();
    seed_payments(&app_state).await;

    let metrics = app_state.reporting_service.dashboard_metrics().await.unwrap();
    assert_eq!(metrics.companies, 1);
    assert_eq!(metrics.subscriptions_by_status.get("active"), Some(&1));
    assert_eq!(metrics.payments, 4);

    // pending と failed は売上に含めない
    assert_eq!(metrics.revenue.len(), 1);
    let usd = &metrics.revenue[0];
    assert_eq!(usd.currency, "USD");
    assert_eq!(usd.payments, 2);
    assert_eq!(usd.gross, 3000);
    assert_eq!(usd.refunded, 250);
    assert_eq!(usd.net, 2750);

    assert_eq!(metrics.units.allocated, 1000);
    assert_eq!(metrics.units.used, 50);
    assert_eq!(metrics.units.promotional_used, 100);
    assert_eq!(metrics.units.remaining, 950);
}

#[tokio::test]
async fn test_payment_listing_filters_and_paginates() {
    let (_app, app_state, _db) = setup_app().await;
    seed_payments(&app_state).await;

    let all = app_state
        .reporting_service
        .list_payments(
            &PaymentFilter::default(),
            &PaginationQuery::new(Some(2), None),
            SortOrder::Desc,
        )
        .await
        .unwrap();
    assert_eq!(all.total, 4);
    assert_eq!(all.items.len(), 2);
    assert!(all.has_more);

    let refunded = app_state
        .reporting_service
        .list_payments(
            &PaymentFilter {
                status: Some(PaymentStatus::PartiallyRefunded),
                ..Default::default()
            },
            &PaginationQuery::default(),
            SortOrder::Asc,
        )
        .await
        .unwrap();
    assert_eq!(refunded.total, 1);
    assert_eq!(refunded.items[0].gateway_transaction_id, "sq_a");

    let now = Utc::now();
    let inverted = app_state
        .reporting_service
        .list_payments(
            &PaymentFilter {
                from: Some(now),
                to: Some(now - Duration::days(1)),
                ..Default::default()
            },
            &PaginationQuery::default(),
            SortOrder::Desc,
        )
        .await;
    assert!(matches!(inverted, Err(AppError::InvalidArgument { .. })));
}

#[tokio::test]
async fn test_company_statement_includes_usage_and_refunds() {
    let (_app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 500, 0).await;
    app_state
        .ledger_service
        .record_usage(subscription.id, 40, false)
        .await
        .unwrap();
    seed_payments(&app_state).await;

    let statement = app_state
        .reporting_service
        .company_statement("Acme", None, None)
        .await
        .unwrap();

    assert_eq!(statement.company.name, "Acme");
    assert_eq!(statement.subscriptions.len(), 1);
    assert_eq!(statement.subscriptions[0].total_used, 40);
    assert_eq!(statement.payments.len(), 4);

    let sq_a = statement
        .payments
        .iter()
        .find(|p| p.payment.gateway_transaction_id == "sq_a")
        .unwrap();
    assert_eq!(sq_a.refunds.len(), 1);
    assert_eq!(statement.totals[0].net, 2750);

    let missing = app_state
        .reporting_service
        .company_statement("Nobody", None, None)
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}
