use crate::common::app_helper::setup_app;
use crate::common::test_data::{create_company_data, new_subscription, seed_subscription};
use ledger_backend::error::AppError;
use sea_orm::{ConnectionTrait, DbBackend, Statement};

#[tokio::test]
async fn test_subscription_for_unknown_company_is_rejected() {
    let (_app, app_state, _db) = setup_app().await;

    let result = app_state
        .ledger_service
        .create_subscription(new_subscription("Ghost Corp", 1000, 0))
        .await;

    assert!(matches!(result, Err(AppError::ReferenceNotFound(_))));
    let subscriptions = app_state
        .reporting_service
        .list_subscriptions(&Default::default(), &Default::default(), Default::default())
        .await
        .unwrap();
    assert_eq!(subscriptions.total, 0);
}

#[tokio::test]
async fn test_verify_resolves_existing_company_only() {
    let (_app, app_state, _db) = setup_app().await;
    app_state
        .company_service
        .create_company(create_company_data("Acme"))
        .await
        .unwrap();

    assert!(app_state.integrity_service.verify("Acme").await.unwrap());
    assert!(app_state.integrity_service.verify("  Acme ").await.unwrap());
    assert!(!app_state.integrity_service.verify("acme-missing").await.unwrap());
    assert!(!app_state.integrity_service.verify("   ").await.unwrap());
}

#[tokio::test]
async fn test_company_with_active_subscription_cannot_be_deleted() {
    let (_app, app_state, _db) = setup_app().await;
    seed_subscription(&app_state, "Acme", 100, 0).await;

    let result = app_state.company_service.delete_company("Acme").await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(app_state.integrity_service.verify("Acme").await.unwrap());
}

#[tokio::test]
async fn test_audit_reports_orphans_without_modifying_them() {
    let (_app, app_state, db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;

    let report = app_state.integrity_service.audit().await.unwrap();
    assert!(report.is_clean());

    // 会社を直接削除して孤立させる
    db.connection
        .execute(Statement::from_string(
            DbBackend::Postgres,
            "DELETE FROM companies WHERE name = 'Acme'".to_string(),
        ))
        .await
        .unwrap();

    let report = app_state.integrity_service.audit().await.unwrap();
    assert_eq!(report.orphaned_subscriptions.len(), 1);
    assert_eq!(report.orphaned_subscriptions[0].subscription_id, subscription.id);
    assert_eq!(report.missing_companies, vec!["Acme".to_string()]);

    // 監査は読み取りのみ
    let again = app_state.integrity_service.audit().await.unwrap();
    assert_eq!(again.orphaned_subscriptions.len(), 1);
    assert!(app_state
        .ledger_service
        .get_subscription(subscription.id)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_schema_rules_refuse_to_install_over_violating_rows() {
    let (_app, app_state, db) = setup_app().await;
    let (_, period) = seed_subscription(&app_state, "Acme", 100, 0).await;

    db.connection
        .execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE usage_periods SET units_remaining = 5 WHERE id = $1",
            [period.id.into()],
        ))
        .await
        .unwrap();

    match app_state.integrity_service.apply_schema_rules().await {
        Err(AppError::SchemaRuleViolation(violations)) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].table, "usage_periods");
            assert_eq!(violations[0].document_id, period.id);
            assert_eq!(
                violations[0].rule,
                "ck_usage_periods_units_remaining_consistent"
            );
        }
        other => panic!("expected schema rule violation, got {:?}", other),
    }

    // 何も導入されていないので、不整合な更新はまだ通る
    db.connection
        .execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE usage_periods SET units_remaining = 6 WHERE id = $1",
            [period.id.into()],
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_schema_rules_are_idempotent_and_enforced() {
    let (_app, app_state, db) = setup_app().await;
    let (_, period) = seed_subscription(&app_state, "Acme", 100, 0).await;

    let first = app_state.integrity_service.apply_schema_rules().await.unwrap();
    let second = app_state.integrity_service.apply_schema_rules().await.unwrap();
    assert_eq!(first.installed, second.installed);
    assert!(!first.installed.is_empty());

    let result = db
        .connection
        .execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE usage_periods SET units_used = units_allocated + 1 WHERE id = $1",
            [period.id.into()],
        ))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_fix_index_policy_twice_yields_same_index_set() {
    let (_app, app_state, db) = setup_app().await;

    // 会社名インデックスを誤ってユニークにした状態を作る
    db.connection
        .execute(Statement::from_string(
            DbBackend::Postgres,
            "DROP INDEX IF EXISTS idx_subscriptions_company_name".to_string(),
        ))
        .await
        .unwrap();
    db.connection
        .execute(Statement::from_string(
            DbBackend::Postgres,
            "CREATE UNIQUE INDEX idx_subscriptions_company_name ON subscriptions (company_name)"
                .to_string(),
        ))
        .await
        .unwrap();

    let first = app_state.integrity_service.fix_index_policy().await.unwrap();
    assert!(first
        .dropped
        .contains(&"idx_subscriptions_company_name".to_string()));
    assert!(first
        .created
        .contains(&"idx_subscriptions_company_name".to_string()));

    let second = app_state.integrity_service.fix_index_policy().await.unwrap();
    assert!(second.dropped.is_empty());
    assert!(second.created.is_empty());

    let names = |report: &ledger_backend::domain::integrity::IndexPolicyReport| {
        let mut names: Vec<(String, bool)> = report
            .indexes
            .iter()
            .map(|index| (index.name.clone(), index.unique))
            .collect();
        names.sort();
        names
    };
    assert_eq!(names(&first), names(&second));

    // 同じ会社に2つ目のサブスクリプションが作れる
    let (subscription, _) = seed_subscription(&app_state, "Acme", 100, 0).await;
    app_state
        .ledger_service
        .create_subscription(new_subscription(&subscription.company_name, 50, 0))
        .await
        .unwrap();
}
