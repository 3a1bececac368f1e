// migration/src/lib.rs
pub use sea_orm_migration::prelude::*;

// 会社・サブスクリプション関連マイグレーション
mod m20251001_000001_create_companies_table;
mod m20251001_000002_create_subscriptions_table;
mod m20251001_000003_create_usage_periods_table;

// 決済・返金関連マイグレーション
mod m20251001_000004_create_payments_table;
mod m20251001_000005_create_payment_refunds_table;

// 翻訳トランザクション（消費記録）
mod m20251001_000006_create_translation_transactions_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            // 1. 会社とサブスクリプション（外部キー制約なし、参照はアプリ側で検証）
            Box::new(m20251001_000001_create_companies_table::Migration),
            Box::new(m20251001_000002_create_subscriptions_table::Migration),
            Box::new(m20251001_000003_create_usage_periods_table::Migration),
            // 2. 決済台帳
            Box::new(m20251001_000004_create_payments_table::Migration),
            Box::new(m20251001_000005_create_payment_refunds_table::Migration),
            // 3. 消費記録
            Box::new(m20251001_000006_create_translation_transactions_table::Migration),
        ]
    }
}
