// src/service/integrity_service.rs
//
// 外部キーを持たないストアで会社とサブスクリプションの参照整合性を守る

use crate::db::DbPool;
use crate::domain::integrity::{
    plan_index_changes, AuditReport, ExistingIndex, IndexPolicyReport, OrphanedSubscription,
    RuleViolation, SchemaRulesReport, INDEX_POLICY, SCHEMA_RULES,
};
use crate::error::{AppError, AppResult};
use crate::repository::company_repository::CompanyRepository;
use chrono::Utc;
use sea_orm::{
    ConnectionTrait, DbBackend, FromQueryResult, Statement, TransactionTrait,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, FromQueryResult)]
struct IndexRow {
    table_name: String,
    index_name: String,
    index_def: String,
    constraint_type: Option<String>,
}

#[derive(Debug, FromQueryResult)]
struct ViolatingRow {
    id: Uuid,
}

#[derive(Debug, FromQueryResult)]
struct OrphanRow {
    subscription_id: Uuid,
    company_name: String,
}

#[derive(Clone)]
pub struct IntegrityService {
    db: DbPool,
    company_repo: Arc<CompanyRepository>,
}

impl IntegrityService {
    pub fn new(db: DbPool) -> Self {
        let company_repo = Arc::new(CompanyRepository::new(db.clone()));
        Self { db, company_repo }
    }

    /// 会社参照が解決できるか。サブスクリプション作成前に同期的に呼ばれる
    pub async fn verify(&self, company_ref: &str) -> AppResult<bool> {
        let name = company_ref.trim();
        if name.is_empty() {
            return Ok(false);
        }
        Ok(self.company_repo.exists_by_name(name).await?)
    }

    /// CHECK 制約としてスキーマルールを導入する。
    /// 違反している行が1件でもあれば何も変更せず、違反一覧を返す
    pub async fn apply_schema_rules(&self) -> AppResult<SchemaRulesReport> {
        let violations = self.scan_rule_violations().await?;
        if !violations.is_empty() {
            tracing::warn!(
                violations = violations.len(),
                "Schema rules not applied: existing rows violate them"
            );
            return Err(AppError::SchemaRuleViolation(violations));
        }

        // DDL もトランザクション内で実行できるので、途中で失敗すれば全て巻き戻る
        let txn = self.db.begin().await?;
        let mut installed = Vec::with_capacity(SCHEMA_RULES.len());
        for rule in SCHEMA_RULES {
            let constraint = rule.constraint_name();
            txn.execute(Statement::from_string(
                DbBackend::Postgres,
                format!(
                    "ALTER TABLE \"{}\" DROP CONSTRAINT IF EXISTS \"{}\"",
                    rule.table, constraint
                ),
            ))
            .await?;
            txn.execute(Statement::from_string(
                DbBackend::Postgres,
                format!(
                    "ALTER TABLE \"{}\" ADD CONSTRAINT \"{}\" CHECK ({})",
                    rule.table, constraint, rule.check
                ),
            ))
            .await?;
            installed.push(constraint);
        }
        txn.commit().await?;

        tracing::info!(rules = installed.len(), "Schema rules installed");
        Ok(SchemaRulesReport { installed })
    }

    async fn scan_rule_violations(&self) -> AppResult<Vec<RuleViolation>> {
        let mut violations = Vec::new();

        for rule in SCHEMA_RULES {
            // CHECK 制約と同じく、NULL になる式は違反とみなさない
            let rows = ViolatingRow::find_by_statement(Statement::from_string(
                DbBackend::Postgres,
                format!(
                    "SELECT id FROM \"{}\" WHERE NOT ({}) ORDER BY id",
                    rule.table, rule.check
                ),
            ))
            .all(&self.db)
            .await?;

            violations.extend(rows.into_iter().map(|row| RuleViolation {
                table: rule.table.to_string(),
                document_id: row.id,
                rule: rule.constraint_name(),
                description: rule.description.to_string(),
            }));
        }

        Ok(violations)
    }

    /// インデックス方針との差分を直す。何度実行しても同じ最終状態になる
    pub async fn fix_index_policy(&self) -> AppResult<IndexPolicyReport> {
        let existing = load_indexes(&self.db).await?;
        let plan = plan_index_changes(&existing);

        let mut dropped = Vec::new();
        let mut created = Vec::new();

        if !plan.is_empty() {
            let txn = self.db.begin().await?;
            for index in &plan.drops {
                tracing::warn!(
                    index = %index.name,
                    table = %index.table,
                    unique = index.unique,
                    "Dropping index that does not match the index policy"
                );
                txn.execute(Statement::from_string(DbBackend::Postgres, index.drop_sql()))
                    .await?;
                dropped.push(index.name.clone());
            }
            for spec in &plan.creates {
                tracing::info!(index = spec.name, table = spec.table, unique = spec.unique, "Creating index");
                txn.execute(Statement::from_string(DbBackend::Postgres, spec.create_sql()))
                    .await?;
                created.push(spec.name.to_string());
            }
            txn.commit().await?;
        }

        let indexes = load_indexes(&self.db).await?;
        Ok(IndexPolicyReport {
            dropped,
            created,
            indexes,
        })
    }

    /// 会社参照が解決できないサブスクリプションの一覧（読み取りのみ）
    pub async fn audit(&self) -> AppResult<AuditReport> {
        let rows = OrphanRow::find_by_statement(Statement::from_string(
            DbBackend::Postgres,
            r#"SELECT s.id AS subscription_id, s.company_name
               FROM subscriptions s
               LEFT JOIN companies c ON c.name = s.company_name
               WHERE c.id IS NULL
               ORDER BY s.company_name, s.id"#,
        ))
        .all(&self.db)
        .await?;

        let missing_companies: BTreeSet<String> =
            rows.iter().map(|row| row.company_name.clone()).collect();
        let orphaned_subscriptions = rows
            .into_iter()
            .map(|row| OrphanedSubscription {
                subscription_id: row.subscription_id,
                company_name: row.company_name,
            })
            .collect::<Vec<_>>();

        if !orphaned_subscriptions.is_empty() {
            tracing::warn!(
                orphaned = orphaned_subscriptions.len(),
                missing_companies = missing_companies.len(),
                "Integrity audit found orphaned subscriptions"
            );
        }

        Ok(AuditReport {
            orphaned_subscriptions,
            missing_companies: missing_companies.into_iter().collect(),
            checked_at: Utc::now(),
        })
    }

    /// 起動時に方針とルールを適用する。失敗してもサービスは継続する
    pub async fn bootstrap(&self) {
        match self.fix_index_policy().await {
            Ok(report) => tracing::info!(
                dropped = ?report.dropped,
                created = ?report.created,
                "Index policy verified"
            ),
            Err(e) => tracing::error!(error = %e, "Failed to apply index policy"),
        }

        match self.apply_schema_rules().await {
            Ok(report) => tracing::info!(rules = report.installed.len(), "Schema rules verified"),
            Err(AppError::SchemaRuleViolation(violations)) => {
                for violation in &violations {
                    tracing::error!(
                        table = %violation.table,
                        document_id = %violation.document_id,
                        rule = %violation.rule,
                        "Row violates schema rule"
                    );
                }
                tracing::error!(
                    violations = violations.len(),
                    "Schema rules not installed; continuing with application-side checks"
                );
            }
            Err(e) => tracing::error!(error = %e, "Failed to apply schema rules"),
        }
    }
}

async fn load_indexes<C: ConnectionTrait>(conn: &C) -> AppResult<Vec<ExistingIndex>> {
    let tables = INDEX_POLICY
        .iter()
        .map(|spec| spec.table)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|table| format!("'{}'", table))
        .collect::<Vec<_>>()
        .join(", ");

    let rows = IndexRow::find_by_statement(Statement::from_string(
        DbBackend::Postgres,
        format!(
            r#"SELECT pi.tablename::TEXT AS table_name,
                      pi.indexname::TEXT AS index_name,
                      pi.indexdef AS index_def,
                      c.contype::TEXT AS constraint_type
               FROM pg_indexes pi
               LEFT JOIN pg_namespace n ON n.nspname = pi.schemaname
               LEFT JOIN pg_constraint c
                      ON c.conname = pi.indexname AND c.connamespace = n.oid
               WHERE pi.schemaname = current_schema()
                 AND pi.tablename IN ({})
               ORDER BY pi.tablename, pi.indexname"#,
            tables
        ),
    ))
    .all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            ExistingIndex::from_definition(
                row.index_name,
                row.table_name,
                &row.index_def,
                row.constraint_type.as_deref(),
            )
        })
        .collect())
}
