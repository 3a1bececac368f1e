// src/domain/integrity.rs
//
// 外部キーを持たないストアに対する整合性ルール（スキーマ検証とインデックス方針）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ストレージ層に CHECK 制約として導入する検証ルール
#[derive(Debug, Clone, Copy)]
pub struct SchemaRule {
    pub table: &'static str,
    pub name: &'static str,
    /// 行が満たすべき条件（SQL式）
    pub check: &'static str,
    pub description: &'static str,
}

impl SchemaRule {
    pub fn constraint_name(&self) -> String {
        format!("ck_{}_{}", self.table, self.name)
    }
}

pub const SCHEMA_RULES: &[SchemaRule] = &[
    SchemaRule {
        table: "companies",
        name: "name_not_empty",
        check: "length(btrim(name)) > 0",
        description: "company name must not be empty",
    },
    SchemaRule {
        table: "subscriptions",
        name: "company_name_not_empty",
        check: "length(btrim(company_name)) > 0",
        description: "subscription must reference a company",
    },
    SchemaRule {
        table: "subscriptions",
        name: "unit_kind",
        check: "unit_kind IN ('page', 'word', 'character')",
        description: "unit_kind must be one of page, word, character",
    },
    SchemaRule {
        table: "subscriptions",
        name: "status",
        check: "status IN ('active', 'inactive', 'expired')",
        description: "status must be one of active, inactive, expired",
    },
    SchemaRule {
        table: "subscriptions",
        name: "units_per_cycle_positive",
        check: "units_per_cycle > 0",
        description: "units_per_cycle must be greater than 0",
    },
    SchemaRule {
        table: "subscriptions",
        name: "price_per_unit_positive",
        check: "price_per_unit > 0",
        description: "price_per_unit must be greater than 0",
    },
    SchemaRule {
        table: "subscriptions",
        name: "discount_range",
        check: "discount > 0 AND discount <= 1",
        description: "discount must be in (0, 1]",
    },
    SchemaRule {
        table: "subscriptions",
        name: "promotional_units_non_negative",
        check: "promotional_units >= 0",
        description: "promotional_units must not be negative",
    },
    SchemaRule {
        table: "subscriptions",
        name: "price_non_negative",
        check: "price >= 0",
        description: "price must not be negative",
    },
    SchemaRule {
        table: "subscriptions",
        name: "date_order",
        check: "end_date IS NULL OR end_date >= start_date",
        description: "end_date must not precede start_date",
    },
    SchemaRule {
        table: "usage_periods",
        name: "units_used_range",
        check: "units_used >= 0 AND units_used <= units_allocated",
        description: "units_used must be within [0, units_allocated]",
    },
    SchemaRule {
        table: "usage_periods",
        name: "units_remaining_consistent",
        check: "units_remaining = units_allocated - units_used",
        description: "units_remaining must equal units_allocated - units_used",
    },
    SchemaRule {
        table: "usage_periods",
        name: "promotional_units_used_non_negative",
        check: "promotional_units_used >= 0",
        description: "promotional_units_used must not be negative",
    },
    SchemaRule {
        table: "usage_periods",
        name: "period_order",
        check: "period_end > period_start",
        description: "period_end must be after period_start",
    },
    SchemaRule {
        table: "payments",
        name: "status",
        check: "status IN ('completed', 'pending', 'failed', 'refunded', 'partially_refunded')",
        description: "status must be a known payment status",
    },
    SchemaRule {
        table: "payments",
        name: "amount_non_negative",
        check: "amount >= 0",
        description: "amount must not be negative",
    },
    SchemaRule {
        table: "payments",
        name: "refunded_amount_range",
        check: "refunded_amount >= 0 AND refunded_amount <= amount",
        description: "refunded_amount must be within [0, amount]",
    },
    SchemaRule {
        table: "payments",
        name: "gateway_transaction_id_not_empty",
        check: "length(btrim(gateway_transaction_id)) > 0",
        description: "gateway_transaction_id must not be empty",
    },
    SchemaRule {
        table: "payments",
        name: "currency_code",
        check: "length(currency) = 3",
        description: "currency must be a 3-letter code",
    },
    SchemaRule {
        table: "payment_refunds",
        name: "amount_positive",
        check: "amount > 0",
        description: "refund amount must be greater than 0",
    },
];

/// スキーマルールに違反している1件の文書
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub table: String,
    pub document_id: Uuid,
    pub rule: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaRulesReport {
    pub installed: Vec<String>,
}

/// インデックス方針の1項目
#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub table: &'static str,
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub unique: bool,
}

pub const INDEX_POLICY: &[IndexSpec] = &[
    IndexSpec {
        table: "companies",
        name: "idx_companies_name",
        columns: &["name"],
        unique: true,
    },
    // 1社が複数のサブスクリプションを持つため company_name は非ユニーク
    IndexSpec {
        table: "subscriptions",
        name: "idx_subscriptions_company_name",
        columns: &["company_name"],
        unique: false,
    },
    IndexSpec {
        table: "subscriptions",
        name: "idx_subscriptions_status",
        columns: &["status"],
        unique: false,
    },
    IndexSpec {
        table: "subscriptions",
        name: "idx_subscriptions_company_name_status",
        columns: &["company_name", "status"],
        unique: false,
    },
    IndexSpec {
        table: "usage_periods",
        name: "idx_usage_periods_subscription_id_sequence",
        columns: &["subscription_id", "sequence"],
        unique: true,
    },
    IndexSpec {
        table: "payments",
        name: "idx_payments_gateway_transaction_id",
        columns: &["gateway_transaction_id"],
        unique: true,
    },
    IndexSpec {
        table: "payments",
        name: "idx_payments_status",
        columns: &["status"],
        unique: false,
    },
    IndexSpec {
        table: "payments",
        name: "idx_payments_payment_date",
        columns: &["payment_date"],
        unique: false,
    },
    IndexSpec {
        table: "payments",
        name: "idx_payments_company_name",
        columns: &["company_name"],
        unique: false,
    },
    IndexSpec {
        table: "payment_refunds",
        name: "idx_payment_refunds_payment_id_refund_id",
        columns: &["payment_id", "refund_id"],
        unique: true,
    },
    IndexSpec {
        table: "translation_transactions",
        name: "idx_translation_transactions_idempotency_key",
        columns: &["idempotency_key"],
        unique: true,
    },
    IndexSpec {
        table: "translation_transactions",
        name: "idx_translation_transactions_subscription_id",
        columns: &["subscription_id"],
        unique: false,
    },
];

impl IndexSpec {
    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE {}INDEX IF NOT EXISTS \"{}\" ON \"{}\" ({})",
            if self.unique { "UNIQUE " } else { "" },
            self.name,
            self.table,
            columns
        )
    }

    fn matches_columns(&self, index: &ExistingIndex) -> bool {
        index.table == self.table
            && index.columns.len() == self.columns.len()
            && index.columns.iter().zip(self.columns).all(|(a, b)| a == b)
    }
}

/// データベース上に存在するインデックス
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub primary: bool,
    /// UNIQUE 制約などが所有しているか（DROP INDEX ではなく DROP CONSTRAINT が必要）
    pub constraint_backed: bool,
}

impl ExistingIndex {
    /// pg_indexes の1行と、インデックスを所有する制約の種類（pg_constraint.contype）から組み立てる
    pub fn from_definition(
        name: String,
        table: String,
        index_def: &str,
        constraint_type: Option<&str>,
    ) -> Self {
        Self {
            columns: parse_index_columns(index_def),
            unique: index_def.trim_start().starts_with("CREATE UNIQUE INDEX"),
            primary: constraint_type == Some("p"),
            constraint_backed: constraint_type.is_some(),
            name,
            table,
        }
    }

    pub fn drop_sql(&self) -> String {
        if self.constraint_backed {
            format!(
                "ALTER TABLE \"{}\" DROP CONSTRAINT IF EXISTS \"{}\"",
                self.table, self.name
            )
        } else {
            format!("DROP INDEX IF EXISTS \"{}\"", self.name)
        }
    }
}

/// pg_get_indexdef の出力から列名を取り出す
/// 例: `CREATE UNIQUE INDEX idx ON public.companies USING btree (name)`
pub fn parse_index_columns(index_def: &str) -> Vec<String> {
    let Some(open) = index_def.find('(') else {
        return Vec::new();
    };
    let Some(close) = index_def.rfind(')') else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }

    index_def[open + 1..close]
        .split(',')
        .filter_map(|part| {
            let column = part
                .split_whitespace()
                .next()?
                .trim_matches('"')
                .to_string();
            (!column.is_empty()).then_some(column)
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct IndexPlan {
    pub drops: Vec<ExistingIndex>,
    pub creates: Vec<IndexSpec>,
}

impl IndexPlan {
    pub fn is_empty(&self) -> bool {
        self.drops.is_empty() && self.creates.is_empty()
    }
}

/// 既存インデックスと方針を突き合わせ、削除・作成すべきものを決める。
/// 主キーのインデックスには触れない
pub fn plan_index_changes(existing: &[ExistingIndex]) -> IndexPlan {
    let mut plan = IndexPlan::default();

    for spec in INDEX_POLICY {
        let candidates: Vec<&ExistingIndex> = existing
            .iter()
            .filter(|idx| !idx.primary)
            .filter(|idx| spec.matches_columns(idx) || idx.name == spec.name)
            .collect();

        let satisfied = candidates
            .iter()
            .any(|idx| spec.matches_columns(idx) && idx.unique == spec.unique);

        for idx in candidates {
            let wrong_uniqueness = spec.matches_columns(idx) && idx.unique != spec.unique;
            let name_taken = idx.name == spec.name && !spec.matches_columns(idx);
            if (wrong_uniqueness || name_taken)
                && !plan.drops.iter().any(|d: &ExistingIndex| d.name == idx.name)
            {
                plan.drops.push(idx.clone());
            }
        }

        if !satisfied {
            plan.creates.push(*spec);
        }
    }

    plan
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexPolicyReport {
    pub dropped: Vec<String>,
    pub created: Vec<String>,
    pub indexes: Vec<ExistingIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedSubscription {
    pub subscription_id: Uuid,
    pub company_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub orphaned_subscriptions: Vec<OrphanedSubscription>,
    pub missing_companies: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_subscriptions.is_empty()
    }
}
