// src/service/usage_linker.rs
//
// 完了した支払いを利用記録に紐付ける。Webhook の応答とは切り離して実行し、
// 失敗は再試行してログに残す

use crate::config::UsageLinkConfig;
use crate::domain::payment_model;
use crate::domain::translation_transaction_model::payment_usage_key;
use crate::error::{AppError, AppResult};
use crate::log_with_context;
use crate::service::usage_ledger_service::{UsageLedgerService, UsageOutcome, UsageRequest};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// 支払いメタデータから読み取った利用内容
#[derive(Debug, Clone, PartialEq)]
pub struct UsageLink {
    pub subscription_id: Option<Uuid>,
    pub units: i64,
    pub prefer_promotional: bool,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub work_item_id: Option<String>,
}

impl UsageLink {
    /// units がなければ利用を伴わない支払い（None）
    pub fn from_metadata(metadata: &Value) -> AppResult<Option<Self>> {
        let Some(object) = metadata.as_object() else {
            return Ok(None);
        };

        let units = match object.get("units") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            Some(_) => None,
        };
        let units = match units {
            Some(units) if units > 0 => units,
            _ => {
                return Err(AppError::invalid_argument(
                    "metadata.units",
                    "must be a positive integer",
                ))
            }
        };

        let subscription_id = match text(object.get("subscription_id")) {
            Some(raw) => Some(Uuid::parse_str(&raw).map_err(|_| {
                AppError::invalid_argument("metadata.subscription_id", "must be a UUID")
            })?),
            None => None,
        };

        let prefer_promotional = match object.get("prefer_promotional") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !matches!(s.trim().to_lowercase().as_str(), "false" | "0" | "no"),
            _ => true,
        };

        Ok(Some(Self {
            subscription_id,
            units,
            prefer_promotional,
            source_language: text(object.get("source_language")),
            target_language: text(object.get("target_language")),
            work_item_id: text(object.get("work_item_id")),
        }))
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkOutcome {
    /// メタデータに利用単位がない
    NotUsageBacked,
    /// サブスクリプションの単位を消費した
    Metered { transaction_id: Uuid, replayed: bool },
    /// サブスクリプションなしの個別購入として記録した
    Individual { transaction_id: Uuid, replayed: bool },
}

#[derive(Clone)]
pub struct UsageLinker {
    ledger: Arc<UsageLedgerService>,
    config: UsageLinkConfig,
}

impl UsageLinker {
    pub fn new(ledger: Arc<UsageLedgerService>, config: UsageLinkConfig) -> Self {
        Self { ledger, config }
    }

    /// 支払いの完了時に呼ばれる。結果を待たずに戻る
    pub fn schedule(&self, payment: payment_model::Model) {
        let linker = self.clone();
        tokio::spawn(async move {
            linker.link_with_retry(&payment).await;
        });
    }

    /// 一時的な失敗は指数バックオフで再試行する。
    /// 諦めた場合もキーは確保されていないので、定期スイープで再度拾われる
    pub async fn link_with_retry(&self, payment: &payment_model::Model) -> Option<LinkOutcome> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.link_to_usage(payment).await {
                Ok(outcome) => return Some(outcome),
                Err(e) if is_transient(&e) && attempt < max_attempts => {
                    let delay = self.config.backoff(attempt);
                    tracing::warn!(
                        gateway_transaction_id = %payment.gateway_transaction_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Usage link failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    log_with_context!(
                        tracing::Level::ERROR,
                        "Usage link failed",
                        "gateway_transaction_id" => &payment.gateway_transaction_id,
                        "attempt" => attempt,
                        "error" => e
                    );
                    return None;
                }
            }
        }

        None
    }

    /// 支払いメタデータに従って利用を記録する。キーは payment:<gateway_transaction_id>
    pub async fn link_to_usage(&self, payment: &payment_model::Model) -> AppResult<LinkOutcome> {
        let Some(link) = UsageLink::from_metadata(&payment.metadata)? else {
            return Ok(LinkOutcome::NotUsageBacked);
        };

        let key = payment_usage_key(&payment.gateway_transaction_id);
        let request = UsageRequest {
            subscription_id: link.subscription_id,
            units: link.units,
            prefer_promotional: link.prefer_promotional,
            company_name: payment.company_name.clone(),
            user_id: payment.user_id,
            payment_id: Some(payment.id),
            source_language: link.source_language,
            target_language: link.target_language,
        };

        let outcome = match link.subscription_id {
            Some(_) => {
                let UsageOutcome {
                    transaction,
                    replayed,
                    ..
                } = self.ledger.record_usage_once(&key, request).await?;
                LinkOutcome::Metered {
                    transaction_id: transaction.id,
                    replayed,
                }
            }
            None => {
                let UsageOutcome {
                    transaction,
                    replayed,
                    ..
                } = self.ledger.record_individual_once(&key, request).await?;
                LinkOutcome::Individual {
                    transaction_id: transaction.id,
                    replayed,
                }
            }
        };

        tracing::info!(
            gateway_transaction_id = %payment.gateway_transaction_id,
            units = link.units,
            work_item_id = ?link.work_item_id,
            outcome = ?outcome,
            "Payment linked to usage"
        );
        Ok(outcome)
    }
}

/// 再試行で解消しうる失敗か
fn is_transient(error: &AppError) -> bool {
    matches!(
        error,
        AppError::DbErr(_) | AppError::Conflict(_) | AppError::InternalServerError(_)
    )
}
