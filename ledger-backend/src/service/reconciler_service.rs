// src/service/reconciler_service.rs
//
// 決済ゲートウェイの通知を支払い・返金の台帳に冪等に反映する

use crate::config::GatewayConfig;
use crate::db::DbPool;
use crate::domain::payment_model::{self, PaymentStatus};
use crate::domain::payment_refund_model::{self, REFUND_STATUS_COMPLETED};
use crate::error::{AppError, AppResult};
use crate::repository::payment_refund_repository::PaymentRefundRepository;
use crate::repository::payment_repository::PaymentRepository;
use crate::service::usage_linker::{LinkOutcome, UsageLinker};
use crate::service::webhook::{
    parse_webhook_payload, verify_signature, PaymentEvent, RefundEvent,
};
use chrono::Utc;
use sea_orm::TransactionTrait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// 同じ支払いへの並行更新に負けた場合の読み直し回数
const MAX_RECONCILE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Created,
    Transitioned { from: PaymentStatus, to: PaymentStatus },
    /// 同じステータスの再送
    Unchanged,
    /// 後退する遷移。記録はせず、通知には応答する
    TransitionRejected { from: PaymentStatus, to: PaymentStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundOutcome {
    Appended,
    /// 同じ refund_id が既にある
    Replayed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentEventResult {
    pub payment: payment_model::Model,
    pub outcome: PaymentOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundEventResult {
    pub payment: payment_model::Model,
    pub refund: payment_refund_model::Model,
    pub outcome: RefundOutcome,
}

/// Webhook への応答内容
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WebhookAck {
    Payment(PaymentEventResult),
    Refund(RefundEventResult),
}

#[derive(Debug, Clone, Serialize)]
pub struct RelinkFailure {
    pub gateway_transaction_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RelinkReport {
    pub scanned: usize,
    pub linked: usize,
    pub failed: Vec<RelinkFailure>,
}

#[derive(Clone)]
pub struct ReconcilerService {
    db: DbPool,
    payment_repo: Arc<PaymentRepository>,
    refund_repo: Arc<PaymentRefundRepository>,
    linker: UsageLinker,
    gateway: GatewayConfig,
}

impl ReconcilerService {
    pub fn new(db: DbPool, linker: UsageLinker, gateway: GatewayConfig) -> Self {
        let payment_repo = Arc::new(PaymentRepository::new(db.clone()));
        let refund_repo = Arc::new(PaymentRefundRepository::new(db.clone()));
        Self {
            db,
            payment_repo,
            refund_repo,
            linker,
            gateway,
        }
    }

    /// 署名を検証し、通知を支払いまたは返金として処理する
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> AppResult<WebhookAck> {
        match &self.gateway.signature_key {
            Some(key) => {
                let signature = signature.ok_or_else(|| {
                    tracing::warn!("Webhook rejected: missing signature");
                    AppError::Unauthorized("Missing webhook signature".to_string())
                })?;
                if !verify_signature(key, &self.gateway.notification_url, body, signature) {
                    tracing::warn!("Webhook rejected: invalid signature");
                    return Err(AppError::Unauthorized("Invalid webhook signature".to_string()));
                }
            }
            None => {
                tracing::debug!("Webhook signature key not configured - skipping verification");
            }
        }

        let event = parse_webhook_payload(body, &self.gateway.default_currency)?;

        // 返金を含む通知は返金として扱う（ステータスは返金累計から決まる）
        match event.refund {
            Some(refund) => Ok(WebhookAck::Refund(
                self.on_refund_event(&event.payment.gateway_transaction_id, refund)
                    .await?,
            )),
            None => Ok(WebhookAck::Payment(self.on_payment_event(event.payment).await?)),
        }
    }

    /// 支払い通知の反映。gateway_transaction_id ごとに実質1回だけ変更が起こる
    pub async fn on_payment_event(&self, event: PaymentEvent) -> AppResult<PaymentEventResult> {
        if event.gateway_transaction_id.trim().is_empty() {
            return Err(AppError::BadRequest(
                "gateway_transaction_id is required".to_string(),
            ));
        }
        if event.amount < 0 {
            return Err(AppError::invalid_argument("amount", "must not be negative"));
        }

        for attempt in 1..=MAX_RECONCILE_ATTEMPTS {
            let existing = self
                .payment_repo
                .find_by_gateway_id(&event.gateway_transaction_id)
                .await?;

            let Some(payment) = existing else {
                if self.payment_repo.insert_if_absent(new_payment(&event)).await? {
                    let payment = self.load_payment(&event.gateway_transaction_id).await?;
                    tracing::info!(
                        gateway_transaction_id = %payment.gateway_transaction_id,
                        status = %payment.status,
                        amount = payment.amount,
                        "Payment recorded"
                    );
                    if event.status == PaymentStatus::Completed {
                        self.linker.schedule(payment.clone());
                    }
                    return Ok(PaymentEventResult {
                        payment,
                        outcome: PaymentOutcome::Created,
                    });
                }
                // 並行する再送が先に作成した
                continue;
            };

            let current = payment.status().ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "Payment {} has unknown status '{}'",
                    payment.gateway_transaction_id, payment.status
                ))
            })?;

            if current == event.status {
                tracing::debug!(
                    gateway_transaction_id = %payment.gateway_transaction_id,
                    status = %current,
                    "Payment event replayed with no change"
                );
                return Ok(PaymentEventResult {
                    payment,
                    outcome: PaymentOutcome::Unchanged,
                });
            }

            if !current.can_transition_to(event.status) {
                let rejected = AppError::InvalidTransition {
                    from: current.to_string(),
                    to: event.status.to_string(),
                };
                tracing::warn!(
                    gateway_transaction_id = %payment.gateway_transaction_id,
                    error = %rejected,
                    "Payment event not applied"
                );
                return Ok(PaymentEventResult {
                    payment,
                    outcome: PaymentOutcome::TransitionRejected {
                        from: current,
                        to: event.status,
                    },
                });
            }

            if self
                .payment_repo
                .transition_status(payment.id, current, event.status, &event.metadata)
                .await?
            {
                let payment = self.load_payment(&event.gateway_transaction_id).await?;
                tracing::info!(
                    gateway_transaction_id = %payment.gateway_transaction_id,
                    from = %current,
                    to = %event.status,
                    "Payment status updated"
                );
                if event.status == PaymentStatus::Completed {
                    self.linker.schedule(payment.clone());
                }
                return Ok(PaymentEventResult {
                    payment,
                    outcome: PaymentOutcome::Transitioned {
                        from: current,
                        to: event.status,
                    },
                });
            }

            tracing::debug!(
                gateway_transaction_id = %event.gateway_transaction_id,
                attempt,
                "Payment changed concurrently, re-reading"
            );
        }

        Err(AppError::Conflict(format!(
            "Payment {} is being updated concurrently",
            event.gateway_transaction_id
        )))
    }

    /// 返金通知の反映。refund_id ごとに1回だけ追記され、累計は支払い額を超えない
    pub async fn on_refund_event(
        &self,
        gateway_transaction_id: &str,
        event: RefundEvent,
    ) -> AppResult<RefundEventResult> {
        if event.refund_id.trim().is_empty() {
            return Err(AppError::invalid_argument("refund_id", "must not be empty"));
        }
        if event.amount <= 0 {
            return Err(AppError::invalid_argument("amount", "must be greater than 0"));
        }

        for attempt in 1..=MAX_RECONCILE_ATTEMPTS {
            let payment = self.load_payment(gateway_transaction_id).await?;

            if let Some(existing) = self
                .refund_repo
                .find_by_refund_id(payment.id, &event.refund_id)
                .await?
            {
                return Ok(self.replayed_refund(payment, existing, &event));
            }

            let status = payment.status().ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "Payment {} has unknown status '{}'",
                    payment.gateway_transaction_id, payment.status
                ))
            })?;
            if !status.is_refundable() {
                return Err(AppError::InvalidTransition {
                    from: status.to_string(),
                    to: PaymentStatus::after_refunds(
                        payment.amount,
                        payment.refunded_amount.saturating_add(event.amount),
                    )
                    .to_string(),
                });
            }

            if let Some(currency) = &event.currency {
                if !currency.eq_ignore_ascii_case(&payment.currency) {
                    return Err(AppError::invalid_argument(
                        "currency",
                        format!("refund currency must match payment currency {}", payment.currency),
                    ));
                }
            }

            // 累計が i64 を超える場合も支払い額超過として扱う
            let refunded_total = payment
                .refunded_amount
                .checked_add(event.amount)
                .filter(|total| *total <= payment.amount);
            let Some(refunded_total) = refunded_total else {
                tracing::warn!(
                    gateway_transaction_id,
                    refund_id = %event.refund_id,
                    amount = payment.amount,
                    already_refunded = payment.refunded_amount,
                    requested = event.amount,
                    "Refund rejected: exceeds payment amount"
                );
                return Err(AppError::RefundExceedsPayment {
                    payment_amount: payment.amount,
                    already_refunded: payment.refunded_amount,
                    requested: event.amount,
                });
            };

            let refund = payment_refund_model::Model {
                id: Uuid::new_v4(),
                payment_id: payment.id,
                refund_id: event.refund_id.clone(),
                amount: event.amount,
                currency: payment.currency.clone(),
                status: REFUND_STATUS_COMPLETED.to_string(),
                idempotency_key: event.idempotency_key.clone(),
                reason: event.reason.clone(),
                created_at: Utc::now(),
            };
            let next_status = PaymentStatus::after_refunds(payment.amount, refunded_total);

            // 返金の追記と累計の更新は同じトランザクションで行う
            let txn = self.db.begin().await?;
            if !PaymentRefundRepository::insert_if_absent_in(&txn, refund).await? {
                txn.rollback().await?;
                let existing = self
                    .refund_repo
                    .find_by_refund_id(payment.id, &event.refund_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Conflict(format!(
                            "Refund {} is being recorded concurrently",
                            event.refund_id
                        ))
                    })?;
                return Ok(self.replayed_refund(payment, existing, &event));
            }

            if !PaymentRepository::apply_refund_in(
                &txn,
                payment.id,
                payment.refunded_amount,
                refunded_total,
                next_status,
            )
            .await?
            {
                // 別の返金が先に反映された。読み直して判定し直す
                txn.rollback().await?;
                tracing::debug!(
                    gateway_transaction_id,
                    refund_id = %event.refund_id,
                    attempt,
                    "Refund raced with another update, re-reading"
                );
                continue;
            }
            txn.commit().await?;

            let payment = self.load_payment(gateway_transaction_id).await?;
            let refund = self
                .refund_repo
                .find_by_refund_id(payment.id, &event.refund_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Refund {}", event.refund_id)))?;

            tracing::info!(
                gateway_transaction_id,
                refund_id = %refund.refund_id,
                amount = refund.amount,
                refunded_total = payment.refunded_amount,
                status = %payment.status,
                "Refund recorded"
            );
            return Ok(RefundEventResult {
                payment,
                refund,
                outcome: RefundOutcome::Appended,
            });
        }

        Err(AppError::Conflict(format!(
            "Payment {} is being refunded concurrently",
            gateway_transaction_id
        )))
    }

    fn replayed_refund(
        &self,
        payment: payment_model::Model,
        existing: payment_refund_model::Model,
        event: &RefundEvent,
    ) -> RefundEventResult {
        if existing.amount != event.amount {
            tracing::warn!(
                gateway_transaction_id = %payment.gateway_transaction_id,
                refund_id = %existing.refund_id,
                recorded = existing.amount,
                received = event.amount,
                "Refund replay carries a different amount; keeping the recorded refund"
            );
        } else {
            tracing::debug!(
                gateway_transaction_id = %payment.gateway_transaction_id,
                refund_id = %existing.refund_id,
                "Refund event replayed"
            );
        }
        RefundEventResult {
            payment,
            refund: existing,
            outcome: RefundOutcome::Replayed,
        }
    }

    /// 完了済みで未連携の支払いを利用記録に紐付け直す（定期スイープと管理APIから呼ばれる）
    pub async fn relink_completed_payments(&self, limit: u64) -> AppResult<RelinkReport> {
        let payments = self.payment_repo.find_unlinked_completed(limit).await?;
        let mut report = RelinkReport {
            scanned: payments.len(),
            ..Default::default()
        };

        for payment in payments {
            match self.linker.link_to_usage(&payment).await {
                Ok(LinkOutcome::NotUsageBacked) => {}
                Ok(_) => report.linked += 1,
                Err(e) => {
                    tracing::error!(
                        gateway_transaction_id = %payment.gateway_transaction_id,
                        error = %e,
                        "Relink failed"
                    );
                    // 失敗した支払いは次回以降の走査で後回しにする
                    self.payment_repo.record_link_attempt(payment.id).await?;
                    report.failed.push(RelinkFailure {
                        gateway_transaction_id: payment.gateway_transaction_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                linked = report.linked,
                failed = report.failed.len(),
                "Relink sweep finished"
            );
        }
        Ok(report)
    }

    pub async fn get_payment(&self, gateway_transaction_id: &str) -> AppResult<payment_model::Model> {
        self.load_payment(gateway_transaction_id).await
    }

    pub async fn list_refunds(&self, payment_id: Uuid) -> AppResult<Vec<payment_refund_model::Model>> {
        Ok(self.refund_repo.find_by_payment(payment_id).await?)
    }

    async fn load_payment(&self, gateway_transaction_id: &str) -> AppResult<payment_model::Model> {
        self.payment_repo
            .find_by_gateway_id(gateway_transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Payment {} not found", gateway_transaction_id))
            })
    }
}

fn new_payment(event: &PaymentEvent) -> payment_model::Model {
    let now = Utc::now();
    payment_model::Model {
        id: Uuid::new_v4(),
        gateway_transaction_id: event.gateway_transaction_id.clone(),
        company_name: event.company_name.clone(),
        user_id: event.user_id,
        amount: event.amount,
        refunded_amount: 0,
        currency: event.currency.clone(),
        status: event.status.as_str().to_string(),
        metadata: event.metadata.clone(),
        link_attempts: 0,
        last_link_attempt_at: None,
        payment_date: event.payment_date.unwrap_or(now),
        created_at: now,
        updated_at: now,
    }
}
