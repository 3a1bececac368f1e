// src/service/webhook.rs
//
// 決済ゲートウェイからの通知の解釈と署名検証。
// ペイロードは信頼できない入力として扱い、欠けている項目は既定値で補う

use crate::domain::payment_model::PaymentStatus;
use crate::error::{AppError, AppResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// 署名を載せるヘッダー
pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub gateway_transaction_id: String,
    pub status: PaymentStatus,
    /// 最小通貨単位
    pub amount: i64,
    pub currency: String,
    pub metadata: Value,
    pub company_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundEvent {
    pub refund_id: String,
    pub amount: i64,
    pub currency: Option<String>,
    pub idempotency_key: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub payment: PaymentEvent,
    pub refund: Option<RefundEvent>,
}

/// Webhook本文を解釈する。gateway_transaction_id がなければ 400
pub fn parse_webhook_payload(body: &[u8], default_currency: &str) -> AppResult<WebhookEvent> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("Failed to parse webhook payload: {}", e);
        AppError::BadRequest(format!("Invalid webhook payload: {}", e))
    })?;
    let object = value
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Webhook payload must be a JSON object".to_string()))?;

    let gateway_transaction_id = string_field(object, "gateway_transaction_id").ok_or_else(|| {
        AppError::BadRequest("gateway_transaction_id is required".to_string())
    })?;

    let status = match string_field(object, "status") {
        Some(raw) => PaymentStatus::from_gateway(&raw)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown payment status '{}'", raw)))?,
        None => PaymentStatus::Pending,
    };

    let amount = amount_field(object, "amount")?.unwrap_or(0);
    let currency = string_field(object, "currency")
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| default_currency.to_uppercase());

    let metadata = match object.get("metadata") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => Value::Object(Map::new()),
    };

    let company_name = string_field(object, "company_name").or_else(|| string_field(object, "company"));

    let user_id = string_field(object, "user_id").and_then(|raw| match Uuid::parse_str(&raw) {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(user_id = %raw, "Ignoring malformed user_id in webhook payload");
            None
        }
    });

    let payment_date = string_field(object, "payment_date").and_then(|raw| {
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(date) => Some(date.with_timezone(&Utc)),
            Err(_) => {
                tracing::warn!(payment_date = %raw, "Ignoring malformed payment_date in webhook payload");
                None
            }
        }
    });

    let refund = match object.get("refund") {
        Some(Value::Object(refund)) => Some(parse_refund(refund, &gateway_transaction_id)?),
        Some(Value::Null) | None => None,
        Some(_) => {
            return Err(AppError::BadRequest(
                "refund must be a JSON object".to_string(),
            ))
        }
    };

    Ok(WebhookEvent {
        payment: PaymentEvent {
            gateway_transaction_id,
            status,
            amount,
            currency,
            metadata,
            company_name,
            user_id,
            payment_date,
        },
        refund,
    })
}

fn parse_refund(object: &Map<String, Value>, gateway_transaction_id: &str) -> AppResult<RefundEvent> {
    let refund_id = string_field(object, "refund_id")
        .ok_or_else(|| AppError::BadRequest("refund.refund_id is required".to_string()))?;
    let amount = amount_field(object, "amount")?
        .ok_or_else(|| AppError::BadRequest("refund.amount is required".to_string()))?;

    let idempotency_key = string_field(object, "idempotency_key")
        .unwrap_or_else(|| format!("refund:{}:{}", gateway_transaction_id, refund_id));

    Ok(RefundEvent {
        refund_id,
        amount,
        currency: string_field(object, "currency").map(|c| c.to_uppercase()),
        idempotency_key,
        reason: string_field(object, "reason"),
    })
}

/// 文字列（数値も可）の項目。空白のみは欠落扱い
fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 最小通貨単位の金額。整数か整数を表す文字列のみ受け付ける
fn amount_field(object: &Map<String, Value>, key: &str) -> AppResult<Option<i64>> {
    let amount = match object.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    match amount {
        Some(amount) if amount >= 0 => Ok(Some(amount)),
        Some(_) => Err(AppError::BadRequest(format!("{} must not be negative", key))),
        None => Err(AppError::BadRequest(format!(
            "{} must be an integer amount in minor currency units",
            key
        ))),
    }
}

/// base64(HMAC-SHA256(key, notification_url ++ body))
pub fn sign_payload(signature_key: &str, notification_url: &str, body: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(signature_key.as_bytes())
        .map_err(|e| AppError::InternalServerError(format!("Invalid signature key: {}", e)))?;
    mac.update(notification_url.as_bytes());
    mac.update(body);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// 署名を定数時間で比較する
pub fn verify_signature(
    signature_key: &str,
    notification_url: &str,
    body: &[u8],
    signature: &str,
) -> bool {
    let Ok(provided) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(signature_key.as_bytes()) else {
        return false;
    };
    mac.update(notification_url.as_bytes());
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}
