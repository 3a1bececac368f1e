use std::env;

/// 決済ゲートウェイWebhookの設定
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// 署名検証用の鍵。未設定の場合は検証をスキップする
    pub signature_key: Option<String>,
    /// 署名対象に含まれる通知先URL
    pub notification_url: String,
    pub default_currency: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let signature_key = env::var("WEBHOOK_SIGNATURE_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        if signature_key.is_none() {
            tracing::warn!(
                "WEBHOOK_SIGNATURE_KEY not set - webhook signature verification is disabled"
            );
        }

        Self {
            signature_key,
            notification_url: env::var("WEBHOOK_NOTIFICATION_URL")
                .unwrap_or_else(|_| "http://localhost:5000/webhooks/payments".to_string()),
            default_currency: env::var("DEFAULT_CURRENCY")
                .map(|c| c.trim().to_uppercase())
                .unwrap_or_else(|_| "USD".to_string()),
        }
    }

    pub fn unsigned(default_currency: &str) -> Self {
        Self {
            signature_key: None,
            notification_url: "http://localhost/webhooks/payments".to_string(),
            default_currency: default_currency.to_string(),
        }
    }
}
