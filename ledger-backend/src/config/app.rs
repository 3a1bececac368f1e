use crate::config::gateway::GatewayConfig;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub run_migrations: bool,
}

/// 決済完了からの使用量連携（link_to_usage）の再試行設定
#[derive(Clone, Debug)]
pub struct UsageLinkConfig {
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    /// 0 の場合は定期スイープを行わない
    pub relink_interval_secs: u64,
}

impl UsageLinkConfig {
    /// n 回目（1始まり）の失敗後に待つ時間
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_base_ms.saturating_mul(1u64 << exp))
    }
}

impl Default for UsageLinkConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_base_ms: 200,
            relink_interval_secs: 300,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub usage_link: UsageLinkConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        dotenv().ok(); // .env ファイルを読み込む (存在しなくてもエラーにしない)

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            environment,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 5000)?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
                max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
                connect_timeout_secs: parse_var("DB_CONNECT_TIMEOUT_SECS", 8)?,
                run_migrations: parse_var("RUN_MIGRATIONS", true)?,
            },
            gateway: GatewayConfig::from_env(),
            usage_link: UsageLinkConfig {
                max_attempts: parse_var("USAGE_LINK_MAX_ATTEMPTS", 5)?,
                retry_base_ms: parse_var("USAGE_LINK_RETRY_BASE_MS", 200)?,
                relink_interval_secs: parse_var("USAGE_RELINK_INTERVAL_SECS", 300)?,
            },
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// テスト用の設定を作成
    pub fn for_testing(database_url: impl Into<String>) -> Self {
        Self {
            environment: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            database: DatabaseConfig {
                url: database_url.into(),
                max_connections: 5,
                connect_timeout_secs: 10,
                run_migrations: true,
            },
            gateway: GatewayConfig::unsigned("USD"),
            usage_link: UsageLinkConfig {
                max_attempts: 3,
                retry_base_ms: 10,
                relink_interval_secs: 0,
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("Invalid {} value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}
