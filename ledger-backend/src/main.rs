// src/main.rs
use ledger_backend::api::{create_router, AppState};
use ledger_backend::config::AppConfig;
use ledger_backend::db::{create_db_pool, run_migrations};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 定期スイープ1回あたりの最大件数
const RELINK_BATCH_SIZE: u64 = 200;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // トレーシングの設定
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_backend=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    tracing::info!("Starting Ledger Backend server...");

    // 設定を読み込む
    let app_config = AppConfig::from_env()?;
    tracing::info!(
        environment = %app_config.environment,
        signed_webhooks = app_config.gateway.signature_key.is_some(),
        "Configuration loaded"
    );

    // データベース接続を作成（プロセス全体で一つ）
    let db_pool = create_db_pool(&app_config.database).await?;
    tracing::info!("Database pool created successfully.");

    if app_config.database.run_migrations {
        run_migrations(&db_pool).await?;
        tracing::info!("Migrations applied.");
    }

    let server_addr = app_config.server_addr();
    let relink_interval = app_config.usage_link.relink_interval_secs;
    let app_state = AppState::new(db_pool, app_config);

    // インデックスとスキーマルールの確認（失敗しても起動は続ける）
    app_state.integrity_service.bootstrap().await;

    if relink_interval > 0 {
        let reconciler = app_state.reconciler_service.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(relink_interval));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match reconciler.relink_completed_payments(RELINK_BATCH_SIZE).await {
                    Ok(report) if report.scanned > 0 => tracing::info!(
                        scanned = report.scanned,
                        linked = report.linked,
                        failed = report.failed.len(),
                        "Relink sweep finished"
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Relink sweep failed"),
                }
            }
        });
    }

    // ルーターの設定
    let app_router = create_router(app_state);

    tracing::info!("Router configured. Server listening on {}", server_addr);

    let listener = TcpListener::bind(&server_addr).await?;
    axum::serve(listener, app_router.into_make_service()).await?;

    Ok(())
}
