// src/api/mod.rs
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::logging::{inject_request_context, logging_middleware};
use crate::service::{
    company_service::CompanyService, integrity_service::IntegrityService,
    reconciler_service::ReconcilerService, reporting_service::ReportingService,
    translation_service::TranslationService, usage_ledger_service::UsageLedgerService,
    usage_linker::UsageLinker,
};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod handlers;

use handlers::{
    company_handler::company_router, integrity_handler::integrity_router,
    payment_handler::payment_router, report_handler::report_router,
    subscription_handler::subscription_router, system_handler::system_router,
    work_item_handler::work_item_router,
};

/// 統一されたアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub company_service: Arc<CompanyService>,
    pub ledger_service: Arc<UsageLedgerService>,
    pub reconciler_service: Arc<ReconcilerService>,
    pub translation_service: Arc<TranslationService>,
    pub reporting_service: Arc<ReportingService>,
    pub integrity_service: Arc<IntegrityService>,
    pub db: DbPool,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// 接続ハンドルを一つだけ受け取り、全サービスで共有する
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        let integrity_service = Arc::new(IntegrityService::new(db.clone()));
        let ledger_service = Arc::new(UsageLedgerService::new(
            db.clone(),
            integrity_service.clone(),
        ));
        let linker = UsageLinker::new(ledger_service.clone(), config.usage_link.clone());

        Self {
            company_service: Arc::new(CompanyService::new(db.clone())),
            reconciler_service: Arc::new(ReconcilerService::new(
                db.clone(),
                linker,
                config.gateway.clone(),
            )),
            translation_service: Arc::new(TranslationService::new(
                db.clone(),
                ledger_service.clone(),
            )),
            reporting_service: Arc::new(ReportingService::new(db.clone())),
            ledger_service,
            integrity_service,
            db,
            config: Arc::new(config),
        }
    }
}

/// 全ルーターを結合し、リクエストコンテキストとログのミドルウェアを掛ける
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .merge(system_router(app_state.clone()))
        .merge(company_router(app_state.clone()))
        .merge(subscription_router(app_state.clone()))
        .merge(payment_router(app_state.clone()))
        .merge(work_item_router(app_state.clone()))
        .merge(report_router(app_state.clone()))
        .merge(integrity_router(app_state))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(inject_request_context))
}
