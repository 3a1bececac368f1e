// src/domain/mod.rs
pub mod company_model;
pub mod integrity;
pub mod payment_model;
pub mod payment_refund_model;
pub mod subscription_model;
pub mod translation_transaction_model;
pub mod usage_period_model;
