// src/repository/mod.rs
pub mod company_repository;
pub mod payment_refund_repository;
pub mod payment_repository;
pub mod subscription_repository;
pub mod translation_transaction_repository;
pub mod usage_period_repository;
