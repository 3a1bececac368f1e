// src/service/mod.rs
pub mod company_service;
pub mod integrity_service;
pub mod reconciler_service;
pub mod reporting_service;
pub mod translation_service;
pub mod usage_ledger_service;
pub mod usage_linker;
pub mod webhook;
