// src/api/dto/mod.rs
pub mod company_dto;
pub mod payment_dto;
pub mod report_dto;
pub mod subscription_dto;
pub mod work_item_dto;

use crate::error::AppError;
use std::str::FromStr;

/// クエリ文字列の列挙値を解釈する。不正な値は 400
pub(crate) fn parse_enum<T>(field: &str, raw: Option<&str>) -> Result<Option<T>, AppError>
where
    T: FromStr<Err = String>,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::invalid_argument(field, e)),
        None => Ok(None),
    }
}
