// src/api/dto/work_item_dto.rs

use crate::service::translation_service::WorkItemCompletion;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

fn default_true() -> bool {
    true
}

/// 翻訳パイプラインからの作業完了通知
#[derive(Debug, Deserialize, Validate)]
pub struct CompleteWorkItemRequest {
    #[validate(length(min = 1, max = 200, message = "work_item_id is required"))]
    pub work_item_id: String,
    pub subscription_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub company_name: Option<String>,
    pub user_id: Option<Uuid>,
    #[validate(range(min = 1, message = "units must be greater than 0"))]
    pub units: i64,
    #[serde(default = "default_true")]
    pub prefer_promotional: bool,
    #[validate(length(min = 2, max = 16))]
    pub source_language: Option<String>,
    #[validate(length(min = 2, max = 16))]
    pub target_language: Option<String>,
}

impl From<CompleteWorkItemRequest> for WorkItemCompletion {
    fn from(request: CompleteWorkItemRequest) -> Self {
        Self {
            work_item_id: request.work_item_id,
            subscription_id: request.subscription_id,
            company_name: request.company_name,
            user_id: request.user_id,
            units: request.units,
            prefer_promotional: request.prefer_promotional,
            source_language: request.source_language,
            target_language: request.target_language,
        }
    }
}
