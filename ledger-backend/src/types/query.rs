use serde::{Deserialize, Deserializer, Serialize};

/// デフォルトの取得件数
pub const DEFAULT_LIMIT: u64 = 20;
/// 取得件数の上限
pub const MAX_LIMIT: u64 = 100;

/// 文字列または数値からu64をデシリアライズ
pub fn deserialize_opt_u64_from_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    match Option::<StringOrNumber>::deserialize(deserializer)? {
        Some(StringOrNumber::String(s)) if s.trim().is_empty() => Ok(None),
        Some(StringOrNumber::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(StringOrNumber::Number(n)) => Ok(Some(n)),
        None => Ok(None),
    }
}

/// limit / skip 形式のページネーションクエリ
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaginationQuery {
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_string")]
    pub limit: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_string")]
    pub skip: Option<u64>,
}

impl PaginationQuery {
    pub fn new(limit: Option<u64>, skip: Option<u64>) -> Self {
        Self { limit, skip }
    }

    /// デフォルト値と上限を適用した (limit, skip)
    pub fn resolve(&self) -> (u64, u64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        (limit, self.skip.unwrap_or(0))
    }
}

/// ソート順序（日付順）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn to_order(self) -> sea_orm::Order {
        match self {
            SortOrder::Asc => sea_orm::Order::Asc,
            SortOrder::Desc => sea_orm::Order::Desc,
        }
    }
}
