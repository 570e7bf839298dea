use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub group_id: String,
    pub group_name: String,
    pub is_public: bool,
    /// 私有群组的加入凭证，不要求全局唯一
    #[serde(skip_serializing)]
    pub invite_code: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// 成员关系，(user_id, group_id) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub user_id: String,
    pub group_id: String,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}
