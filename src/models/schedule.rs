use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Schedule {
    pub schedule_id: String,
    pub group_id: String,
    pub schedule_name: String,
    pub location: String,
    pub detail_location: String,
    pub detail_location2: String,
    pub location_range: String,
    /// 集合时间，签到状态以此为准
    pub schedule_time: DateTime<Utc>,
}
