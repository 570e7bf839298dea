use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Ok,
    Late,
    Absent,
    #[default]
    NotCheckedIn,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Ok => "OK",
            AttendanceStatus::Late => "LATE",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::NotCheckedIn => "NOT_CHECKED_IN",
        }
    }

    /// 计入出席人数的状态
    pub fn is_present(&self) -> bool {
        matches!(self, AttendanceStatus::Ok | AttendanceStatus::Late)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(AttendanceStatus::Ok),
            "LATE" => Ok(AttendanceStatus::Late),
            "ABSENT" => Ok(AttendanceStatus::Absent),
            "NOT_CHECKED_IN" => Ok(AttendanceStatus::NotCheckedIn),
            other => Err(format!("unknown attendance status: {}", other)),
        }
    }
}

/// 每个 (schedule_id, user_id) 最多一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendance {
    pub attendance_id: String,
    pub schedule_id: String,
    pub user_id: String,
    pub distance_from_location: f64,
    pub attendance_time: DateTime<Utc>,
    pub status: AttendanceStatus,
}
