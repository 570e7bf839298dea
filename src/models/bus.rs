use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BusTemplate {
    pub id: String,
    pub name: String,
    pub rows: i32,
    pub seats_per_row: i32,
    pub total_seats: i32,
    pub has_aisle: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    #[default]
    Empty,
    Assigned,
    Occupied,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Empty => "empty",
            SeatStatus::Assigned => "assigned",
            SeatStatus::Occupied => "occupied",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty" => Ok(SeatStatus::Empty),
            "assigned" => Ok(SeatStatus::Assigned),
            "occupied" => Ok(SeatStatus::Occupied),
            other => Err(format!("unknown seat status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSeat {
    pub id: String,
    pub seat_number: i32,
    pub seat_label: String,
    pub row_position: i32,
    pub column_position: i32,
    pub bus_template_id: String,
    pub schedule_id: Option<String>,
    pub user_id: Option<String>,
    pub status: SeatStatus,
}
