// 领域实体定义，存储层和路由层共用

mod attendance;
mod bus;
mod group;
mod schedule;

pub use attendance::{Attendance, AttendanceStatus};
pub use bus::{BusSeat, BusTemplate, SeatStatus};
pub use group::{Group, Membership};
pub use schedule::Schedule;
