mod handler;
pub mod model;

pub use handler::{check_attendance, get_my_attendances, get_schedule_attendances};
