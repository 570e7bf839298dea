mod handler;
pub mod model;

pub use handler::{
    create_schedule,
    get_group_schedules,
    get_schedule_detail,
    get_user_schedules,
    remove_schedule,
    update_schedule
};
