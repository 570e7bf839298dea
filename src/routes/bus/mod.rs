mod handler;
pub mod model;

pub use handler::{
    assign_seat,
    batch_create_seats,
    create_bus_template,
    get_bus_template,
    get_bus_templates,
    get_my_seats,
    get_schedule_seats,
    release_seat,
    remove_bus_template,
    update_bus_template
};
