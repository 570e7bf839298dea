mod handler;
pub mod member;
pub mod model;

pub use handler::{
    create_group,
    find_public_groups,
    get_group_detail,
    get_group_members,
    get_user_groups,
    join_group,
    leave_group,
    remove_group,
    remove_group_member,
    search_groups,
    set_member_role,
    update_group
};
