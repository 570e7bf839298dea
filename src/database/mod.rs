// 存储层
// 定义各实体的存储接口，分别由 Postgres 和内存实现

mod memory;
mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Attendance, BusSeat, BusTemplate, Group, Membership, Schedule};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// 违反唯一约束
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn find_group_by_id(&self, group_id: &str) -> StoreResult<Option<Group>>;
    async fn find_group_by_invite_code(&self, invite_code: &str) -> StoreResult<Option<Group>>;
    async fn find_public_groups(&self) -> StoreResult<Vec<Group>>;
    /// 在公开群组的名称和简介中搜索
    async fn find_groups_by_keyword(&self, keyword: &str) -> StoreResult<Vec<Group>>;
    /// 在同一事务中写入群组和创建者的管理员成员关系
    async fn create_group_with_admin(&self, group: &Group, admin: &Membership) -> StoreResult<()>;
    async fn update_group(&self, group: &Group) -> StoreResult<()>;
    async fn delete_group(&self, group_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn find_member(&self, user_id: &str, group_id: &str) -> StoreResult<Option<Membership>>;
    async fn find_members_by_group(&self, group_id: &str) -> StoreResult<Vec<Membership>>;
    async fn find_members_by_user(&self, user_id: &str) -> StoreResult<Vec<Membership>>;
    async fn find_admins_by_group(&self, group_id: &str) -> StoreResult<Vec<Membership>>;
    /// 已存在时返回 `StoreError::Duplicate`
    async fn create_member(&self, member: &Membership) -> StoreResult<()>;
    /// 返回是否有记录被更新
    async fn update_member(&self, member: &Membership) -> StoreResult<bool>;
    async fn delete_member(&self, user_id: &str, group_id: &str) -> StoreResult<()>;
    /// 原子地删除成员，但不删除群组的最后一个管理员；返回 false 表示被拒绝
    async fn delete_member_keeping_admin(&self, user_id: &str, group_id: &str)
    -> StoreResult<bool>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn find_schedule_by_id(&self, schedule_id: &str) -> StoreResult<Option<Schedule>>;
    async fn find_schedules_by_group(&self, group_id: &str) -> StoreResult<Vec<Schedule>>;
    async fn create_schedule(&self, schedule: &Schedule) -> StoreResult<()>;
    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()>;
    async fn delete_schedule(&self, schedule_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find_attendance(
        &self,
        schedule_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<Attendance>>;
    async fn find_attendances_by_schedule(&self, schedule_id: &str)
    -> StoreResult<Vec<Attendance>>;
    async fn find_attendances_by_user(&self, user_id: &str) -> StoreResult<Vec<Attendance>>;
    /// 按 (schedule_id, user_id) 原子地插入或更新，已有记录保留原 attendance_id
    async fn upsert_attendance(&self, attendance: &Attendance) -> StoreResult<Attendance>;
    async fn delete_attendances_by_schedule(&self, schedule_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait BusStore: Send + Sync {
    async fn find_templates(&self) -> StoreResult<Vec<BusTemplate>>;
    async fn find_template_by_id(&self, id: &str) -> StoreResult<Option<BusTemplate>>;
    async fn create_template(&self, template: &BusTemplate) -> StoreResult<()>;
    async fn update_template(&self, template: &BusTemplate) -> StoreResult<()>;
    async fn delete_template(&self, id: &str) -> StoreResult<()>;

    async fn find_seat_by_id(&self, id: &str) -> StoreResult<Option<BusSeat>>;
    async fn find_seats_by_schedule(&self, schedule_id: &str) -> StoreResult<Vec<BusSeat>>;
    async fn find_seats_by_schedule_and_template(
        &self,
        schedule_id: &str,
        template_id: &str,
    ) -> StoreResult<Vec<BusSeat>>;
    async fn find_seats_by_user(&self, user_id: &str) -> StoreResult<Vec<BusSeat>>;
    async fn find_seat_by_user_and_schedule(
        &self,
        user_id: &str,
        schedule_id: &str,
    ) -> StoreResult<Option<BusSeat>>;
    async fn create_seats(&self, seats: &[BusSeat]) -> StoreResult<()>;
    /// 同一日程中同一用户只能占一个座位，冲突时返回 `StoreError::Duplicate`
    async fn update_seat(&self, seat: &BusSeat) -> StoreResult<()>;
    async fn delete_seats_by_schedule_and_template(
        &self,
        schedule_id: &str,
        template_id: &str,
    ) -> StoreResult<()>;
    async fn delete_seats_by_schedule(&self, schedule_id: &str) -> StoreResult<()>;
    async fn delete_seats_by_template(&self, template_id: &str) -> StoreResult<()>;
}

/// 应用使用的完整存储
pub trait Store: GroupStore + MemberStore + ScheduleStore + AttendanceStore + BusStore {}

impl<T> Store for T where T: GroupStore + MemberStore + ScheduleStore + AttendanceStore + BusStore {}
