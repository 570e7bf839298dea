use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::{
    AttendanceStore, BusStore, GroupStore, MemberStore, ScheduleStore, StoreError, StoreResult,
};
use crate::models::{Attendance, BusSeat, BusTemplate, Group, Membership, Schedule};

const GROUP_COLUMNS: &str = "group_id, group_name, is_public, invite_code, description, created_at";
const MEMBER_COLUMNS: &str = "user_id, group_id, is_admin, joined_at";
const SCHEDULE_COLUMNS: &str = "schedule_id, group_id, schedule_name, location, detail_location, \
     detail_location2, location_range, schedule_time";
const ATTENDANCE_COLUMNS: &str =
    "attendance_id, schedule_id, user_id, distance_from_location, attendance_time, status";
const TEMPLATE_COLUMNS: &str = "id, name, rows, seats_per_row, total_seats, has_aisle, description";
const SEAT_COLUMNS: &str = "id, seat_number, seat_label, row_position, column_position, \
     bus_template_id, schedule_id, user_id, status";

/// Postgres 存储
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// 唯一约束冲突转换为 `StoreError::Duplicate`
fn map_unique(e: sqlx::Error, key: String) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return StoreError::Duplicate(key);
        }
    }
    StoreError::Database(e)
}

#[derive(FromRow)]
struct AttendanceRow {
    attendance_id: String,
    schedule_id: String,
    user_id: String,
    distance_from_location: f64,
    attendance_time: DateTime<Utc>,
    status: String,
}

impl TryFrom<AttendanceRow> for Attendance {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(Attendance {
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            attendance_id: row.attendance_id,
            schedule_id: row.schedule_id,
            user_id: row.user_id,
            distance_from_location: row.distance_from_location,
            attendance_time: row.attendance_time,
        })
    }
}

#[derive(FromRow)]
struct SeatRow {
    id: String,
    seat_number: i32,
    seat_label: String,
    row_position: i32,
    column_position: i32,
    bus_template_id: String,
    schedule_id: Option<String>,
    user_id: Option<String>,
    status: String,
}

impl TryFrom<SeatRow> for BusSeat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(BusSeat {
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            id: row.id,
            seat_number: row.seat_number,
            seat_label: row.seat_label,
            row_position: row.row_position,
            column_position: row.column_position,
            bus_template_id: row.bus_template_id,
            schedule_id: row.schedule_id,
            user_id: row.user_id,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl GroupStore for PgStore {
    async fn find_group_by_id(&self, group_id: &str) -> StoreResult<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM groups WHERE group_id = $1",
            GROUP_COLUMNS
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn find_group_by_invite_code(&self, invite_code: &str) -> StoreResult<Option<Group>> {
        // 邀请码不唯一，取最早创建的一个
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM groups WHERE invite_code = $1 ORDER BY created_at LIMIT 1",
            GROUP_COLUMNS
        ))
        .bind(invite_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn find_public_groups(&self) -> StoreResult<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(&format!(
            "SELECT {} FROM groups WHERE is_public ORDER BY created_at DESC",
            GROUP_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }

    async fn find_groups_by_keyword(&self, keyword: &str) -> StoreResult<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(&format!(
            r#"
            SELECT {} FROM groups
            WHERE is_public AND (group_name ILIKE $1 OR description ILIKE $1)
            "#,
            GROUP_COLUMNS
        ))
        .bind(format!("%{}%", keyword))
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }

    async fn create_group_with_admin(&self, group: &Group, admin: &Membership) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO groups (group_id, group_name, is_public, invite_code, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&group.group_id)
        .bind(&group.group_name)
        .bind(group.is_public)
        .bind(&group.invite_code)
        .bind(&group.description)
        .bind(group.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, group.group_id.clone()))?;

        sqlx::query(
            r#"
            INSERT INTO group_members (user_id, group_id, is_admin, joined_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&admin.user_id)
        .bind(&admin.group_id)
        .bind(admin.is_admin)
        .bind(admin.joined_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, format!("{}:{}", admin.user_id, admin.group_id)))?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_group(&self, group: &Group) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE groups
            SET group_name = $2, is_public = $3, invite_code = $4, description = $5
            WHERE group_id = $1
            "#,
        )
        .bind(&group.group_id)
        .bind(&group.group_name)
        .bind(group.is_public)
        .bind(&group.invite_code)
        .bind(&group.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM groups WHERE group_id = $1")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MemberStore for PgStore {
    async fn find_member(&self, user_id: &str, group_id: &str) -> StoreResult<Option<Membership>> {
        let member = sqlx::query_as::<_, Membership>(&format!(
            "SELECT {} FROM group_members WHERE user_id = $1 AND group_id = $2",
            MEMBER_COLUMNS
        ))
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    async fn find_members_by_group(&self, group_id: &str) -> StoreResult<Vec<Membership>> {
        let members = sqlx::query_as::<_, Membership>(&format!(
            "SELECT {} FROM group_members WHERE group_id = $1 ORDER BY joined_at",
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn find_members_by_user(&self, user_id: &str) -> StoreResult<Vec<Membership>> {
        let members = sqlx::query_as::<_, Membership>(&format!(
            "SELECT {} FROM group_members WHERE user_id = $1 ORDER BY joined_at",
            MEMBER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn find_admins_by_group(&self, group_id: &str) -> StoreResult<Vec<Membership>> {
        let members = sqlx::query_as::<_, Membership>(&format!(
            "SELECT {} FROM group_members WHERE group_id = $1 AND is_admin",
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn create_member(&self, member: &Membership) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO group_members (user_id, group_id, is_admin, joined_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&member.user_id)
        .bind(&member.group_id)
        .bind(member.is_admin)
        .bind(member.joined_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, format!("{}:{}", member.user_id, member.group_id)))?;
        Ok(())
    }

    async fn update_member(&self, member: &Membership) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE group_members SET is_admin = $3 WHERE user_id = $1 AND group_id = $2",
        )
        .bind(&member.user_id)
        .bind(&member.group_id)
        .bind(member.is_admin)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_member(&self, user_id: &str, group_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM group_members WHERE user_id = $1 AND group_id = $2")
            .bind(user_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_member_keeping_admin(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        // 锁住该群组的管理员行，并发退出时串行判断
        let admins: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM group_members WHERE group_id = $1 AND is_admin FOR UPDATE",
        )
        .bind(group_id)
        .fetch_all(&mut *tx)
        .await?;

        if admins.len() <= 1 && admins.iter().any(|a| a == user_id) {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM group_members WHERE user_id = $1 AND group_id = $2")
            .bind(user_id)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn find_schedule_by_id(&self, schedule_id: &str) -> StoreResult<Option<Schedule>> {
        let schedule = sqlx::query_as::<_, Schedule>(&format!(
            "SELECT {} FROM schedules WHERE schedule_id = $1",
            SCHEDULE_COLUMNS
        ))
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(schedule)
    }

    async fn find_schedules_by_group(&self, group_id: &str) -> StoreResult<Vec<Schedule>> {
        let schedules = sqlx::query_as::<_, Schedule>(&format!(
            "SELECT {} FROM schedules WHERE group_id = $1 ORDER BY schedule_time",
            SCHEDULE_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(schedules)
    }

    async fn create_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schedules (
                schedule_id, group_id, schedule_name, location, detail_location,
                detail_location2, location_range, schedule_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&schedule.schedule_id)
        .bind(&schedule.group_id)
        .bind(&schedule.schedule_name)
        .bind(&schedule.location)
        .bind(&schedule.detail_location)
        .bind(&schedule.detail_location2)
        .bind(&schedule.location_range)
        .bind(schedule.schedule_time)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, schedule.schedule_id.clone()))?;
        Ok(())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE schedules
            SET schedule_name = $2, location = $3, detail_location = $4,
                detail_location2 = $5, location_range = $6, schedule_time = $7
            WHERE schedule_id = $1
            "#,
        )
        .bind(&schedule.schedule_id)
        .bind(&schedule.schedule_name)
        .bind(&schedule.location)
        .bind(&schedule.detail_location)
        .bind(&schedule.detail_location2)
        .bind(&schedule.location_range)
        .bind(schedule.schedule_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_schedule(&self, schedule_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM schedules WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn find_attendance(
        &self,
        schedule_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<Attendance>> {
        let row = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {} FROM attendances WHERE schedule_id = $1 AND user_id = $2",
            ATTENDANCE_COLUMNS
        ))
        .bind(schedule_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attendance::try_from).transpose()
    }

    async fn find_attendances_by_schedule(
        &self,
        schedule_id: &str,
    ) -> StoreResult<Vec<Attendance>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {} FROM attendances WHERE schedule_id = $1 ORDER BY attendance_time",
            ATTENDANCE_COLUMNS
        ))
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn find_attendances_by_user(&self, user_id: &str) -> StoreResult<Vec<Attendance>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {} FROM attendances WHERE user_id = $1 ORDER BY attendance_time DESC",
            ATTENDANCE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn upsert_attendance(&self, attendance: &Attendance) -> StoreResult<Attendance> {
        // 并发签到依赖 (schedule_id, user_id) 唯一约束，由数据库完成插入或更新
        let row = sqlx::query_as::<_, AttendanceRow>(&format!(
            r#"
            INSERT INTO attendances (
                attendance_id, schedule_id, user_id, distance_from_location, attendance_time, status
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (schedule_id, user_id) DO UPDATE
            SET distance_from_location = EXCLUDED.distance_from_location,
                attendance_time = EXCLUDED.attendance_time,
                status = EXCLUDED.status
            RETURNING {}
            "#,
            ATTENDANCE_COLUMNS
        ))
        .bind(&attendance.attendance_id)
        .bind(&attendance.schedule_id)
        .bind(&attendance.user_id)
        .bind(attendance.distance_from_location)
        .bind(attendance.attendance_time)
        .bind(attendance.status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Attendance::try_from(row)
    }

    async fn delete_attendances_by_schedule(&self, schedule_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM attendances WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BusStore for PgStore {
    async fn find_templates(&self) -> StoreResult<Vec<BusTemplate>> {
        let templates = sqlx::query_as::<_, BusTemplate>(&format!(
            "SELECT {} FROM bus_templates ORDER BY name",
            TEMPLATE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    async fn find_template_by_id(&self, id: &str) -> StoreResult<Option<BusTemplate>> {
        let template = sqlx::query_as::<_, BusTemplate>(&format!(
            "SELECT {} FROM bus_templates WHERE id = $1",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    async fn create_template(&self, template: &BusTemplate) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bus_templates (id, name, rows, seats_per_row, total_seats, has_aisle, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(template.rows)
        .bind(template.seats_per_row)
        .bind(template.total_seats)
        .bind(template.has_aisle)
        .bind(&template.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_template(&self, template: &BusTemplate) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE bus_templates
            SET name = $2, rows = $3, seats_per_row = $4, total_seats = $5,
                has_aisle = $6, description = $7
            WHERE id = $1
            "#,
        )
        .bind(&template.id)
        .bind(&template.name)
        .bind(template.rows)
        .bind(template.seats_per_row)
        .bind(template.total_seats)
        .bind(template.has_aisle)
        .bind(&template.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_template(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM bus_templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_seat_by_id(&self, id: &str) -> StoreResult<Option<BusSeat>> {
        let row = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM bus_seats WHERE id = $1",
            SEAT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(BusSeat::try_from).transpose()
    }

    async fn find_seats_by_schedule(&self, schedule_id: &str) -> StoreResult<Vec<BusSeat>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM bus_seats WHERE schedule_id = $1 ORDER BY seat_number",
            SEAT_COLUMNS
        ))
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn find_seats_by_schedule_and_template(
        &self,
        schedule_id: &str,
        template_id: &str,
    ) -> StoreResult<Vec<BusSeat>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            r#"
            SELECT {} FROM bus_seats
            WHERE schedule_id = $1 AND bus_template_id = $2
            ORDER BY seat_number
            "#,
            SEAT_COLUMNS
        ))
        .bind(schedule_id)
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn find_seats_by_user(&self, user_id: &str) -> StoreResult<Vec<BusSeat>> {
        let rows = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM bus_seats WHERE user_id = $1",
            SEAT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn find_seat_by_user_and_schedule(
        &self,
        user_id: &str,
        schedule_id: &str,
    ) -> StoreResult<Option<BusSeat>> {
        let row = sqlx::query_as::<_, SeatRow>(&format!(
            "SELECT {} FROM bus_seats WHERE user_id = $1 AND schedule_id = $2",
            SEAT_COLUMNS
        ))
        .bind(user_id)
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(BusSeat::try_from).transpose()
    }

    async fn create_seats(&self, seats: &[BusSeat]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for seat in seats {
            sqlx::query(
                r#"
                INSERT INTO bus_seats (
                    id, seat_number, seat_label, row_position, column_position,
                    bus_template_id, schedule_id, user_id, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&seat.id)
            .bind(seat.seat_number)
            .bind(&seat.seat_label)
            .bind(seat.row_position)
            .bind(seat.column_position)
            .bind(&seat.bus_template_id)
            .bind(&seat.schedule_id)
            .bind(&seat.user_id)
            .bind(seat.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_seat(&self, seat: &BusSeat) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE bus_seats
            SET seat_number = $2, seat_label = $3, row_position = $4, column_position = $5,
                bus_template_id = $6, schedule_id = $7, user_id = $8, status = $9
            WHERE id = $1
            "#,
        )
        .bind(&seat.id)
        .bind(seat.seat_number)
        .bind(&seat.seat_label)
        .bind(seat.row_position)
        .bind(seat.column_position)
        .bind(&seat.bus_template_id)
        .bind(&seat.schedule_id)
        .bind(&seat.user_id)
        .bind(seat.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, seat.id.clone()))?;
        Ok(())
    }

    async fn delete_seats_by_schedule_and_template(
        &self,
        schedule_id: &str,
        template_id: &str,
    ) -> StoreResult<()> {
        sqlx::query("DELETE FROM bus_seats WHERE schedule_id = $1 AND bus_template_id = $2")
            .bind(schedule_id)
            .bind(template_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_seats_by_schedule(&self, schedule_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM bus_seats WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_seats_by_template(&self, template_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM bus_seats WHERE bus_template_id = $1")
            .bind(template_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
