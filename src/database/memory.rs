use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    AttendanceStore, BusStore, GroupStore, MemberStore, ScheduleStore, StoreError, StoreResult,
};
use crate::models::{Attendance, BusSeat, BusTemplate, Group, Membership, Schedule};

#[derive(Default)]
struct Tables {
    groups: Vec<Group>,
    members: Vec<Membership>,
    schedules: Vec<Schedule>,
    attendances: Vec<Attendance>,
    templates: Vec<BusTemplate>,
    seats: Vec<BusSeat>,
}

/// 进程内存储，未配置数据库时使用，也用于测试
///
/// 所有读改写都在同一把锁内完成，与数据库的唯一约束语义一致。
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn find_group_by_id(&self, group_id: &str) -> StoreResult<Option<Group>> {
        Ok(self
            .lock()
            .groups
            .iter()
            .find(|g| g.group_id == group_id)
            .cloned())
    }

    async fn find_group_by_invite_code(&self, invite_code: &str) -> StoreResult<Option<Group>> {
        Ok(self
            .lock()
            .groups
            .iter()
            .find(|g| g.invite_code == invite_code)
            .cloned())
    }

    async fn find_public_groups(&self) -> StoreResult<Vec<Group>> {
        Ok(self
            .lock()
            .groups
            .iter()
            .filter(|g| g.is_public)
            .cloned()
            .collect())
    }

    async fn find_groups_by_keyword(&self, keyword: &str) -> StoreResult<Vec<Group>> {
        let keyword = keyword.to_lowercase();
        Ok(self
            .lock()
            .groups
            .iter()
            .filter(|g| {
                g.is_public
                    && (g.group_name.to_lowercase().contains(&keyword)
                        || g.description.to_lowercase().contains(&keyword))
            })
            .cloned()
            .collect())
    }

    async fn create_group_with_admin(&self, group: &Group, admin: &Membership) -> StoreResult<()> {
        let mut tables = self.lock();
        if tables.groups.iter().any(|g| g.group_id == group.group_id) {
            return Err(StoreError::Duplicate(group.group_id.clone()));
        }
        if tables
            .members
            .iter()
            .any(|m| m.user_id == admin.user_id && m.group_id == admin.group_id)
        {
            return Err(StoreError::Duplicate(format!(
                "{}:{}",
                admin.user_id, admin.group_id
            )));
        }
        tables.groups.push(group.clone());
        tables.members.push(admin.clone());
        Ok(())
    }

    async fn update_group(&self, group: &Group) -> StoreResult<()> {
        let mut tables = self.lock();
        if let Some(existing) = tables
            .groups
            .iter_mut()
            .find(|g| g.group_id == group.group_id)
        {
            *existing = group.clone();
        }
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> StoreResult<()> {
        self.lock().groups.retain(|g| g.group_id != group_id);
        Ok(())
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn find_member(&self, user_id: &str, group_id: &str) -> StoreResult<Option<Membership>> {
        Ok(self
            .lock()
            .members
            .iter()
            .find(|m| m.user_id == user_id && m.group_id == group_id)
            .cloned())
    }

    async fn find_members_by_group(&self, group_id: &str) -> StoreResult<Vec<Membership>> {
        Ok(self
            .lock()
            .members
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn find_members_by_user(&self, user_id: &str) -> StoreResult<Vec<Membership>> {
        Ok(self
            .lock()
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_admins_by_group(&self, group_id: &str) -> StoreResult<Vec<Membership>> {
        Ok(self
            .lock()
            .members
            .iter()
            .filter(|m| m.group_id == group_id && m.is_admin)
            .cloned()
            .collect())
    }

    async fn create_member(&self, member: &Membership) -> StoreResult<()> {
        let mut tables = self.lock();
        if tables
            .members
            .iter()
            .any(|m| m.user_id == member.user_id && m.group_id == member.group_id)
        {
            return Err(StoreError::Duplicate(format!(
                "{}:{}",
                member.user_id, member.group_id
            )));
        }
        tables.members.push(member.clone());
        Ok(())
    }

    async fn update_member(&self, member: &Membership) -> StoreResult<bool> {
        let mut tables = self.lock();
        match tables
            .members
            .iter_mut()
            .find(|m| m.user_id == member.user_id && m.group_id == member.group_id)
        {
            Some(existing) => {
                existing.is_admin = member.is_admin;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_member(&self, user_id: &str, group_id: &str) -> StoreResult<()> {
        self.lock()
            .members
            .retain(|m| !(m.user_id == user_id && m.group_id == group_id));
        Ok(())
    }

    async fn delete_member_keeping_admin(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> StoreResult<bool> {
        let mut tables = self.lock();
        let Some(target) = tables
            .members
            .iter()
            .find(|m| m.user_id == user_id && m.group_id == group_id)
        else {
            return Ok(true);
        };
        if target.is_admin {
            let admins = tables
                .members
                .iter()
                .filter(|m| m.group_id == group_id && m.is_admin)
                .count();
            if admins <= 1 {
                return Ok(false);
            }
        }
        tables
            .members
            .retain(|m| !(m.user_id == user_id && m.group_id == group_id));
        Ok(true)
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn find_schedule_by_id(&self, schedule_id: &str) -> StoreResult<Option<Schedule>> {
        Ok(self
            .lock()
            .schedules
            .iter()
            .find(|s| s.schedule_id == schedule_id)
            .cloned())
    }

    async fn find_schedules_by_group(&self, group_id: &str) -> StoreResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self
            .lock()
            .schedules
            .iter()
            .filter(|s| s.group_id == group_id)
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.schedule_time);
        Ok(schedules)
    }

    async fn create_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        self.lock().schedules.push(schedule.clone());
        Ok(())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        let mut tables = self.lock();
        if let Some(existing) = tables
            .schedules
            .iter_mut()
            .find(|s| s.schedule_id == schedule.schedule_id)
        {
            *existing = schedule.clone();
        }
        Ok(())
    }

    async fn delete_schedule(&self, schedule_id: &str) -> StoreResult<()> {
        self.lock().schedules.retain(|s| s.schedule_id != schedule_id);
        Ok(())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_attendance(
        &self,
        schedule_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<Attendance>> {
        Ok(self
            .lock()
            .attendances
            .iter()
            .find(|a| a.schedule_id == schedule_id && a.user_id == user_id)
            .cloned())
    }

    async fn find_attendances_by_schedule(
        &self,
        schedule_id: &str,
    ) -> StoreResult<Vec<Attendance>> {
        Ok(self
            .lock()
            .attendances
            .iter()
            .filter(|a| a.schedule_id == schedule_id)
            .cloned()
            .collect())
    }

    async fn find_attendances_by_user(&self, user_id: &str) -> StoreResult<Vec<Attendance>> {
        Ok(self
            .lock()
            .attendances
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_attendance(&self, attendance: &Attendance) -> StoreResult<Attendance> {
        let mut tables = self.lock();
        if let Some(existing) = tables.attendances.iter_mut().find(|a| {
            a.schedule_id == attendance.schedule_id && a.user_id == attendance.user_id
        }) {
            existing.distance_from_location = attendance.distance_from_location;
            existing.attendance_time = attendance.attendance_time;
            existing.status = attendance.status;
            return Ok(existing.clone());
        }
        tables.attendances.push(attendance.clone());
        Ok(attendance.clone())
    }

    async fn delete_attendances_by_schedule(&self, schedule_id: &str) -> StoreResult<()> {
        self.lock()
            .attendances
            .retain(|a| a.schedule_id != schedule_id);
        Ok(())
    }
}

#[async_trait]
impl BusStore for MemoryStore {
    async fn find_templates(&self) -> StoreResult<Vec<BusTemplate>> {
        Ok(self.lock().templates.clone())
    }

    async fn find_template_by_id(&self, id: &str) -> StoreResult<Option<BusTemplate>> {
        Ok(self.lock().templates.iter().find(|t| t.id == id).cloned())
    }

    async fn create_template(&self, template: &BusTemplate) -> StoreResult<()> {
        self.lock().templates.push(template.clone());
        Ok(())
    }

    async fn update_template(&self, template: &BusTemplate) -> StoreResult<()> {
        let mut tables = self.lock();
        if let Some(existing) = tables.templates.iter_mut().find(|t| t.id == template.id) {
            *existing = template.clone();
        }
        Ok(())
    }

    async fn delete_template(&self, id: &str) -> StoreResult<()> {
        self.lock().templates.retain(|t| t.id != id);
        Ok(())
    }

    async fn find_seat_by_id(&self, id: &str) -> StoreResult<Option<BusSeat>> {
        Ok(self.lock().seats.iter().find(|s| s.id == id).cloned())
    }

    async fn find_seats_by_schedule(&self, schedule_id: &str) -> StoreResult<Vec<BusSeat>> {
        Ok(self
            .lock()
            .seats
            .iter()
            .filter(|s| s.schedule_id.as_deref() == Some(schedule_id))
            .cloned()
            .collect())
    }

    async fn find_seats_by_schedule_and_template(
        &self,
        schedule_id: &str,
        template_id: &str,
    ) -> StoreResult<Vec<BusSeat>> {
        Ok(self
            .lock()
            .seats
            .iter()
            .filter(|s| {
                s.schedule_id.as_deref() == Some(schedule_id) && s.bus_template_id == template_id
            })
            .cloned()
            .collect())
    }

    async fn find_seats_by_user(&self, user_id: &str) -> StoreResult<Vec<BusSeat>> {
        Ok(self
            .lock()
            .seats
            .iter()
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn find_seat_by_user_and_schedule(
        &self,
        user_id: &str,
        schedule_id: &str,
    ) -> StoreResult<Option<BusSeat>> {
        Ok(self
            .lock()
            .seats
            .iter()
            .find(|s| {
                s.user_id.as_deref() == Some(user_id) && s.schedule_id.as_deref() == Some(schedule_id)
            })
            .cloned())
    }

    async fn create_seats(&self, seats: &[BusSeat]) -> StoreResult<()> {
        self.lock().seats.extend_from_slice(seats);
        Ok(())
    }

    async fn update_seat(&self, seat: &BusSeat) -> StoreResult<()> {
        let mut tables = self.lock();
        if let (Some(user_id), Some(schedule_id)) = (&seat.user_id, &seat.schedule_id) {
            let taken = tables.seats.iter().any(|s| {
                s.id != seat.id
                    && s.user_id.as_ref() == Some(user_id)
                    && s.schedule_id.as_ref() == Some(schedule_id)
            });
            if taken {
                return Err(StoreError::Duplicate(format!("{}:{}", user_id, schedule_id)));
            }
        }
        if let Some(existing) = tables.seats.iter_mut().find(|s| s.id == seat.id) {
            *existing = seat.clone();
        }
        Ok(())
    }

    async fn delete_seats_by_schedule_and_template(
        &self,
        schedule_id: &str,
        template_id: &str,
    ) -> StoreResult<()> {
        self.lock().seats.retain(|s| {
            !(s.schedule_id.as_deref() == Some(schedule_id) && s.bus_template_id == template_id)
        });
        Ok(())
    }

    async fn delete_seats_by_schedule(&self, schedule_id: &str) -> StoreResult<()> {
        self.lock()
            .seats
            .retain(|s| s.schedule_id.as_deref() != Some(schedule_id));
        Ok(())
    }

    async fn delete_seats_by_template(&self, template_id: &str) -> StoreResult<()> {
        self.lock().seats.retain(|s| s.bus_template_id != template_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn group(group_id: &str) -> Group {
        Group {
            group_id: group_id.into(),
            group_name: "Trip".into(),
            is_public: false,
            invite_code: "12345678".into(),
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    fn member(user_id: &str, group_id: &str, is_admin: bool) -> Membership {
        Membership {
            user_id: user_id.into(),
            group_id: group_id.into(),
            is_admin,
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn group_is_not_created_when_admin_insert_fails() {
        let store = MemoryStore::new();
        store.create_member(&member("u1", "g1", false)).await.unwrap();

        let err = store
            .create_group_with_admin(&group("g1"), &member("u1", "g1", true))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(store.find_group_by_id("g1").await.unwrap().is_none());
        assert!(!store.find_member("u1", "g1").await.unwrap().unwrap().is_admin);
    }

    #[tokio::test]
    async fn sole_admin_row_is_kept() {
        let store = MemoryStore::new();
        store
            .create_group_with_admin(&group("g1"), &member("u1", "g1", true))
            .await
            .unwrap();
        store.create_member(&member("u2", "g1", false)).await.unwrap();

        assert!(!store.delete_member_keeping_admin("u1", "g1").await.unwrap());
        assert!(store.find_member("u1", "g1").await.unwrap().is_some());

        assert!(store.delete_member_keeping_admin("u2", "g1").await.unwrap());
        assert!(store.find_member("u2", "g1").await.unwrap().is_none());
    }
}
