use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{AttendanceStore, BusStore, GroupStore, MemberStore, ScheduleStore};
use crate::error::{AppError, AppResult};
use crate::models::{Attendance, Group, Membership, Schedule};

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub group_id: String,
    pub schedule_name: String,
    pub location: Option<String>,
    pub schedule_time: DateTime<Utc>,
    pub detail_location: Option<String>,
    pub detail_location2: Option<String>,
    pub location_range: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateScheduleRequest {
    pub schedule_name: Option<String>,
    pub location: Option<String>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub detail_location: Option<String>,
    pub detail_location2: Option<String>,
    pub location_range: Option<String>,
}

/// 日程加上当前用户相关的标记
#[derive(Debug, Serialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_attended: Option<bool>,
    pub non_admin_attendance_count: usize,
}

impl ScheduleView {
    pub async fn for_user<S>(store: &S, schedule: Schedule, user_id: &str) -> AppResult<Self>
    where
        S: ScheduleStore + AttendanceStore + MemberStore + ?Sized,
    {
        let is_admin = Membership::is_group_admin(store, user_id, &schedule.group_id).await?;
        let is_attended = Attendance::is_user_attended(store, user_id, &schedule.schedule_id).await?;
        let non_admin_attendance_count =
            Attendance::non_admin_count(store, &schedule.schedule_id).await?;
        Ok(Self {
            schedule,
            is_admin: Some(is_admin),
            is_attended: Some(is_attended),
            non_admin_attendance_count,
        })
    }

    pub async fn with_count<S>(store: &S, schedule: Schedule) -> AppResult<Self>
    where
        S: ScheduleStore + AttendanceStore + MemberStore + ?Sized,
    {
        let non_admin_attendance_count =
            Attendance::non_admin_count(store, &schedule.schedule_id).await?;
        Ok(Self {
            schedule,
            is_admin: None,
            is_attended: None,
            non_admin_attendance_count,
        })
    }
}

fn require_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Schedule name cannot be blank"));
    }
    Ok(name.to_string())
}

impl Schedule {
    pub async fn create<S>(store: &S, req: CreateScheduleRequest, acting_user_id: &str) -> AppResult<Self>
    where
        S: GroupStore + MemberStore + ScheduleStore + ?Sized,
    {
        Group::find_by_id(store, &req.group_id).await?;
        Membership::require_group_admin(store, acting_user_id, &req.group_id).await?;

        let schedule = Schedule {
            schedule_id: Uuid::new_v4().to_string(),
            group_id: req.group_id,
            schedule_name: require_name(&req.schedule_name)?,
            location: req.location.unwrap_or_default(),
            detail_location: req.detail_location.unwrap_or_default(),
            detail_location2: req.detail_location2.unwrap_or_default(),
            location_range: req.location_range.unwrap_or_default(),
            schedule_time: req.schedule_time,
        };
        store.create_schedule(&schedule).await?;

        tracing::info!(
            "Schedule {} created in group {} by {}",
            schedule.schedule_id,
            schedule.group_id,
            acting_user_id
        );
        Ok(schedule)
    }

    pub async fn find_by_id<S>(store: &S, schedule_id: &str) -> AppResult<Self>
    where
        S: ScheduleStore + ?Sized,
    {
        store
            .find_schedule_by_id(schedule_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Schedule {} not found", schedule_id)))
    }

    pub async fn find_by_group<S>(store: &S, group_id: &str) -> AppResult<Vec<Self>>
    where
        S: ScheduleStore + ?Sized,
    {
        Ok(store.find_schedules_by_group(group_id).await?)
    }

    /// 用户所在全部群组的日程
    pub async fn find_all_user_schedules<S>(store: &S, user_id: &str) -> AppResult<Vec<Self>>
    where
        S: MemberStore + ScheduleStore + ?Sized,
    {
        let mut schedules = Vec::new();
        for member in store.find_members_by_user(user_id).await? {
            schedules.extend(store.find_schedules_by_group(&member.group_id).await?);
        }
        Ok(schedules)
    }

    pub async fn update<S>(
        store: &S,
        schedule_id: &str,
        req: UpdateScheduleRequest,
        acting_user_id: &str,
    ) -> AppResult<Self>
    where
        S: MemberStore + ScheduleStore + ?Sized,
    {
        let mut schedule = Self::find_by_id(store, schedule_id).await?;
        Membership::require_group_admin(store, acting_user_id, &schedule.group_id).await?;

        if let Some(name) = req.schedule_name {
            schedule.schedule_name = require_name(&name)?;
        }
        if let Some(location) = req.location {
            schedule.location = location;
        }
        if let Some(schedule_time) = req.schedule_time {
            schedule.schedule_time = schedule_time;
        }
        if let Some(detail_location) = req.detail_location {
            schedule.detail_location = detail_location;
        }
        if let Some(detail_location2) = req.detail_location2 {
            schedule.detail_location2 = detail_location2;
        }
        if let Some(location_range) = req.location_range {
            schedule.location_range = location_range;
        }

        store.update_schedule(&schedule).await?;
        Ok(schedule)
    }

    /// 先删签到记录和座位，再删日程；任何一步失败都中止
    pub async fn remove<S>(store: &S, schedule_id: &str, acting_user_id: &str) -> AppResult<()>
    where
        S: MemberStore + ScheduleStore + AttendanceStore + BusStore + ?Sized,
    {
        let schedule = Self::find_by_id(store, schedule_id).await?;
        Membership::require_group_admin(store, acting_user_id, &schedule.group_id).await?;

        store.delete_attendances_by_schedule(schedule_id).await?;
        store.delete_seats_by_schedule(schedule_id).await?;
        store.delete_schedule(schedule_id).await?;

        tracing::info!("Schedule {} removed by {}", schedule_id, acting_user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::routes::group::model::CreateGroupRequest;
    use chrono::Duration;

    async fn group_with_admin(store: &MemoryStore, admin: &str, name: &str) -> Group {
        Group::create(
            store,
            CreateGroupRequest {
                group_name: name.into(),
                is_public: true,
                description: None,
            },
            admin,
            Utc::now(),
        )
        .await
        .unwrap()
    }

    fn request(group_id: &str, name: &str) -> CreateScheduleRequest {
        CreateScheduleRequest {
            group_id: group_id.into(),
            schedule_name: name.into(),
            location: Some("Gyeongbokgung".into()),
            schedule_time: Utc::now() + Duration::hours(1),
            detail_location: None,
            detail_location2: None,
            location_range: Some("50".into()),
        }
    }

    #[tokio::test]
    async fn only_admins_create_schedules() {
        let store = MemoryStore::new();
        let group = group_with_admin(&store, "u1", "Tour").await;
        Membership::join(&store, "u2", &group.group_id, None, Utc::now())
            .await
            .unwrap();

        let err = Schedule::create(&store, request(&group.group_id, "Palace"), "u2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = Schedule::create(&store, request("missing", "Palace"), "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let schedule = Schedule::create(&store, request(&group.group_id, "Palace"), "u1")
            .await
            .unwrap();
        assert_eq!(schedule.location_range, "50");
    }

    #[tokio::test]
    async fn update_changes_start_time() {
        let store = MemoryStore::new();
        let group = group_with_admin(&store, "u1", "Tour").await;
        let schedule = Schedule::create(&store, request(&group.group_id, "Palace"), "u1")
            .await
            .unwrap();
        let new_time = schedule.schedule_time + Duration::minutes(30);

        let updated = Schedule::update(
            &store,
            &schedule.schedule_id,
            UpdateScheduleRequest {
                schedule_time: Some(new_time),
                location: Some(String::new()),
                ..Default::default()
            },
            "u1",
        )
        .await
        .unwrap();

        assert_eq!(updated.schedule_time, new_time);
        assert_eq!(updated.location, "");
        assert_eq!(updated.schedule_name, "Palace");
    }

    #[tokio::test]
    async fn remove_cascades_attendance() {
        let store = MemoryStore::new();
        let group = group_with_admin(&store, "u1", "Tour").await;
        Membership::join(&store, "u2", &group.group_id, None, Utc::now())
            .await
            .unwrap();
        let schedule = Schedule::create(&store, request(&group.group_id, "Palace"), "u1")
            .await
            .unwrap();
        Attendance::check(
            &store,
            &schedule.schedule_id,
            "u2",
            10.0,
            Utc::now(),
            Duration::minutes(10),
        )
        .await
        .unwrap();

        let err = Schedule::remove(&store, &schedule.schedule_id, "u2").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        Schedule::remove(&store, &schedule.schedule_id, "u1").await.unwrap();
        assert!(store.find_schedule_by_id(&schedule.schedule_id).await.unwrap().is_none());
        assert!(
            store
                .find_attendances_by_schedule(&schedule.schedule_id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn user_schedules_span_all_groups() {
        let store = MemoryStore::new();
        let first = group_with_admin(&store, "u1", "First").await;
        let second = group_with_admin(&store, "u2", "Second").await;
        let other = group_with_admin(&store, "u3", "Other").await;
        Membership::join(&store, "u1", &second.group_id, None, Utc::now())
            .await
            .unwrap();

        Schedule::create(&store, request(&first.group_id, "A"), "u1").await.unwrap();
        Schedule::create(&store, request(&second.group_id, "B"), "u2").await.unwrap();
        Schedule::create(&store, request(&other.group_id, "C"), "u3").await.unwrap();

        let mut names: Vec<_> = Schedule::find_all_user_schedules(&store, "u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.schedule_name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn view_flags_reflect_user() {
        let store = MemoryStore::new();
        let group = group_with_admin(&store, "u1", "Tour").await;
        Membership::join(&store, "u2", &group.group_id, None, Utc::now())
            .await
            .unwrap();
        let schedule = Schedule::create(&store, request(&group.group_id, "Palace"), "u1")
            .await
            .unwrap();
        Attendance::check(
            &store,
            &schedule.schedule_id,
            "u2",
            10.0,
            Utc::now(),
            Duration::minutes(10),
        )
        .await
        .unwrap();

        let view = ScheduleView::for_user(&store, schedule.clone(), "u1").await.unwrap();
        assert_eq!(view.is_admin, Some(true));
        assert_eq!(view.is_attended, Some(false));
        assert_eq!(view.non_admin_attendance_count, 1);

        let view = ScheduleView::for_user(&store, schedule, "u2").await.unwrap();
        assert_eq!(view.is_admin, Some(false));
        assert_eq!(view.is_attended, Some(true));
    }
}
