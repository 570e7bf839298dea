use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::{AttendanceStore, MemberStore, ScheduleStore};
use crate::error::{AppError, AppResult};
use crate::models::{Attendance, AttendanceStatus, Membership, Schedule};

#[derive(Debug, Deserialize)]
pub struct CheckAttendanceRequest {
    pub schedule_id: String,
    /// 与集合地点的距离（米）
    pub distance: f64,
}

/// 签到状态只看时间：超过集合时间加宽限期记为迟到，恰好等于宽限期仍算准时
pub fn derive_status(
    schedule_time: DateTime<Utc>,
    now: DateTime<Utc>,
    late_threshold: Duration,
) -> AttendanceStatus {
    // 截止时间超出可表示范围时不可能迟到
    match schedule_time.checked_add_signed(late_threshold) {
        Some(deadline) if now > deadline => AttendanceStatus::Late,
        _ => AttendanceStatus::Ok,
    }
}

impl Attendance {
    /// 签到，同一日程同一用户重复签到会覆盖上一次的距离、时间和状态
    pub async fn check<S>(
        store: &S,
        schedule_id: &str,
        user_id: &str,
        distance: f64,
        now: DateTime<Utc>,
        late_threshold: Duration,
    ) -> AppResult<Self>
    where
        S: ScheduleStore + AttendanceStore + ?Sized,
    {
        if !distance.is_finite() || distance < 0.0 {
            return Err(AppError::bad_request("Distance must be a non-negative number"));
        }

        let schedule = Schedule::find_by_id(store, schedule_id).await?;
        let status = derive_status(schedule.schedule_time, now, late_threshold);

        let attendance = store
            .upsert_attendance(&Attendance {
                attendance_id: Uuid::new_v4().to_string(),
                schedule_id: schedule_id.to_string(),
                user_id: user_id.to_string(),
                distance_from_location: distance,
                attendance_time: now,
                status,
            })
            .await?;

        tracing::info!(
            "User {} checked in to schedule {} as {} ({:.1}m)",
            user_id,
            schedule_id,
            status,
            distance
        );
        Ok(attendance)
    }

    /// 出席（准时或迟到）且不是群组管理员的人数
    pub async fn non_admin_count<S>(store: &S, schedule_id: &str) -> AppResult<usize>
    where
        S: ScheduleStore + AttendanceStore + MemberStore + ?Sized,
    {
        let schedule = Schedule::find_by_id(store, schedule_id).await?;

        let mut count = 0;
        for attendance in store.find_attendances_by_schedule(schedule_id).await? {
            if !attendance.status.is_present() {
                continue;
            }
            if !Membership::is_group_admin(store, &attendance.user_id, &schedule.group_id).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// 只要有记录就算，不看状态
    pub async fn is_user_attended<S>(store: &S, user_id: &str, schedule_id: &str) -> AppResult<bool>
    where
        S: AttendanceStore + ?Sized,
    {
        Ok(store.find_attendance(schedule_id, user_id).await?.is_some())
    }

    pub async fn find_by_schedule<S>(store: &S, schedule_id: &str) -> AppResult<Vec<Self>>
    where
        S: ScheduleStore + AttendanceStore + ?Sized,
    {
        Schedule::find_by_id(store, schedule_id).await?;
        Ok(store.find_attendances_by_schedule(schedule_id).await?)
    }

    pub async fn find_by_user<S>(store: &S, user_id: &str) -> AppResult<Vec<Self>>
    where
        S: AttendanceStore + ?Sized,
    {
        Ok(store.find_attendances_by_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::models::Group;
    use crate::routes::group::model::CreateGroupRequest;
    use crate::routes::schedule::model::CreateScheduleRequest;
    use chrono::TimeZone;

    fn threshold() -> Duration {
        Duration::minutes(10)
    }

    async fn setup(start: DateTime<Utc>) -> (MemoryStore, Group, Schedule) {
        let store = MemoryStore::new();
        let group = Group::create(
            &store,
            CreateGroupRequest {
                group_name: "Field trip".into(),
                is_public: false,
                description: None,
            },
            "admin",
            start,
        )
        .await
        .unwrap();
        let schedule = Schedule::create(
            &store,
            CreateScheduleRequest {
                group_id: group.group_id.clone(),
                schedule_name: "Museum".into(),
                location: None,
                schedule_time: start,
                detail_location: None,
                detail_location2: None,
                location_range: Some("100".into()),
            },
            "admin",
        )
        .await
        .unwrap();
        (store, group, schedule)
    }

    #[test]
    fn status_boundaries() {
        let start = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
        let at = |mins| start + Duration::minutes(mins);

        assert_eq!(derive_status(start, at(-5), threshold()), AttendanceStatus::Ok);
        assert_eq!(derive_status(start, at(9), threshold()), AttendanceStatus::Ok);
        assert_eq!(derive_status(start, at(10), threshold()), AttendanceStatus::Ok);
        assert_eq!(derive_status(start, at(11), threshold()), AttendanceStatus::Late);
        assert_eq!(
            derive_status(start, at(10) + Duration::seconds(1), threshold()),
            AttendanceStatus::Late
        );
    }

    #[test]
    fn far_future_schedule_is_never_late() {
        let far: DateTime<Utc> = serde_json::from_str("\"+262142-12-31T23:59:59Z\"").unwrap();
        assert_eq!(derive_status(far, Utc::now(), threshold()), AttendanceStatus::Ok);
        assert_eq!(
            derive_status(DateTime::<Utc>::MAX_UTC, DateTime::<Utc>::MAX_UTC, threshold()),
            AttendanceStatus::Ok
        );
    }

    #[tokio::test]
    async fn distance_does_not_decide_status() {
        let start = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
        let (store, _, schedule) = setup(start).await;

        let far = Attendance::check(&store, &schedule.schedule_id, "u2", 5000.0, start, threshold())
            .await
            .unwrap();
        assert_eq!(far.status, AttendanceStatus::Ok);
        assert_eq!(far.distance_from_location, 5000.0);
    }

    #[tokio::test]
    async fn repeated_check_in_overwrites_single_row() {
        let start = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
        let (store, _, schedule) = setup(start).await;

        let first = Attendance::check(
            &store,
            &schedule.schedule_id,
            "u2",
            30.0,
            start + Duration::minutes(9),
            threshold(),
        )
        .await
        .unwrap();
        assert_eq!(first.status, AttendanceStatus::Ok);

        let second_time = start + Duration::minutes(11);
        let second = Attendance::check(&store, &schedule.schedule_id, "u2", 12.5, second_time, threshold())
            .await
            .unwrap();

        assert_eq!(second.attendance_id, first.attendance_id);
        assert_eq!(second.status, AttendanceStatus::Late);
        assert_eq!(second.attendance_time, second_time);
        assert_eq!(second.distance_from_location, 12.5);

        let rows = store
            .find_attendances_by_schedule(&schedule.schedule_id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], second);
    }

    #[tokio::test]
    async fn check_in_to_missing_schedule_is_not_found() {
        let store = MemoryStore::new();
        let err = Attendance::check(&store, "missing", "u1", 1.0, Utc::now(), threshold())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn negative_distance_is_rejected() {
        let start = Utc::now();
        let (store, _, schedule) = setup(start).await;
        let err = Attendance::check(&store, &schedule.schedule_id, "u2", -1.0, start, threshold())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn non_admin_count_excludes_admins_and_absentees() {
        let start = Utc::now();
        let (store, group, schedule) = setup(start).await;
        for user in ["u2", "u3"] {
            Membership::join(&store, user, &group.group_id, Some(&group.invite_code), start)
                .await
                .unwrap();
        }

        Attendance::check(&store, &schedule.schedule_id, "admin", 3.0, start, threshold())
            .await
            .unwrap();
        Attendance::check(&store, &schedule.schedule_id, "u2", 3.0, start, threshold())
            .await
            .unwrap();

        // u3 只有缺席记录
        store
            .upsert_attendance(&Attendance {
                attendance_id: "absent-row".into(),
                schedule_id: schedule.schedule_id.clone(),
                user_id: "u3".into(),
                distance_from_location: 0.0,
                attendance_time: start,
                status: AttendanceStatus::Absent,
            })
            .await
            .unwrap();

        let count = Attendance::non_admin_count(&store, &schedule.schedule_id)
            .await
            .unwrap();
        assert_eq!(count, 1);

        assert!(Attendance::is_user_attended(&store, "u3", &schedule.schedule_id).await.unwrap());
        assert!(!Attendance::is_user_attended(&store, "u9", &schedule.schedule_id).await.unwrap());
    }
}
