use serde::Deserialize;
use uuid::Uuid;

use crate::database::{BusStore, MemberStore, ScheduleStore, StoreError};
use crate::error::{AppError, AppResult};
use crate::models::{BusSeat, BusTemplate, Membership, Schedule, SeatStatus};

#[derive(Debug, Deserialize)]
pub struct CreateBusTemplateRequest {
    pub name: String,
    pub rows: i32,
    pub seats_per_row: i32,
    pub total_seats: Option<i32>,
    #[serde(default = "default_true")]
    pub has_aisle: bool,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBusTemplateRequest {
    pub name: Option<String>,
    pub rows: Option<i32>,
    pub seats_per_row: Option<i32>,
    pub total_seats: Option<i32>,
    pub has_aisle: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateSeatsRequest {
    pub bus_template_id: String,
    pub schedule_id: String,
    pub rows: i32,
    pub seats_per_row: i32,
    pub has_aisle: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssignSeatRequest {
    pub user_id: String,
    pub seat_id: String,
    pub bus_template_id: String,
}

fn default_true() -> bool {
    true
}

/// 单个模板允许的最大排数和每排座位数
pub const MAX_ROWS: i32 = 100;
pub const MAX_SEATS_PER_ROW: i32 = 100;

/// 过道列为每排中间一列，每排只有一个座位时不留过道
fn aisle_column(seats_per_row: i32, has_aisle: bool) -> Option<i32> {
    (has_aisle && seats_per_row > 1).then_some(seats_per_row / 2)
}

fn seats_in_row(seats_per_row: i32, has_aisle: bool) -> i32 {
    match aisle_column(seats_per_row, has_aisle) {
        Some(_) => seats_per_row - 1,
        None => seats_per_row,
    }
}

fn validate_layout(rows: i32, seats_per_row: i32) -> AppResult<()> {
    if !(1..=MAX_ROWS).contains(&rows) {
        return Err(AppError::bad_request(format!(
            "rows must be between 1 and {}",
            MAX_ROWS
        )));
    }
    if !(1..=MAX_SEATS_PER_ROW).contains(&seats_per_row) {
        return Err(AppError::bad_request(format!(
            "seats_per_row must be between 1 and {}",
            MAX_SEATS_PER_ROW
        )));
    }
    Ok(())
}

fn layout_capacity(rows: i32, seats_per_row: i32, has_aisle: bool) -> AppResult<i32> {
    rows.checked_mul(seats_in_row(seats_per_row, has_aisle))
        .ok_or_else(|| AppError::bad_request("Bus layout is too large"))
}

/// 生成座位网格，跳过过道列
pub fn seat_grid(
    template_id: &str,
    schedule_id: &str,
    rows: i32,
    seats_per_row: i32,
    has_aisle: bool,
) -> Vec<BusSeat> {
    let mut seats = Vec::new();
    for row in 0..rows {
        for col in 0..seats_per_row {
            if aisle_column(seats_per_row, has_aisle) == Some(col) {
                continue;
            }
            let seat_number = row * seats_per_row + col + 1;
            seats.push(BusSeat {
                id: Uuid::new_v4().to_string(),
                seat_number,
                seat_label: format!("Seat {}", seat_number),
                row_position: row,
                column_position: col,
                bus_template_id: template_id.to_string(),
                schedule_id: Some(schedule_id.to_string()),
                user_id: None,
                status: SeatStatus::Empty,
            });
        }
    }
    seats
}

impl BusTemplate {
    pub async fn create<S>(store: &S, req: CreateBusTemplateRequest) -> AppResult<Self>
    where
        S: BusStore + ?Sized,
    {
        validate_layout(req.rows, req.seats_per_row)?;
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::bad_request("Template name cannot be blank"));
        }

        let total_seats = match req.total_seats {
            Some(total) if total < 0 => {
                return Err(AppError::bad_request("total_seats cannot be negative"));
            }
            Some(total) => total,
            None => layout_capacity(req.rows, req.seats_per_row, req.has_aisle)?,
        };

        let template = BusTemplate {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            rows: req.rows,
            seats_per_row: req.seats_per_row,
            total_seats,
            has_aisle: req.has_aisle,
            description: req.description,
        };
        store.create_template(&template).await?;
        tracing::info!("Bus template {} created", template.id);
        Ok(template)
    }

    pub async fn find_all<S>(store: &S) -> AppResult<Vec<Self>>
    where
        S: BusStore + ?Sized,
    {
        Ok(store.find_templates().await?)
    }

    pub async fn find_by_id<S>(store: &S, id: &str) -> AppResult<Self>
    where
        S: BusStore + ?Sized,
    {
        store
            .find_template_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Bus template {} not found", id)))
    }

    pub async fn update<S>(store: &S, id: &str, req: UpdateBusTemplateRequest) -> AppResult<Self>
    where
        S: BusStore + ?Sized,
    {
        let mut template = Self::find_by_id(store, id).await?;

        if let Some(name) = req.name.filter(|n| !n.trim().is_empty()) {
            template.name = name.trim().to_string();
        }
        if let Some(rows) = req.rows {
            template.rows = rows;
        }
        if let Some(seats_per_row) = req.seats_per_row {
            template.seats_per_row = seats_per_row;
        }
        if let Some(total_seats) = req.total_seats {
            if total_seats < 0 {
                return Err(AppError::bad_request("total_seats cannot be negative"));
            }
            template.total_seats = total_seats;
        }
        if let Some(has_aisle) = req.has_aisle {
            template.has_aisle = has_aisle;
        }
        if req.description.is_some() {
            template.description = req.description;
        }
        validate_layout(template.rows, template.seats_per_row)?;

        store.update_template(&template).await?;
        Ok(template)
    }

    /// 连同该模板的座位一起删除
    pub async fn remove<S>(store: &S, id: &str) -> AppResult<()>
    where
        S: BusStore + ?Sized,
    {
        Self::find_by_id(store, id).await?;
        store.delete_seats_by_template(id).await?;
        store.delete_template(id).await?;
        tracing::info!("Bus template {} removed", id);
        Ok(())
    }
}

/// 日程所属群组的管理员，或者座位涉及的用户本人
async fn require_seat_manager<S>(
    store: &S,
    schedule_id: Option<&str>,
    target_user_id: &str,
    acting_user_id: &str,
) -> AppResult<()>
where
    S: ScheduleStore + MemberStore + ?Sized,
{
    if target_user_id == acting_user_id {
        return Ok(());
    }
    if let Some(schedule_id) = schedule_id {
        let schedule = Schedule::find_by_id(store, schedule_id).await?;
        return Membership::require_group_admin(store, acting_user_id, &schedule.group_id).await;
    }
    Err(AppError::forbidden("Only group admins can manage other users' seats"))
}

impl BusSeat {
    /// 重新生成某日程某模板的全部座位，原有座位被清空
    pub async fn batch_create<S>(
        store: &S,
        req: BatchCreateSeatsRequest,
        acting_user_id: &str,
    ) -> AppResult<Vec<Self>>
    where
        S: BusStore + ScheduleStore + MemberStore + ?Sized,
    {
        validate_layout(req.rows, req.seats_per_row)?;
        BusTemplate::find_by_id(store, &req.bus_template_id).await?;
        let schedule = Schedule::find_by_id(store, &req.schedule_id).await?;
        Membership::require_group_admin(store, acting_user_id, &schedule.group_id).await?;

        store
            .delete_seats_by_schedule_and_template(&req.schedule_id, &req.bus_template_id)
            .await?;

        let seats = seat_grid(
            &req.bus_template_id,
            &req.schedule_id,
            req.rows,
            req.seats_per_row,
            req.has_aisle,
        );
        store.create_seats(&seats).await?;

        tracing::info!(
            "Created {} seats for schedule {} on template {}",
            seats.len(),
            req.schedule_id,
            req.bus_template_id
        );
        Ok(seats)
    }

    pub async fn find_by_id<S>(store: &S, id: &str) -> AppResult<Self>
    where
        S: BusStore + ?Sized,
    {
        store
            .find_seat_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Seat {} not found", id)))
    }

    /// 同一日程中用户原来的座位会被释放
    pub async fn assign<S>(store: &S, req: AssignSeatRequest, acting_user_id: &str) -> AppResult<Self>
    where
        S: BusStore + ScheduleStore + MemberStore + ?Sized,
    {
        let mut seat = Self::find_by_id(store, &req.seat_id).await?;
        require_seat_manager(store, seat.schedule_id.as_deref(), &req.user_id, acting_user_id)
            .await?;

        if seat.bus_template_id != req.bus_template_id {
            return Err(AppError::bad_request("Seat does not belong to this bus template"));
        }

        match seat.user_id.as_deref() {
            Some(holder) if holder == req.user_id => return Ok(seat),
            Some(_) => return Err(AppError::conflict("Seat is already assigned to another user")),
            None => {}
        }

        if let Some(schedule_id) = seat.schedule_id.as_deref() {
            if let Some(mut previous) = store
                .find_seat_by_user_and_schedule(&req.user_id, schedule_id)
                .await?
            {
                previous.user_id = None;
                previous.status = SeatStatus::Empty;
                store.update_seat(&previous).await?;
            }
        }

        seat.user_id = Some(req.user_id.clone());
        seat.status = SeatStatus::Assigned;
        match store.update_seat(&seat).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(AppError::conflict("User already holds a seat for this schedule"));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Seat {} assigned to {}", seat.id, req.user_id);
        Ok(seat)
    }

    pub async fn release<S>(store: &S, seat_id: &str, acting_user_id: &str) -> AppResult<Self>
    where
        S: BusStore + ScheduleStore + MemberStore + ?Sized,
    {
        let mut seat = Self::find_by_id(store, seat_id).await?;
        let Some(holder) = seat.user_id.clone() else {
            return Ok(seat);
        };
        require_seat_manager(store, seat.schedule_id.as_deref(), &holder, acting_user_id).await?;

        seat.user_id = None;
        seat.status = SeatStatus::Empty;
        store.update_seat(&seat).await?;
        tracing::info!("Seat {} released by {}", seat.id, acting_user_id);
        Ok(seat)
    }

    pub async fn find_by_schedule<S>(
        store: &S,
        schedule_id: &str,
        template_id: Option<&str>,
    ) -> AppResult<Vec<Self>>
    where
        S: BusStore + ScheduleStore + ?Sized,
    {
        Schedule::find_by_id(store, schedule_id).await?;
        match template_id {
            Some(template_id) => {
                BusTemplate::find_by_id(store, template_id).await?;
                Ok(store
                    .find_seats_by_schedule_and_template(schedule_id, template_id)
                    .await?)
            }
            None => Ok(store.find_seats_by_schedule(schedule_id).await?),
        }
    }

    pub async fn find_by_user<S>(store: &S, user_id: &str) -> AppResult<Vec<Self>>
    where
        S: BusStore + ?Sized,
    {
        Ok(store.find_seats_by_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::models::Group;
    use crate::routes::group::model::CreateGroupRequest;
    use crate::routes::schedule::model::CreateScheduleRequest;
    use chrono::Utc;

    struct Fixture {
        store: MemoryStore,
        schedule: Schedule,
        template: BusTemplate,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let group = Group::create(
            &store,
            CreateGroupRequest {
                group_name: "Bus trip".into(),
                is_public: true,
                description: None,
            },
            "admin",
            Utc::now(),
        )
        .await
        .unwrap();
        for user in ["u1", "u2"] {
            Membership::join(&store, user, &group.group_id, None, Utc::now())
                .await
                .unwrap();
        }
        let schedule = Schedule::create(
            &store,
            CreateScheduleRequest {
                group_id: group.group_id.clone(),
                schedule_name: "Departure".into(),
                location: None,
                schedule_time: Utc::now(),
                detail_location: None,
                detail_location2: None,
                location_range: None,
            },
            "admin",
        )
        .await
        .unwrap();
        let template = BusTemplate::create(
            &store,
            CreateBusTemplateRequest {
                name: "45-seater".into(),
                rows: 2,
                seats_per_row: 5,
                total_seats: None,
                has_aisle: true,
                description: None,
            },
        )
        .await
        .unwrap();
        Fixture {
            store,
            schedule,
            template,
        }
    }

    async fn seats(f: &Fixture) -> Vec<BusSeat> {
        BusSeat::batch_create(
            &f.store,
            BatchCreateSeatsRequest {
                bus_template_id: f.template.id.clone(),
                schedule_id: f.schedule.schedule_id.clone(),
                rows: 2,
                seats_per_row: 5,
                has_aisle: true,
            },
            "admin",
        )
        .await
        .unwrap()
    }

    #[test]
    fn grid_skips_aisle_column() {
        let grid = seat_grid("t", "s", 2, 5, true);
        assert_eq!(grid.len(), 8);
        assert!(grid.iter().all(|s| s.column_position != 2));
        let numbers: Vec<_> = grid.iter().map(|s| s.seat_number).collect();
        assert_eq!(numbers, vec![1, 2, 4, 5, 6, 7, 9, 10]);
        assert_eq!(grid[0].seat_label, "Seat 1");
    }

    #[test]
    fn single_seat_rows_have_no_aisle() {
        let grid = seat_grid("t", "s", 3, 1, true);
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.len() as i32, layout_capacity(3, 1, true).unwrap());
        assert_eq!(grid.len() as i32, layout_capacity(3, 1, false).unwrap());
    }

    #[tokio::test]
    async fn oversized_layout_is_rejected() {
        let store = MemoryStore::new();
        let err = BusTemplate::create(
            &store,
            CreateBusTemplateRequest {
                name: "Huge".into(),
                rows: 100_000,
                seats_per_row: 100_000,
                total_seats: None,
                has_aisle: true,
                description: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let f = fixture().await;
        let err = BusSeat::batch_create(
            &f.store,
            BatchCreateSeatsRequest {
                bus_template_id: f.template.id.clone(),
                schedule_id: f.schedule.schedule_id.clone(),
                rows: MAX_ROWS + 1,
                seats_per_row: 4,
                has_aisle: false,
            },
            "admin",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn template_total_defaults_from_layout() {
        let f = fixture().await;
        assert_eq!(f.template.total_seats, 8);
    }

    #[tokio::test]
    async fn batch_create_replaces_existing_seats() {
        let f = fixture().await;
        seats(&f).await;
        seats(&f).await;
        let all = BusSeat::find_by_schedule(&f.store, &f.schedule.schedule_id, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 8);

        let err = BusSeat::batch_create(
            &f.store,
            BatchCreateSeatsRequest {
                bus_template_id: f.template.id.clone(),
                schedule_id: f.schedule.schedule_id.clone(),
                rows: 1,
                seats_per_row: 4,
                has_aisle: false,
            },
            "u1",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn assigning_moves_user_to_new_seat() {
        let f = fixture().await;
        let grid = seats(&f).await;

        let first = BusSeat::assign(
            &f.store,
            AssignSeatRequest {
                user_id: "u1".into(),
                seat_id: grid[0].id.clone(),
                bus_template_id: f.template.id.clone(),
            },
            "u1",
        )
        .await
        .unwrap();
        assert_eq!(first.status, SeatStatus::Assigned);

        let moved = BusSeat::assign(
            &f.store,
            AssignSeatRequest {
                user_id: "u1".into(),
                seat_id: grid[1].id.clone(),
                bus_template_id: f.template.id.clone(),
            },
            "u1",
        )
        .await
        .unwrap();
        assert_eq!(moved.user_id.as_deref(), Some("u1"));

        let old = BusSeat::find_by_id(&f.store, &grid[0].id).await.unwrap();
        assert_eq!(old.status, SeatStatus::Empty);
        assert!(old.user_id.is_none());
        assert_eq!(BusSeat::find_by_user(&f.store, "u1").await.unwrap().len(), 1);
    }

    async fn assign_first(f: &Fixture, seat_id: &str, user: &str, acting: &str) -> AppResult<BusSeat> {
        BusSeat::assign(
            &f.store,
            AssignSeatRequest {
                user_id: user.into(),
                seat_id: seat_id.into(),
                bus_template_id: f.template.id.clone(),
            },
            acting,
        )
        .await
    }

    #[tokio::test]
    async fn taken_seat_conflicts() {
        let f = fixture().await;
        let grid = seats(&f).await;
        let seat = grid[0].id.as_str();

        assign_first(&f, seat, "u1", "admin").await.unwrap();
        let err = assign_first(&f, seat, "u2", "u2").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = assign_first(&f, seat, "u2", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        // 已经是自己的座位，直接返回
        let same = assign_first(&f, seat, "u1", "u1").await.unwrap();
        assert_eq!(same.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn wrong_template_is_rejected() {
        let f = fixture().await;
        let grid = seats(&f).await;
        let err = BusSeat::assign(
            &f.store,
            AssignSeatRequest {
                user_id: "u1".into(),
                seat_id: grid[0].id.clone(),
                bus_template_id: "other".into(),
            },
            "u1",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn release_and_schedule_removal_clear_seats() {
        let f = fixture().await;
        let grid = seats(&f).await;
        BusSeat::assign(
            &f.store,
            AssignSeatRequest {
                user_id: "u2".into(),
                seat_id: grid[3].id.clone(),
                bus_template_id: f.template.id.clone(),
            },
            "u2",
        )
        .await
        .unwrap();

        let err = BusSeat::release(&f.store, &grid[3].id, "u1").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let released = BusSeat::release(&f.store, &grid[3].id, "admin").await.unwrap();
        assert!(released.user_id.is_none());

        Schedule::remove(&f.store, &f.schedule.schedule_id, "admin").await.unwrap();
        assert!(f.store.find_seats_by_schedule(&f.schedule.schedule_id).await.unwrap().is_empty());
    }
}
