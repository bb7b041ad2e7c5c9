use axum::{
    extract::{Path, State},
    Extension, Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::authz::{Action, Resource, Scope, Target};
use crate::entities::booking;
use crate::entities::car::{self, Comfort};
use crate::entities::ride::{self, RideStatus};
use crate::error::{AppError, AppResult};
use crate::handlers::bookings::booked_seats;
use crate::handlers::{authorize_record, ensure_user_exists};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCarRequest {
    /// Owner of the car. Ignored for `user` accounts, which always own what they create.
    pub driver_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50, message = "brand is required"))]
    pub brand: String,
    #[validate(length(min = 1, max = 50, message = "model is required"))]
    pub model: String,
    #[validate(range(min = 1950, max = 2100, message = "year is out of range"))]
    pub year: i32,
    #[validate(length(min = 2, max = 20, message = "registration must be 2 to 20 characters"))]
    pub registration: String,
    #[validate(range(min = 1, max = 9, message = "seats must be between 1 and 9"))]
    pub seats: i32,
    pub comfort: Comfort,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCarRequest {
    pub driver_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50, message = "brand cannot be empty"))]
    pub brand: Option<String>,
    #[validate(length(min = 1, max = 50, message = "model cannot be empty"))]
    pub model: Option<String>,
    #[validate(range(min = 1950, max = 2100, message = "year is out of range"))]
    pub year: Option<i32>,
    #[validate(length(min = 2, max = 20, message = "registration must be 2 to 20 characters"))]
    pub registration: Option<String>,
    #[validate(range(min = 1, max = 9, message = "seats must be between 1 and 9"))]
    pub seats: Option<i32>,
    pub comfort: Option<Comfort>,
}

/// Most seats any open or full ride of the car still holds, free plus booked.
fn seats_in_use(rides: &[ride::Model], bookings: &[booking::Model]) -> i32 {
    rides
        .iter()
        .filter(|r| matches!(r.status, RideStatus::Opened | RideStatus::Full))
        .map(|r| r.available_seats + booked_seats(bookings, r.id))
        .max()
        .unwrap_or(0)
}

fn normalize_registration(raw: &str) -> String {
    raw.trim().to_uppercase()
}

async fn ensure_registration_free(
    state: &AppState,
    registration: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let mut query = car::Entity::find().filter(car::Column::Registration.eq(registration));
    if let Some(id) = except {
        query = query.filter(car::Column::Id.ne(id));
    }

    if query.one(&state.db).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "A car with registration {} already exists",
            registration
        )));
    }

    Ok(())
}

/// Cars visible to the caller: every car under an unconditional grant, own cars otherwise
pub async fn list_cars(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<car::Model>>> {
    let mut query = car::Entity::find().order_by_asc(car::Column::Brand);

    match state.policy.scope(claims.role, Resource::Car, Action::Read) {
        Scope::All => {}
        Scope::Own => query = query.filter(car::Column::DriverId.eq(claims.sub)),
        Scope::Denied => {
            return Err(AppError::Forbidden("Car access denied".to_string()));
        }
    }

    Ok(Json(query.all(&state.db).await?))
}

pub async fn create_car(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCarRequest>,
) -> AppResult<Json<car::Model>> {
    payload.validate()?;

    let owner = state
        .policy
        .require(
            &claims,
            Resource::Car,
            Action::Create,
            Target::New {
                submitted_owner: payload.driver_id,
            },
        )?
        .ok_or_else(|| AppError::BadRequest("driver_id is required".to_string()))?;

    if owner != claims.sub {
        ensure_user_exists(&state.db, owner).await?;
    }

    let registration = normalize_registration(&payload.registration);
    ensure_registration_free(&state, &registration, None).await?;

    let car = car::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(owner),
        brand: Set(payload.brand.trim().to_string()),
        model: Set(payload.model.trim().to_string()),
        year: Set(payload.year),
        registration: Set(registration),
        seats: Set(payload.seats),
        comfort: Set(payload.comfort),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!(car_id = %car.id, driver_id = %owner, created_by = %claims.sub, "Car created");
    Ok(Json(car))
}

pub async fn get_car(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<car::Model>> {
    let found = car::Entity::find_by_id(id).one(&state.db).await?;
    let (car, _) = authorize_record(
        &state,
        &claims,
        Resource::Car,
        Action::Read,
        found,
        |c| c.driver_id,
        None,
    )?;

    Ok(Json(car))
}

pub async fn update_car(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCarRequest>,
) -> AppResult<Json<car::Model>> {
    payload.validate()?;

    let found = car::Entity::find_by_id(id).one(&state.db).await?;
    let (car, owner) = authorize_record(
        &state,
        &claims,
        Resource::Car,
        Action::Update,
        found,
        |c| c.driver_id,
        payload.driver_id,
    )?;

    let mut active: car::ActiveModel = car.clone().into();

    if owner != car.driver_id {
        ensure_user_exists(&state.db, owner).await?;
        tracing::info!(car_id = %car.id, from = %car.driver_id, to = %owner, "Car reassigned");
        active.driver_id = Set(owner);
    }

    if let Some(brand) = payload.brand {
        active.brand = Set(brand.trim().to_string());
    }

    if let Some(model) = payload.model {
        active.model = Set(model.trim().to_string());
    }

    if let Some(year) = payload.year {
        active.year = Set(year);
    }

    if let Some(registration) = payload.registration {
        let registration = normalize_registration(&registration);
        if registration != car.registration {
            ensure_registration_free(&state, &registration, Some(car.id)).await?;
            active.registration = Set(registration);
        }
    }

    if let Some(seats) = payload.seats {
        if seats < car.seats {
            let rides = ride::Entity::find()
                .filter(ride::Column::CarId.eq(car.id))
                .all(&state.db)
                .await?;
            let ride_ids: Vec<Uuid> = rides.iter().map(|r| r.id).collect();
            let bookings = booking::Entity::find()
                .filter(booking::Column::RideId.is_in(ride_ids))
                .all(&state.db)
                .await?;

            let needed = seats_in_use(&rides, &bookings);
            if seats < needed {
                return Err(AppError::BadRequest(format!(
                    "Rides with this car still need {} seats",
                    needed
                )));
            }
        }
        active.seats = Set(seats);
    }

    if let Some(comfort) = payload.comfort {
        active.comfort = Set(comfort);
    }

    let updated = active.update(&state.db).await?;
    Ok(Json(updated))
}

/// Delete a car; its rides go with it.
pub async fn delete_car(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let found = car::Entity::find_by_id(id).one(&state.db).await?;
    let (car, _) = authorize_record(
        &state,
        &claims,
        Resource::Car,
        Action::Delete,
        found,
        |c| c.driver_id,
        None,
    )?;

    car::Entity::delete_by_id(car.id).exec(&state.db).await?;
    tracing::info!(car_id = %car.id, deleted_by = %claims.sub, "Car deleted");

    Ok(Json(serde_json::json!({ "message": "Car deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_is_normalized() {
        assert_eq!(normalize_registration(" ab-123-cd "), "AB-123-CD");
    }

    fn ride_with(available_seats: i32, status: RideStatus) -> ride::Model {
        ride::Model {
            id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            car_id: Uuid::new_v4(),
            departure_city_id: 1,
            arrival_city_id: 2,
            collection_point: "Gare".to_string(),
            drop_off_point: "Centre".to_string(),
            date: chrono::NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            hour_of_departure: "08:00".to_string(),
            hour_of_arrival: "10:00".to_string(),
            duration: 120,
            price: rust_decimal::Decimal::new(1500, 2),
            available_seats,
            status,
            created_at: chrono::Utc::now().into(),
        }
    }

    fn booking_on(ride_id: Uuid, seats: i32) -> booking::Model {
        booking::Model {
            id: Uuid::new_v4(),
            ride_id,
            user_id: Uuid::new_v4(),
            seats,
            created_at: chrono::Utc::now().into(),
        }
    }

    #[test]
    fn test_seats_in_use_counts_free_and_booked() {
        let open = ride_with(1, RideStatus::Opened);
        let full = ride_with(0, RideStatus::Full);
        let done = ride_with(0, RideStatus::Completed);
        let bookings = vec![
            booking_on(open.id, 1),
            booking_on(full.id, 3),
            booking_on(done.id, 5),
        ];

        assert_eq!(seats_in_use(&[open.clone(), full, done], &bookings), 3);
        assert_eq!(seats_in_use(&[open], &[]), 1);
        assert_eq!(seats_in_use(&[], &bookings), 0);
    }

    #[test]
    fn test_create_payload_validation() {
        let payload: CreateCarRequest = serde_json::from_value(serde_json::json!({
            "brand": "Renault",
            "model": "Zoe",
            "year": 2021,
            "registration": "AB-123-CD",
            "seats": 12,
            "comfort": "premium"
        }))
        .unwrap();

        assert_eq!(payload.comfort, Comfort::Premium);
        assert!(payload.driver_id.is_none());

        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("seats"));
        assert!(!errors.field_errors().contains_key("brand"));
    }
}
