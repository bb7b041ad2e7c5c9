use std::collections::{BTreeSet, HashMap};

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::authz::{Action, Resource, Scope, Target};
use crate::entities::car::{self, Comfort};
use crate::entities::ride::{self, RideStatus};
use crate::entities::{booking, city, user};
use crate::error::{AppError, AppResult};
use crate::handlers::bookings::booked_seats;
use crate::handlers::{authorize_record, ensure_user_exists};
use crate::ride_filter::{filter_and_sort, parse_filters, RideFields, SortKey, TimeBucket};
use crate::utils::jwt::Claims;
use crate::utils::time::ride_duration;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct DriverSummary {
    pub id: Uuid,
    pub name: String,
    pub validated: bool,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarSummary {
    pub id: Uuid,
    pub brand: String,
    pub model: String,
    pub comfort: Comfort,
}

/// A ride as shown in search results and detail pages.
#[derive(Debug, Clone, Serialize)]
pub struct RideListing {
    pub id: Uuid,
    pub driver: Option<DriverSummary>,
    pub car: Option<CarSummary>,
    pub departure_city: String,
    pub arrival_city: String,
    pub collection_point: String,
    pub drop_off_point: String,
    pub date: NaiveDate,
    pub hour_of_departure: String,
    pub hour_of_arrival: String,
    pub duration: i32,
    pub price: Decimal,
    pub available_seats: i32,
    pub status: RideStatus,
}

impl RideFields for RideListing {
    fn hour_of_departure(&self) -> Option<&str> {
        Some(&self.hour_of_departure)
    }

    fn hour_of_arrival(&self) -> Option<&str> {
        Some(&self.hour_of_arrival)
    }

    fn price(&self) -> Option<Decimal> {
        Some(self.price)
    }

    fn duration(&self) -> Option<i32> {
        Some(self.duration)
    }
}

/// Join rides with their cities, drivers and cars.
async fn build_listings<C: ConnectionTrait>(db: &C, rides: Vec<ride::Model>) -> AppResult<Vec<RideListing>> {
    if rides.is_empty() {
        return Ok(Vec::new());
    }

    let driver_ids: Vec<Uuid> = rides.iter().map(|r| r.driver_id).collect();
    let car_ids: Vec<Uuid> = rides.iter().map(|r| r.car_id).collect();

    let cities: HashMap<i32, String> = city::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let drivers: HashMap<Uuid, user::Model> = user::Entity::find()
        .filter(user::Column::Id.is_in(driver_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();
    let cars: HashMap<Uuid, car::Model> = car::Entity::find()
        .filter(car::Column::Id.is_in(car_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    Ok(rides
        .into_iter()
        .map(|r| RideListing {
            id: r.id,
            driver: drivers.get(&r.driver_id).map(|d| DriverSummary {
                id: d.id,
                name: d.name.clone(),
                validated: d.validated,
                image_url: d.image_url.clone(),
            }),
            car: cars.get(&r.car_id).map(|c| CarSummary {
                id: c.id,
                brand: c.brand.clone(),
                model: c.model.clone(),
                comfort: c.comfort,
            }),
            departure_city: cities.get(&r.departure_city_id).cloned().unwrap_or_default(),
            arrival_city: cities.get(&r.arrival_city_id).cloned().unwrap_or_default(),
            collection_point: r.collection_point,
            drop_off_point: r.drop_off_point,
            date: r.date,
            hour_of_departure: r.hour_of_departure,
            hour_of_arrival: r.hour_of_arrival,
            duration: r.duration,
            price: r.price,
            available_seats: r.available_seats,
            status: r.status,
        })
        .collect())
}

// ============ Public search ============

#[derive(Debug, Default, Deserialize)]
pub struct RideSearchQuery {
    pub departure_city_id: Option<i32>,
    pub arrival_city_id: Option<i32>,
    pub date: Option<NaiveDate>,
    /// Minimum number of free seats
    pub seats: Option<i32>,
    /// Defaults to `opened`
    pub status: Option<RideStatus>,
    /// Comma separated time buckets, e.g. `before-6,12-18`
    pub filters: Option<String>,
    pub sort: Option<String>,
}

impl RideSearchQuery {
    fn criteria(&self) -> AppResult<(BTreeSet<TimeBucket>, SortKey)> {
        let filters = match &self.filters {
            Some(raw) => parse_filters(raw).map_err(AppError::BadRequest)?,
            None => BTreeSet::new(),
        };
        let sort = match &self.sort {
            Some(raw) => raw.parse::<SortKey>().map_err(AppError::BadRequest)?,
            None => SortKey::default(),
        };
        Ok((filters, sort))
    }
}

/// Search rides, then filter by departure time and sort
pub async fn search_rides(
    State(state): State<AppState>,
    Query(query): Query<RideSearchQuery>,
) -> AppResult<Json<Vec<RideListing>>> {
    let (filters, sort) = query.criteria()?;

    let mut select = ride::Entity::find()
        .filter(ride::Column::Status.eq(query.status.unwrap_or(RideStatus::Opened)))
        .order_by_asc(ride::Column::Date);

    if let Some(city_id) = query.departure_city_id {
        select = select.filter(ride::Column::DepartureCityId.eq(city_id));
    }
    if let Some(city_id) = query.arrival_city_id {
        select = select.filter(ride::Column::ArrivalCityId.eq(city_id));
    }
    if let Some(date) = query.date {
        select = select.filter(ride::Column::Date.eq(date));
    }
    if let Some(seats) = query.seats {
        select = select.filter(ride::Column::AvailableSeats.gte(seats));
    }

    let rides = select.all(&state.db).await?;
    let listings = build_listings(&state.db, rides).await?;
    let results = filter_and_sort(&listings, &filters, sort);

    tracing::debug!(found = listings.len(), shown = results.len(), sort = ?sort, "Ride search");
    Ok(Json(results))
}

/// Ride detail
pub async fn get_ride(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RideListing>> {
    let ride = ride::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

    build_listings(&state.db, vec![ride])
        .await?
        .pop()
        .map(Json)
        .ok_or_else(|| AppError::Internal("Ride listing missing".to_string()))
}

// ============ Ride management ============

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRideRequest {
    /// Ignored for `user` accounts, which always own what they create.
    pub driver_id: Option<Uuid>,
    pub car_id: Uuid,
    pub departure_city_id: i32,
    pub arrival_city_id: i32,
    #[validate(length(min = 1, max = 255, message = "collection point is required"))]
    pub collection_point: String,
    #[validate(length(min = 1, max = 255, message = "drop-off point is required"))]
    pub drop_off_point: String,
    pub date: NaiveDate,
    #[validate(custom(function = "crate::utils::time::validate_hour"))]
    pub hour_of_departure: String,
    #[validate(custom(function = "crate::utils::time::validate_hour"))]
    pub hour_of_arrival: String,
    pub price: Decimal,
    #[validate(range(min = 1, message = "at least one seat must be offered"))]
    pub available_seats: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRideRequest {
    pub driver_id: Option<Uuid>,
    pub car_id: Option<Uuid>,
    pub departure_city_id: Option<i32>,
    pub arrival_city_id: Option<i32>,
    #[validate(length(min = 1, max = 255, message = "collection point cannot be empty"))]
    pub collection_point: Option<String>,
    #[validate(length(min = 1, max = 255, message = "drop-off point cannot be empty"))]
    pub drop_off_point: Option<String>,
    pub date: Option<NaiveDate>,
    #[validate(custom(function = "crate::utils::time::validate_hour"))]
    pub hour_of_departure: Option<String>,
    #[validate(custom(function = "crate::utils::time::validate_hour"))]
    pub hour_of_arrival: Option<String>,
    pub price: Option<Decimal>,
    #[validate(range(min = 0, message = "available seats cannot be negative"))]
    pub available_seats: Option<i32>,
    pub status: Option<RideStatus>,
}

fn ensure_price(price: Decimal) -> AppResult<()> {
    if price <= Decimal::ZERO {
        return Err(AppError::BadRequest("Price must be positive".to_string()));
    }
    Ok(())
}

async fn ensure_cities<C: ConnectionTrait>(db: &C, departure: i32, arrival: i32) -> AppResult<()> {
    if departure == arrival {
        return Err(AppError::BadRequest(
            "Departure and arrival must be different".to_string(),
        ));
    }

    city::Entity::find_by_id(departure)
        .one(db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid departure city".to_string()))?;
    city::Entity::find_by_id(arrival)
        .one(db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid arrival city".to_string()))?;

    Ok(())
}

/// Departure, arrival and duration once the submitted hours are laid over the
/// stored ones, or `None` when neither hour changes.
fn merge_hours(
    ride: &ride::Model,
    departure: Option<String>,
    arrival: Option<String>,
) -> AppResult<Option<(String, String, i32)>> {
    if departure.is_none() && arrival.is_none() {
        return Ok(None);
    }

    let departure = departure.unwrap_or_else(|| ride.hour_of_departure.clone());
    let arrival = arrival.unwrap_or_else(|| ride.hour_of_arrival.clone());
    let duration = ride_duration(&departure, &arrival)
        .ok_or_else(|| AppError::BadRequest("Invalid ride hours".to_string()))?;

    Ok(Some((departure, arrival, duration)))
}

/// Free seats and status after an edit. Free plus booked seats must fit in
/// the car; `opened` and `full` follow the free seat count, terminal
/// statuses are kept.
fn reconcile_seats(
    available: i32,
    status: RideStatus,
    car_seats: i32,
    booked: i32,
) -> AppResult<(i32, RideStatus)> {
    if available + booked > car_seats {
        return Err(AppError::BadRequest(format!(
            "The car only has {} seats and {} are already booked",
            car_seats, booked
        )));
    }

    let status = match status {
        RideStatus::Opened | RideStatus::Full if available == 0 => RideStatus::Full,
        RideStatus::Opened | RideStatus::Full => RideStatus::Opened,
        other => other,
    };

    Ok((available, status))
}

/// The car must exist and belong to the ride's driver.
async fn ensure_car<C: ConnectionTrait>(db: &C, car_id: Uuid, owner: Uuid) -> AppResult<car::Model> {
    let car = car::Entity::find_by_id(car_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid car".to_string()))?;

    if car.driver_id != owner {
        return Err(AppError::BadRequest(
            "The car does not belong to the ride's driver".to_string(),
        ));
    }

    Ok(car)
}

/// Rides owned by the caller, or every ride under an unconditional grant
pub async fn list_my_rides(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<RideListing>>> {
    let mut select = ride::Entity::find()
        .order_by_desc(ride::Column::Date)
        .order_by_asc(ride::Column::HourOfDeparture);

    match state.policy.scope(claims.role, Resource::Ride, Action::Read) {
        Scope::All => {}
        Scope::Own => select = select.filter(ride::Column::DriverId.eq(claims.sub)),
        Scope::Denied => {
            return Err(AppError::Forbidden("Ride access denied".to_string()));
        }
    }

    let rides = select.all(&state.db).await?;
    Ok(Json(build_listings(&state.db, rides).await?))
}

pub async fn create_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateRideRequest>,
) -> AppResult<Json<ride::Model>> {
    payload.validate()?;
    ensure_price(payload.price)?;

    let owner = state
        .policy
        .require(
            &claims,
            Resource::Ride,
            Action::Create,
            Target::New {
                submitted_owner: payload.driver_id,
            },
        )?
        .ok_or_else(|| AppError::BadRequest("driver_id is required".to_string()))?;

    if owner != claims.sub {
        ensure_user_exists(&state.db, owner).await?;
    }

    ensure_cities(&state.db, payload.departure_city_id, payload.arrival_city_id).await?;
    let car = ensure_car(&state.db, payload.car_id, owner).await?;

    if payload.available_seats > car.seats {
        return Err(AppError::BadRequest(format!(
            "The car only has {} seats",
            car.seats
        )));
    }

    let duration = ride_duration(&payload.hour_of_departure, &payload.hour_of_arrival)
        .ok_or_else(|| AppError::BadRequest("Invalid ride hours".to_string()))?;

    let ride = ride::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(owner),
        car_id: Set(car.id),
        departure_city_id: Set(payload.departure_city_id),
        arrival_city_id: Set(payload.arrival_city_id),
        collection_point: Set(payload.collection_point.trim().to_string()),
        drop_off_point: Set(payload.drop_off_point.trim().to_string()),
        date: Set(payload.date),
        hour_of_departure: Set(payload.hour_of_departure),
        hour_of_arrival: Set(payload.hour_of_arrival),
        duration: Set(duration),
        price: Set(payload.price),
        available_seats: Set(payload.available_seats),
        status: Set(RideStatus::Opened),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!(ride_id = %ride.id, driver_id = %owner, created_by = %claims.sub, "Ride created");
    Ok(Json(ride))
}

pub async fn update_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRideRequest>,
) -> AppResult<Json<ride::Model>> {
    payload.validate()?;

    let txn = state.db.begin().await?;

    let found = ride::Entity::find_by_id(id).lock_exclusive().one(&txn).await?;
    let (ride, owner) = authorize_record(
        &state,
        &claims,
        Resource::Ride,
        Action::Update,
        found,
        |r| r.driver_id,
        payload.driver_id,
    )?;

    let mut active: ride::ActiveModel = ride.clone().into();

    if owner != ride.driver_id {
        ensure_user_exists(&txn, owner).await?;
        active.driver_id = Set(owner);
    }

    let car = ensure_car(&txn, payload.car_id.unwrap_or(ride.car_id), owner).await?;
    if car.id != ride.car_id {
        active.car_id = Set(car.id);
    }

    let departure_city_id = payload.departure_city_id.unwrap_or(ride.departure_city_id);
    let arrival_city_id = payload.arrival_city_id.unwrap_or(ride.arrival_city_id);
    if payload.departure_city_id.is_some() || payload.arrival_city_id.is_some() {
        ensure_cities(&txn, departure_city_id, arrival_city_id).await?;
        active.departure_city_id = Set(departure_city_id);
        active.arrival_city_id = Set(arrival_city_id);
    }

    if let Some(point) = payload.collection_point {
        active.collection_point = Set(point.trim().to_string());
    }

    if let Some(point) = payload.drop_off_point {
        active.drop_off_point = Set(point.trim().to_string());
    }

    if let Some(date) = payload.date {
        active.date = Set(date);
    }

    if let Some((departure, arrival, duration)) =
        merge_hours(&ride, payload.hour_of_departure, payload.hour_of_arrival)?
    {
        active.hour_of_departure = Set(departure);
        active.hour_of_arrival = Set(arrival);
        active.duration = Set(duration);
    }

    if let Some(price) = payload.price {
        ensure_price(price)?;
        active.price = Set(price);
    }

    let bookings = booking::Entity::find()
        .filter(booking::Column::RideId.eq(ride.id))
        .all(&txn)
        .await?;
    let (seats, status) = reconcile_seats(
        payload.available_seats.unwrap_or(ride.available_seats),
        payload.status.unwrap_or(ride.status),
        car.seats,
        booked_seats(&bookings, ride.id),
    )?;
    active.available_seats = Set(seats);
    active.status = Set(status);

    let updated = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(ride_id = %updated.id, updated_by = %claims.sub, "Ride updated");
    Ok(Json(updated))
}

pub async fn delete_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let found = ride::Entity::find_by_id(id).one(&state.db).await?;
    let (ride, _) = authorize_record(
        &state,
        &claims,
        Resource::Ride,
        Action::Delete,
        found,
        |r| r.driver_id,
        None,
    )?;

    ride::Entity::delete_by_id(ride.id).exec(&state.db).await?;
    tracing::info!(ride_id = %ride.id, deleted_by = %claims.sub, "Ride deleted");

    Ok(Json(serde_json::json!({ "message": "Ride deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_criteria_defaults() {
        let (filters, sort) = RideSearchQuery::default().criteria().unwrap();
        assert!(filters.is_empty());
        assert_eq!(sort, SortKey::HourOfDeparture);
    }

    #[test]
    fn test_search_criteria_parsing() {
        let query = RideSearchQuery {
            filters: Some("before-6,after-18".to_string()),
            sort: Some("duration".to_string()),
            ..Default::default()
        };
        let (filters, sort) = query.criteria().unwrap();
        assert!(filters.contains(&TimeBucket::Before6));
        assert!(filters.contains(&TimeBucket::After18));
        assert_eq!(sort, SortKey::Duration);
    }

    #[test]
    fn test_search_criteria_rejects_unknown_keys() {
        let query = RideSearchQuery {
            sort: Some("seats".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.criteria(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_ride_hours_are_validated() {
        let payload: CreateRideRequest = serde_json::from_value(serde_json::json!({
            "car_id": Uuid::nil(),
            "departure_city_id": 1,
            "arrival_city_id": 2,
            "collection_point": "Gare de Lyon",
            "drop_off_point": "Part-Dieu",
            "date": "2025-03-14",
            "hour_of_departure": "7h30",
            "hour_of_arrival": "12:10",
            "price": "24.50",
            "available_seats": 3
        }))
        .unwrap();

        let errors = payload.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("hour_of_departure"));
        assert!(!fields.contains_key("hour_of_arrival"));
    }

    fn stored_ride(departure: &str, arrival: &str, duration: i32) -> ride::Model {
        ride::Model {
            id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            car_id: Uuid::new_v4(),
            departure_city_id: 1,
            arrival_city_id: 2,
            collection_point: "Gare".to_string(),
            drop_off_point: "Centre".to_string(),
            date: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            hour_of_departure: departure.to_string(),
            hour_of_arrival: arrival.to_string(),
            duration,
            price: Decimal::new(1500, 2),
            available_seats: 3,
            status: RideStatus::Opened,
            created_at: chrono::Utc::now().into(),
        }
    }

    #[test]
    fn test_merge_hours_departure_only() {
        let ride = stored_ride("08:00", "10:00", 120);
        let merged = merge_hours(&ride, Some("09:15".to_string()), None).unwrap();
        assert_eq!(
            merged,
            Some(("09:15".to_string(), "10:00".to_string(), 45))
        );
    }

    #[test]
    fn test_merge_hours_arrival_only_past_midnight() {
        let ride = stored_ride("22:30", "23:30", 60);
        let merged = merge_hours(&ride, None, Some("01:00".to_string())).unwrap();
        assert_eq!(
            merged,
            Some(("22:30".to_string(), "01:00".to_string(), 150))
        );
    }

    #[test]
    fn test_merge_hours_untouched() {
        let ride = stored_ride("08:00", "10:00", 120);
        assert_eq!(merge_hours(&ride, None, None).unwrap(), None);
    }

    #[test]
    fn test_merge_hours_rejects_unreadable_stored_hour() {
        let ride = stored_ride("8h", "10:00", 0);
        assert!(matches!(
            merge_hours(&ride, None, Some("11:00".to_string())),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_reconcile_seats_follows_free_seats() {
        assert_eq!(
            reconcile_seats(0, RideStatus::Opened, 4, 4).unwrap(),
            (0, RideStatus::Full)
        );
        assert_eq!(
            reconcile_seats(2, RideStatus::Full, 4, 2).unwrap(),
            (2, RideStatus::Opened)
        );
        assert_eq!(
            reconcile_seats(0, RideStatus::Canceled, 4, 0).unwrap(),
            (0, RideStatus::Canceled)
        );
        assert_eq!(
            reconcile_seats(1, RideStatus::Completed, 4, 3).unwrap(),
            (1, RideStatus::Completed)
        );
    }

    #[test]
    fn test_reconcile_seats_respects_car_capacity() {
        assert!(reconcile_seats(4, RideStatus::Opened, 4, 0).is_ok());
        assert!(matches!(
            reconcile_seats(5, RideStatus::Opened, 4, 0),
            Err(AppError::BadRequest(_))
        ));
        // a smaller car cannot hold seats already booked
        assert!(matches!(
            reconcile_seats(1, RideStatus::Opened, 3, 3),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_price_must_be_positive() {
        assert!(ensure_price(Decimal::new(1050, 2)).is_ok());
        assert!(ensure_price(Decimal::ZERO).is_err());
        assert!(ensure_price(Decimal::new(-1, 0)).is_err());
    }
}
