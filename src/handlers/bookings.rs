use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::ride::{self, RideStatus};
use crate::entities::{booking, city};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub ride_id: Uuid,
    #[validate(range(min = 1, message = "must book at least 1 seat"))]
    pub seats: i32,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub departure_city: String,
    pub arrival_city: String,
    pub date: NaiveDate,
    pub hour_of_departure: String,
    pub seats: i32,
    pub created_at: DateTime<Utc>,
}

/// Seats left and resulting status once `booked` more seats are taken
/// (negative `booked` gives seats back).
pub fn seat_update(ride: &ride::Model, booked: i32) -> (i32, RideStatus) {
    let remaining = ride.available_seats - booked;
    let status = match ride.status {
        RideStatus::Opened | RideStatus::Full if remaining <= 0 => RideStatus::Full,
        RideStatus::Full => RideStatus::Opened,
        other => other,
    };
    (remaining, status)
}

/// Seats currently held on `ride_id` by the given bookings.
pub fn booked_seats(bookings: &[booking::Model], ride_id: Uuid) -> i32 {
    bookings
        .iter()
        .filter(|b| b.ride_id == ride_id)
        .map(|b| b.seats)
        .sum()
}

/// New seat count and status of every ride touched when `released` bookings
/// go away. Rides absent from `rides` are skipped.
pub fn release_bookings(
    rides: &[ride::Model],
    released: &[booking::Model],
) -> Vec<(Uuid, i32, RideStatus)> {
    let mut freed: HashMap<Uuid, i32> = HashMap::new();
    for b in released {
        *freed.entry(b.ride_id).or_default() += b.seats;
    }

    rides
        .iter()
        .filter_map(|ride| {
            let seats = freed.get(&ride.id)?;
            let (remaining, status) = seat_update(ride, -seats);
            Some((ride.id, remaining, status))
        })
        .collect()
}

fn booking_response(b: booking::Model, r: &ride::Model, cities: &[city::Model]) -> BookingResponse {
    let city_name = |id: i32| {
        cities
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    };

    BookingResponse {
        id: b.id,
        ride_id: r.id,
        departure_city: city_name(r.departure_city_id),
        arrival_city: city_name(r.arrival_city_id),
        date: r.date,
        hour_of_departure: r.hour_of_departure.clone(),
        seats: b.seats,
        created_at: b.created_at.with_timezone(&Utc),
    }
}

/// Book seats on a ride
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateBookingRequest>,
) -> AppResult<Json<BookingResponse>> {
    payload.validate()?;

    let txn = state.db.begin().await?;

    let ride = ride::Entity::find_by_id(payload.ride_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

    if ride.driver_id == claims.sub {
        return Err(AppError::BadRequest("You cannot book your own ride".to_string()));
    }

    if ride.date < Utc::now().date_naive() {
        return Err(AppError::BadRequest("Cannot book past rides".to_string()));
    }

    if ride.status != RideStatus::Opened {
        return Err(AppError::BadRequest("Ride is not open for booking".to_string()));
    }

    if payload.seats > ride.available_seats {
        return Err(AppError::BadRequest(format!(
            "Only {} seats available",
            ride.available_seats
        )));
    }

    let existing = booking::Entity::find()
        .filter(booking::Column::RideId.eq(ride.id))
        .filter(booking::Column::UserId.eq(claims.sub))
        .one(&txn)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "You already have a booking for this ride".to_string(),
        ));
    }

    let booking = booking::ActiveModel {
        id: Set(Uuid::new_v4()),
        ride_id: Set(ride.id),
        user_id: Set(claims.sub),
        seats: Set(payload.seats),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let (remaining, status) = seat_update(&ride, payload.seats);
    let mut active: ride::ActiveModel = ride.clone().into();
    active.available_seats = Set(remaining);
    active.status = Set(status);
    let ride = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(
        booking_id = %booking.id,
        ride_id = %ride.id,
        user_id = %claims.sub,
        seats = booking.seats,
        remaining,
        "Ride booked"
    );

    let cities = city::Entity::find().all(&state.db).await?;
    Ok(Json(booking_response(booking, &ride, &cities)))
}

/// List the caller's bookings
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<BookingResponse>>> {
    let bookings = booking::Entity::find()
        .filter(booking::Column::UserId.eq(claims.sub))
        .order_by_desc(booking::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let ride_ids: Vec<Uuid> = bookings.iter().map(|b| b.ride_id).collect();
    let rides = ride::Entity::find()
        .filter(ride::Column::Id.is_in(ride_ids))
        .all(&state.db)
        .await?;
    let cities = city::Entity::find().all(&state.db).await?;

    let responses: Vec<BookingResponse> = bookings
        .into_iter()
        .filter_map(|b| {
            let ride = rides.iter().find(|r| r.id == b.ride_id)?;
            Some(booking_response(b, ride, &cities))
        })
        .collect();

    Ok(Json(responses))
}

/// Cancel a booking and give the seats back to the ride
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let txn = state.db.begin().await?;

    let booking = booking::Entity::find_by_id(booking_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if booking.user_id != claims.sub && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "You can only cancel your own bookings".to_string(),
        ));
    }

    let ride = ride::Entity::find_by_id(booking.ride_id)
        .lock_exclusive()
        .one(&txn)
        .await?;

    if let Some(ride) = ride {
        if ride.date < Utc::now().date_naive() {
            return Err(AppError::BadRequest(
                "Cannot cancel bookings for past rides".to_string(),
            ));
        }

        let (remaining, status) = seat_update(&ride, -booking.seats);
        let mut active: ride::ActiveModel = ride.into();
        active.available_seats = Set(remaining);
        active.status = Set(status);
        active.update(&txn).await?;
    }

    booking::Entity::delete_by_id(booking_id).exec(&txn).await?;
    txn.commit().await?;

    tracing::info!(booking_id = %booking_id, cancelled_by = %claims.sub, "Booking cancelled");
    Ok(Json(serde_json::json!({ "message": "Booking cancelled" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn ride(available_seats: i32, status: RideStatus) -> ride::Model {
        ride::Model {
            id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            car_id: Uuid::new_v4(),
            departure_city_id: 1,
            arrival_city_id: 2,
            collection_point: "Gare".to_string(),
            drop_off_point: "Centre".to_string(),
            date: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            hour_of_departure: "08:00".to_string(),
            hour_of_arrival: "10:00".to_string(),
            duration: 120,
            price: Decimal::new(1500, 2),
            available_seats,
            status,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_booking_last_seats_fills_ride() {
        assert_eq!(seat_update(&ride(3, RideStatus::Opened), 2), (1, RideStatus::Opened));
        assert_eq!(seat_update(&ride(3, RideStatus::Opened), 3), (0, RideStatus::Full));
    }

    #[test]
    fn test_cancellation_reopens_full_ride() {
        assert_eq!(seat_update(&ride(0, RideStatus::Full), -2), (2, RideStatus::Opened));
    }

    #[test]
    fn test_cancellation_keeps_terminal_status() {
        assert_eq!(
            seat_update(&ride(0, RideStatus::Canceled), -1),
            (1, RideStatus::Canceled)
        );
        assert_eq!(
            seat_update(&ride(2, RideStatus::Completed), -1),
            (3, RideStatus::Completed)
        );
    }

    fn booking_on(ride_id: Uuid, seats: i32) -> booking::Model {
        booking::Model {
            id: Uuid::new_v4(),
            ride_id,
            user_id: Uuid::new_v4(),
            seats,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_booked_seats_counts_only_that_ride() {
        let r = ride(1, RideStatus::Opened);
        let bookings = vec![
            booking_on(r.id, 2),
            booking_on(Uuid::new_v4(), 4),
            booking_on(r.id, 1),
        ];
        assert_eq!(booked_seats(&bookings, r.id), 3);
        assert_eq!(booked_seats(&[], r.id), 0);
    }

    #[test]
    fn test_released_bookings_reopen_full_rides() {
        let full = ride(0, RideStatus::Full);
        let open = ride(1, RideStatus::Opened);
        let untouched = ride(0, RideStatus::Full);
        let released = vec![
            booking_on(full.id, 2),
            booking_on(open.id, 1),
            booking_on(open.id, 2),
            booking_on(Uuid::new_v4(), 3),
        ];

        let mut updates = release_bookings(&[full.clone(), open.clone(), untouched], &released);
        updates.sort_by_key(|(_, remaining, _)| *remaining);

        assert_eq!(
            updates,
            vec![
                (full.id, 2, RideStatus::Opened),
                (open.id, 4, RideStatus::Opened),
            ]
        );
    }

    #[test]
    fn test_booking_response_resolves_city_names() {
        let r = ride(2, RideStatus::Opened);
        let cities = vec![
            city::Model { id: 1, name: "Paris".to_string() },
            city::Model { id: 2, name: "Lyon".to_string() },
        ];
        let b = booking::Model {
            id: Uuid::new_v4(),
            ride_id: r.id,
            user_id: Uuid::new_v4(),
            seats: 2,
            created_at: Utc::now().into(),
        };

        let response = booking_response(b, &r, &cities);
        assert_eq!(response.departure_city, "Paris");
        assert_eq!(response.arrival_city, "Lyon");
        assert_eq!(response.seats, 2);
    }
}
