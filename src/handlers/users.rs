use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::authz::{Action, Resource};
use crate::entities::user::{self, UserRole};
use crate::entities::{booking, car, ride};
use crate::error::{AppError, AppResult};
use crate::handlers::authorize_record;
use crate::handlers::bookings::release_bookings;
use crate::utils::jwt::Claims;
use crate::utils::password::hash_password;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub validated: bool,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
            validated: u.validated,
            image_url: u.image_url,
            created_at: u.created_at.with_timezone(&Utc),
        }
    }
}

/// The signed-in user's own record
pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<UserResponse>> {
    let user = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    let found = user::Entity::find_by_id(id).one(&state.db).await?;
    let (user, _) = authorize_record(
        &state,
        &claims,
        Resource::User,
        Action::Read,
        found,
        |u| u.id,
        None,
    )?;

    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "name cannot be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "invalid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: Option<String>,
    #[validate(url(message = "image_url must be a URL"))]
    pub image_url: Option<String>,
    /// Admin only
    pub role: Option<UserRole>,
    /// Admin only
    pub validated: Option<bool>,
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    payload.validate()?;

    let found = user::Entity::find_by_id(id).one(&state.db).await?;
    let (user, _) = authorize_record(
        &state,
        &claims,
        Resource::User,
        Action::Update,
        found,
        |u| u.id,
        None,
    )?;

    if (payload.role.is_some() || payload.validated.is_some()) && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Only an admin can change role or validation".to_string(),
        ));
    }

    let mut active: user::ActiveModel = user.clone().into();

    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }

    if let Some(email) = payload.email {
        let email = email.trim().to_lowercase();
        if email != user.email {
            let taken = user::Entity::find()
                .filter(user::Column::Email.eq(&email))
                .one(&state.db)
                .await?;
            if taken.is_some() {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
            active.email = Set(email);
        }
    }

    if let Some(password) = payload.password {
        active.password_hash = Set(hash_password(&password)?);
    }

    if let Some(image_url) = payload.image_url {
        active.image_url = Set(Some(image_url));
    }

    if let Some(role) = payload.role {
        if role != user.role {
            tracing::info!(user_id = %user.id, from = ?user.role, to = ?role, "Role changed");
        }
        active.role = Set(role);
    }

    if let Some(validated) = payload.validated {
        active.validated = Set(validated);
    }

    let updated = active.update(&state.db).await?;
    Ok(Json(updated.into()))
}

/// Delete an account together with its cars, rides and bookings.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let found = user::Entity::find_by_id(id).one(&state.db).await?;
    let (user, _) = authorize_record(
        &state,
        &claims,
        Resource::User,
        Action::Delete,
        found,
        |u| u.id,
        None,
    )?;

    if user.id == claims.sub {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    let txn = state.db.begin().await?;

    // Seats held on other drivers' rides go back to those rides
    let held = booking::Entity::find()
        .filter(booking::Column::UserId.eq(id))
        .all(&txn)
        .await?;
    let ride_ids: Vec<Uuid> = held.iter().map(|b| b.ride_id).collect();
    let rides = ride::Entity::find()
        .filter(ride::Column::Id.is_in(ride_ids))
        .filter(ride::Column::DriverId.ne(id))
        .lock_exclusive()
        .all(&txn)
        .await?;

    for (ride_id, remaining, status) in release_bookings(&rides, &held) {
        ride::ActiveModel {
            id: Set(ride_id),
            available_seats: Set(remaining),
            status: Set(status),
            ..Default::default()
        }
        .update(&txn)
        .await?;
    }

    let bookings = booking::Entity::delete_many()
        .filter(booking::Column::UserId.eq(id))
        .exec(&txn)
        .await?;
    let rides = ride::Entity::delete_many()
        .filter(ride::Column::DriverId.eq(id))
        .exec(&txn)
        .await?;
    let cars = car::Entity::delete_many()
        .filter(car::Column::DriverId.eq(id))
        .exec(&txn)
        .await?;
    user::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(
        user_id = %id,
        deleted_by = %claims.sub,
        bookings = bookings.rows_affected,
        rides = rides.rows_affected,
        cars = cars.rows_affected,
        "User deleted"
    );

    Ok(Json(serde_json::json!({ "message": "User deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<UserRole>,
}

/// List users, optionally by role (admin)
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<Vec<UserResponse>>> {
    let mut select = user::Entity::find().order_by_asc(user::Column::Name);
    if let Some(role) = query.role {
        select = select.filter(user::Column::Role.eq(role));
    }

    let users = select.all(&state.db).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// List all drivers (admin)
pub async fn list_drivers(state: State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    list_users(
        state,
        Query(UserListQuery {
            role: Some(UserRole::Driver),
        }),
    )
    .await
}
