use axum::{
    extract::{Path, State},
    Json,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Deserialize;
use validator::Validate;

use crate::entities::{city, ride};
use crate::error::{AppError, AppResult};
use crate::AppState;

/// List all cities
pub async fn list_cities(State(state): State<AppState>) -> AppResult<Json<Vec<city::Model>>> {
    let cities = city::Entity::find()
        .order_by_asc(city::Column::Name)
        .all(&state.db)
        .await?;

    Ok(Json(cities))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCityRequest {
    #[validate(length(min = 1, max = 100, message = "name is required"))]
    pub name: String,
}

/// Add a city (admin)
pub async fn create_city(
    State(state): State<AppState>,
    Json(payload): Json<CreateCityRequest>,
) -> AppResult<Json<city::Model>> {
    payload.validate()?;
    let name = payload.name.trim().to_string();

    let existing = city::Entity::find()
        .filter(city::Column::Name.eq(&name))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!("City {} already exists", name)));
    }

    let city = city::ActiveModel {
        name: Set(name),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!(city_id = city.id, name = %city.name, "City created");
    Ok(Json(city))
}

/// Remove a city no ride refers to (admin)
pub async fn delete_city(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    let in_use = ride::Entity::find()
        .filter(
            Condition::any()
                .add(ride::Column::DepartureCityId.eq(id))
                .add(ride::Column::ArrivalCityId.eq(id)),
        )
        .count(&state.db)
        .await?;

    if in_use > 0 {
        return Err(AppError::Conflict(format!(
            "City is used by {} ride(s)",
            in_use
        )));
    }

    let result = city::Entity::delete_by_id(id).exec(&state.db).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("City not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "message": "City deleted" })))
}
