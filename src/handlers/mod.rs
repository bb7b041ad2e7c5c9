pub mod auth;
pub mod bookings;
pub mod cars;
pub mod cities;
pub mod rides;
pub mod users;

use sea_orm::{ConnectionTrait, EntityTrait};
use uuid::Uuid;

use crate::authz::{Action, Resource, Target};
use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

/// Authorize an action on a record that may not exist.
///
/// Returns the record together with the owner it must carry afterwards,
/// which differs from the stored one only when `submitted_owner` was accepted.
pub fn authorize_record<M>(
    state: &AppState,
    claims: &Claims,
    resource: Resource,
    action: Action,
    record: Option<M>,
    owner_of: impl Fn(&M) -> Uuid,
    submitted_owner: Option<Uuid>,
) -> AppResult<(M, Uuid)> {
    let target = match &record {
        Some(model) => Target::Existing {
            owner: owner_of(model),
            submitted_owner,
        },
        None => Target::Missing,
    };

    let effective_owner = state.policy.require(claims, resource, action, target)?;

    match record {
        Some(model) => {
            let owner = effective_owner.unwrap_or_else(|| owner_of(&model));
            Ok((model, owner))
        }
        None => Err(AppError::NotFound(format!("{} not found", resource.label()))),
    }
}

/// Records attributed to someone other than the caller must point at a real user.
pub async fn ensure_user_exists<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<user::Model> {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Unknown driver".to_string()))
}
