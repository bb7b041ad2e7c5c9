use uuid::Uuid;

use super::policy::{Action, Resource, Scope};
use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};

/// The record an action is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A record about to be created, with the owner id the caller submitted.
    New { submitted_owner: Option<Uuid> },
    /// A stored record. `submitted_owner` is set when an update tries to
    /// reassign the record.
    Existing {
        owner: Uuid,
        submitted_owner: Option<Uuid>,
    },
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest {
    pub actor_id: Uuid,
    pub actor_role: UserRole,
    pub scope: Scope,
    pub action: Action,
    pub target: Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `effective_owner` is the owner the record must carry after the action.
    /// It is `None` only when an unconditional grant creates a record
    /// without naming an owner.
    Allowed { effective_owner: Option<Uuid> },
    Forbidden,
    NotFound,
}

impl Outcome {
    pub fn into_result(self, resource: Resource) -> AppResult<Option<Uuid>> {
        match self {
            Outcome::Allowed { effective_owner } => Ok(effective_owner),
            Outcome::Forbidden => Err(AppError::Forbidden(format!(
                "{} access denied",
                resource.label()
            ))),
            Outcome::NotFound => Err(AppError::NotFound(format!(
                "{} not found",
                resource.label()
            ))),
        }
    }
}

/// Decide whether the actor may perform the action on the target.
///
/// A missing target is reported before anything else. An unconditional grant
/// allows outright. Otherwise drivers must own the record (or submit
/// themselves as owner), users must own the record and have any submitted
/// owner replaced by themselves, and every other case is forbidden.
pub fn resolve(request: &AccessRequest) -> Outcome {
    let actor = request.actor_id;

    let (existing_owner, submitted_owner) = match request.target {
        Target::Missing => return Outcome::NotFound,
        Target::New { submitted_owner } => (None, submitted_owner),
        Target::Existing {
            owner,
            submitted_owner,
        } => (Some(owner), submitted_owner),
    };

    match request.scope {
        Scope::All => {
            return Outcome::Allowed {
                effective_owner: submitted_owner.or(existing_owner),
            };
        }
        Scope::Denied => return Outcome::Forbidden,
        Scope::Own => {}
    }

    let allowed = Outcome::Allowed {
        effective_owner: Some(actor),
    };

    match request.actor_role {
        UserRole::Driver => {
            let owns_record = existing_owner.is_none_or(|owner| owner == actor);
            let submits_self = submitted_owner.is_none_or(|owner| owner == actor);
            if owns_record && submits_self {
                allowed
            } else {
                Outcome::Forbidden
            }
        }
        // Whatever owner a user submits is replaced by the user.
        UserRole::User => match existing_owner {
            Some(owner) if owner != actor => Outcome::Forbidden,
            _ => allowed,
        },
        UserRole::Admin => Outcome::Forbidden,
    }
}
