use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resolver::{resolve, AccessRequest, Outcome, Target};
use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    User,
    Car,
    Ride,
}

impl Resource {
    pub fn label(self) -> &'static str {
        match self {
            Resource::User => "User",
            Resource::Car => "Car",
            Resource::Ride => "Ride",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];
}

/// How far a role's grant reaches for one resource/action pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Granted regardless of who owns the record.
    All,
    /// Granted on records the actor owns.
    Own,
    Denied,
}

/// One line of a policy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub role: UserRole,
    pub resource: Resource,
    pub actions: Vec<Action>,
    pub scope: Scope,
}

/// Static role -> permission lookup, independent of any record.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    grants: HashMap<(UserRole, Resource, Action), Scope>,
}

impl PolicyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in statement: admins manage everything, drivers and users
    /// manage their own cars and rides and their own account.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for resource in [Resource::User, Resource::Car, Resource::Ride] {
            table = table.grant(UserRole::Admin, resource, &Action::ALL, Scope::All);
        }
        for role in [UserRole::Driver, UserRole::User] {
            table = table
                .grant(role, Resource::Car, &Action::ALL, Scope::Own)
                .grant(role, Resource::Ride, &Action::ALL, Scope::Own)
                .grant(role, Resource::User, &[Action::Read, Action::Update], Scope::Own);
        }
        table
    }

    pub fn from_rules(rules: Vec<PolicyRule>) -> Self {
        rules.into_iter().fold(Self::empty(), |table, rule| {
            table.grant(rule.role, rule.resource, &rule.actions, rule.scope)
        })
    }

    /// Parse a JSON array of [`PolicyRule`]s.
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let rules: Vec<PolicyRule> = serde_json::from_str(raw)
            .map_err(|e| AppError::Internal(format!("Invalid policy file: {}", e)))?;
        Ok(Self::from_rules(rules))
    }

    pub fn load(path: &str) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Internal(format!("Failed to read policy file {}: {}", path, e)))?;
        Self::from_json(&raw)
    }

    pub fn grant(mut self, role: UserRole, resource: Resource, actions: &[Action], scope: Scope) -> Self {
        for action in actions {
            self.grants.insert((role, resource, *action), scope);
        }
        self
    }

    pub fn scope(&self, role: UserRole, resource: Resource, action: Action) -> Scope {
        self.grants
            .get(&(role, resource, action))
            .copied()
            .unwrap_or(Scope::Denied)
    }

    /// Run the resolver for the caller identified by `claims`.
    pub fn authorize(
        &self,
        claims: &Claims,
        resource: Resource,
        action: Action,
        target: Target,
    ) -> Outcome {
        let request = AccessRequest {
            actor_id: claims.sub,
            actor_role: claims.role,
            scope: self.scope(claims.role, resource, action),
            action,
            target,
        };
        let outcome = resolve(&request);

        if outcome == Outcome::Forbidden {
            tracing::warn!(
                actor = %claims.sub,
                role = ?claims.role,
                resource = ?resource,
                action = ?action,
                "Access denied"
            );
        }

        outcome
    }

    /// Same as [`authorize`](Self::authorize), mapped onto [`AppError`].
    /// Returns the effective owner of the record.
    pub fn require(
        &self,
        claims: &Claims,
        resource: Resource,
        action: Action,
        target: Target,
    ) -> AppResult<Option<Uuid>> {
        self.authorize(claims, resource, action, target)
            .into_result(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_admin_has_everything() {
        let table = PolicyTable::standard();
        for resource in [Resource::User, Resource::Car, Resource::Ride] {
            for action in Action::ALL {
                assert_eq!(table.scope(UserRole::Admin, resource, action), Scope::All);
            }
        }
    }

    #[test]
    fn test_standard_members_are_scoped_to_own_records() {
        let table = PolicyTable::standard();
        assert_eq!(
            table.scope(UserRole::Driver, Resource::Ride, Action::Delete),
            Scope::Own
        );
        assert_eq!(
            table.scope(UserRole::User, Resource::Car, Action::Create),
            Scope::Own
        );
        assert_eq!(
            table.scope(UserRole::User, Resource::User, Action::Update),
            Scope::Own
        );
        assert_eq!(
            table.scope(UserRole::Driver, Resource::User, Action::Delete),
            Scope::Denied
        );
    }

    #[test]
    fn test_missing_entry_is_denied() {
        let table = PolicyTable::empty();
        assert_eq!(
            table.scope(UserRole::Admin, Resource::Car, Action::Read),
            Scope::Denied
        );
    }

    #[test]
    fn test_from_json() {
        let raw = r#"[
            { "role": "admin", "resource": "ride", "actions": ["read", "delete"], "scope": "all" },
            { "role": "driver", "resource": "ride", "actions": ["create"], "scope": "own" }
        ]"#;
        let table = PolicyTable::from_json(raw).unwrap();

        assert_eq!(table.scope(UserRole::Admin, Resource::Ride, Action::Delete), Scope::All);
        assert_eq!(
            table.scope(UserRole::Admin, Resource::Ride, Action::Update),
            Scope::Denied
        );
        assert_eq!(table.scope(UserRole::Driver, Resource::Ride, Action::Create), Scope::Own);
    }

    #[test]
    fn test_from_json_rejects_unknown_role() {
        let raw = r#"[{ "role": "root", "resource": "ride", "actions": ["read"], "scope": "all" }]"#;
        assert!(matches!(PolicyTable::from_json(raw), Err(AppError::Internal(_))));
    }

    #[test]
    fn test_later_rules_override_earlier_ones() {
        let table = PolicyTable::standard().grant(
            UserRole::User,
            Resource::Ride,
            &[Action::Create],
            Scope::Denied,
        );
        assert_eq!(
            table.scope(UserRole::User, Resource::Ride, Action::Create),
            Scope::Denied
        );
    }
}
