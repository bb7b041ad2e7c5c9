//! Role policy and ownership-based authorization for cars, rides and users.
//!
//! Handlers never check ownership themselves: they describe the target record
//! as a [`Target`] and ask [`PolicyTable::authorize`] for an [`Outcome`].

pub mod policy;
pub mod resolver;

pub use policy::{Action, PolicyRule, PolicyTable, Resource, Scope};
pub use resolver::{resolve, AccessRequest, Outcome, Target};
