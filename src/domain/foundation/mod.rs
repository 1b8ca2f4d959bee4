//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, auth types and the validation error that form
//! the vocabulary of the realtime subsystem.

mod auth;
mod errors;
mod ids;
mod timestamp;

pub use auth::{AuthError, AuthenticatedUser};
pub use errors::ValidationError;
pub use ids::{ClientId, DashboardId, DataCollectionId, ProjectId, UserId};
pub use timestamp::Timestamp;
