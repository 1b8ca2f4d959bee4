//! Strongly-typed identifier value objects.
//!
//! Dashboards, projects and data collections are identified upstream by
//! opaque strings (typically 24-character hex object ids). They are kept as
//! strings here; the only place the representation matters is dashboard
//! resolution, see [`DataCollectionId::native_form`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Unique identifier for an accepted client connection.
///
/// Generated server-side at accept time and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Create a new random client ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Declares a non-empty string identifier newtype.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier, rejecting empty or blank input.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                Ok(Self(id))
            }

            /// Returns the inner string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

string_id!(
    /// Identifier of a dashboard, the unit of subscription.
    DashboardId,
    "dashboard_id"
);

string_id!(
    /// Identifier of the project owning dashboards and data collections.
    ProjectId,
    "project_id"
);

string_id!(
    /// Identifier of a data collection, the upstream entity whose changes are watched.
    DataCollectionId,
    "data_collection_id"
);

string_id!(
    /// Identifier of an authenticated user.
    UserId,
    "user_id"
);

impl DataCollectionId {
    /// JSON key under which dashboard component metadata references a data collection.
    pub const REFERENCE_KEY: &'static str = "dc_id";

    /// The string form of a stored reference: `"<id>"`.
    pub fn string_form(&self) -> JsonValue {
        JsonValue::String(self.0.clone())
    }

    /// The native form of a stored reference: `{"$oid": "<id>"}`.
    ///
    /// Dashboard documents imported from the document store keep object ids
    /// in extended-JSON shape, so either form may be present.
    pub fn native_form(&self) -> JsonValue {
        json!({ "$oid": self.0 })
    }

    /// Returns true if `value` is a reference to this id in either form.
    pub fn is_referenced_by(&self, value: &JsonValue) -> bool {
        match value {
            JsonValue::String(s) => s == &self.0,
            JsonValue::Object(map) => map
                .get("$oid")
                .and_then(JsonValue::as_str)
                .is_some_and(|oid| oid == self.0),
            _ => false,
        }
    }
}
