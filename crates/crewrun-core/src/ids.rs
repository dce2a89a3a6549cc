//! Newtype wrappers for identifiers to ensure type safety.
//!
//! All cross-entity references in CrewRun are identity references into
//! owning collections, never embedded structures. These newtypes keep the
//! different identity spaces from being mixed up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Create a new id from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a new random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Get the inner string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

define_id!(
    /// Unique identifier for a crew definition.
    CrewId
);

define_id!(
    /// Unique identifier for an agent within a crew.
    AgentId
);

define_id!(
    /// Unique identifier for a task within a crew.
    TaskId
);

define_id!(
    /// Unique identifier for a Job (one execution of a crew).
    JobId
);

define_id!(
    /// Unique identifier for a TaskRun (one attempt of one task).
    RunId
);

define_id!(
    /// Unique identifier for an audit event.
    EventId
);
