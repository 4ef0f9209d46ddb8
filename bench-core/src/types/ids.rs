//! Newtype identifiers. Keeps run/task/persona/trait ids from being
//! accidentally swapped at call sites.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! int_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

int_id!(RunId);
int_id!(TaskId);
int_id!(DatasetId);
int_id!(ModelId);
int_id!(TraitId);

/// Persona identity. Personas are keyed by UUID, not a row id, so the
/// keyset pagination cursor in C9 can carry it directly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonaUuid(pub String);

impl fmt::Display for PersonaUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PersonaUuid {
    fn from(v: String) -> Self {
        Self(v)
    }
}

impl AsRef<str> for PersonaUuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
