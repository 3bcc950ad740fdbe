//! Identity types for Tasklane entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

macro_rules! define_row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

define_row_id!(
    /// Primary key of a task row.
    TaskId
);

define_row_id!(
    /// Primary key of a user row.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parses_and_displays() {
        let id: TaskId = " 42 ".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<UserId>().is_err());
    }

    #[test]
    fn test_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&TaskId::new(3)).unwrap(), "3");
    }
}
