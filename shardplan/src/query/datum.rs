//! Constant values appearing in statements and shard bounds.

use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};
use shardplan_config::FlexibleType;
use uuid::Uuid;

/// A typed constant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    Uuid(Uuid),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Compare two values of the same type. Values of different types
    /// and NULLs don't compare.
    pub fn compare(&self, other: &Datum) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Integer(value) => write!(f, "{}", value),
            Self::Text(value) => write!(f, "'{}'", value),
            Self::Uuid(value) => write!(f, "'{}'", value),
        }
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Datum {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Uuid> for Datum {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&FlexibleType> for Datum {
    fn from(value: &FlexibleType) -> Self {
        match value {
            FlexibleType::Integer(value) => Self::Integer(*value),
            FlexibleType::Uuid(value) => Self::Uuid(*value),
            FlexibleType::String(value) => Self::Text(value.clone()),
        }
    }
}
