//! Location types and identifiers
//!
//! The backend mixes numeric and string identifiers across entities, so ids
//! are normalised to strings on ingestion.

use crate::error::ModelError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Borrow the raw identifier
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Raw {
                    Number(i64),
                    Text(String),
                }

                Ok(match Raw::deserialize(deserializer)? {
                    Raw::Number(n) => Self(n.to_string()),
                    Raw::Text(s) => Self(s),
                })
            }
        }
    };
}

string_id!(
    /// Storage location identifier (unique per location type)
    NodeId
);

string_id!(
    /// Sample item identifier
    SampleItemId
);

/// Levels of the storage hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Room,
    Device,
    Shelf,
    Rack,
    Box,
}

impl LocationType {
    /// All levels, outermost first
    pub const ALL: [LocationType; 5] = [
        LocationType::Room,
        LocationType::Device,
        LocationType::Shelf,
        LocationType::Rack,
        LocationType::Box,
    ];

    /// Singular lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LocationType::Room => "room",
            LocationType::Device => "device",
            LocationType::Shelf => "shelf",
            LocationType::Rack => "rack",
            LocationType::Box => "box",
        }
    }

    /// Plural used in REST paths
    ///
    /// `shelf` pluralises irregularly to `shelves`.
    #[inline]
    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            LocationType::Room => "rooms",
            LocationType::Device => "devices",
            LocationType::Shelf => "shelves",
            LocationType::Rack => "racks",
            LocationType::Box => "boxes",
        }
    }

    /// Level directly above, `None` for rooms
    #[inline]
    #[must_use]
    pub fn parent(self) -> Option<LocationType> {
        match self {
            LocationType::Room => None,
            LocationType::Device => Some(LocationType::Room),
            LocationType::Shelf => Some(LocationType::Device),
            LocationType::Rack => Some(LocationType::Shelf),
            LocationType::Box => Some(LocationType::Rack),
        }
    }

    /// Level directly below, `None` for boxes
    #[inline]
    #[must_use]
    pub fn child(self) -> Option<LocationType> {
        match self {
            LocationType::Room => Some(LocationType::Device),
            LocationType::Device => Some(LocationType::Shelf),
            LocationType::Shelf => Some(LocationType::Rack),
            LocationType::Rack => Some(LocationType::Box),
            LocationType::Box => None,
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationType {
    type Err = ModelError;

    /// Accepts singular or plural names, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        LocationType::ALL
            .into_iter()
            .find(|t| t.as_str() == lower || t.plural() == lower)
            .ok_or_else(|| ModelError::UnknownLocationType(s.to_string()))
    }
}
