use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Fixed marker taxonomy. Wire form is the lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerCategory {
    Event,
    Obstacle,
    Object,
    Alert,
}

impl MarkerCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Obstacle => "obstacle",
            Self::Object => "object",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for MarkerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown marker category")]
pub struct UnknownCategory;

impl FromStr for MarkerCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "obstacle" => Ok(Self::Obstacle),
            "object" => Ok(Self::Object),
            "alert" => Ok(Self::Alert),
            _ => Err(UnknownCategory),
        }
    }
}

/// Marker record in the `markers` collection.
///
/// The serialized form doubles as the stored document and the response
/// body; timestamps are RFC 3339 strings in both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub title: String,
    pub category: MarkerCategory,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Field-wise partial update applied by the store.
///
/// `None` leaves the stored field untouched. The nested option on
/// `image` distinguishes "don't touch" from "clear the image".
#[derive(Debug, Clone, Serialize)]
pub struct MarkerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<MarkerCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Option<String>>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
