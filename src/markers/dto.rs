use serde::{Deserialize, Deserializer, Serialize};

/// Create body. `category` arrives as a string and is validated in the
/// handler; owner fields never come from the client.
#[derive(Debug, Deserialize)]
pub struct CreateMarkerRequest {
    pub title: String,
    pub category: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
}

/// Present-vs-absent wrapper for partial updates.
///
/// `Option<T>` cannot tell a missing field from an explicit `null`.
/// For a nullable field use `Patch<Option<T>>`: an explicit `null`
/// deserializes to `Value(None)` and overwrites.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Absent,
    Value(T),
}

impl<T> Patch<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Absent => None,
            Self::Value(v) => Some(v),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Patch::Value)
    }
}

/// Update body: any subset of the creatable fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateMarkerRequest {
    pub title: Patch<String>,
    pub category: Patch<String>,
    pub description: Patch<String>,
    pub latitude: Patch<f64>,
    pub longitude: Patch<f64>,
    pub image: Patch<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
