use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Info,
    Road,
    Support,
    Store,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Info => "info",
            DatasetKind::Road => "road",
            DatasetKind::Support => "support",
            DatasetKind::Store => "store",
        }
    }

    /// Key of the published artifact inside the bucket.
    pub fn object_key(&self) -> String {
        format!("{}.json", self.as_str())
    }

    pub fn source_file_name(&self) -> String {
        format!("{}.tsv", self.as_str())
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved point. Unresolved locations are carried as `Option<Coordinate>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoRecord {
    pub id: Option<String>,
    pub municipality: Option<String>,
    pub municipality2: Option<String>,
    pub municipality3: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_aware: Option<String>,
    pub situation: String,
    pub last_updated_at: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_need: Option<String>,
    pub response_status: String,
    pub source_url: String,
    pub location: Option<Coordinate>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadRecord {
    pub situation: String,
    pub last_updated_at: String,
    pub source_url: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportRecord {
    pub title: String,
    pub source_url: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    pub number: String,
    pub region: String,
    pub store_name: String,
    pub notes: String,
}

/// Top-level shape of every published artifact: `{ "data": [...] }`.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: Serialize> {
    pub data: &'a [T],
}

impl<'a, T: Serialize> Envelope<'a, T> {
    pub fn new(data: &'a [T]) -> Self {
        Self { data }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, JobError> {
        serde_json::to_vec(self).map_err(|err| JobError::Serialize(err.to_string()))
    }
}
