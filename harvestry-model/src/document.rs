use std::fmt;

use chrono::{DateTime, Utc};

/// Business key of an observation (its occurrence id). Unique per partition
/// once an instance is valid.
pub type BusinessKey = String;

/// Store-assigned id of one physical document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// The slice of an indexed observation the pipeline itself reads.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexedDocument {
    pub id: DocumentId,
    pub business_key: BusinessKey,
    pub location: Option<Coordinates>,
    pub modified: DateTime<Utc>,
    pub protected: bool,
}

/// Documents sharing one business key inside a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub business_key: BusinessKey,
    pub documents: Vec<IndexedDocument>,
}

impl DuplicateGroup {
    /// Every document except the most recently modified one.
    pub fn superseded(&self) -> Vec<&IndexedDocument> {
        let Some(newest) = self.documents.iter().max_by_key(|d| d.modified) else {
            return Vec::new();
        };
        self.documents
            .iter()
            .filter(|d| d.id != newest.id)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ClusterHealth {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for ClusterHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClusterHealth::Green => "green",
            ClusterHealth::Yellow => "yellow",
            ClusterHealth::Red => "red",
        })
    }
}
