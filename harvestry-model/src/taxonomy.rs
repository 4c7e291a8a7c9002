use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TaxonId(pub i32);

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Taxon {
    pub id: TaxonId,
    pub scientific_name: String,
    pub vernacular_name: Option<String>,
    pub parent: Option<TaxonId>,
    /// Sensitivity category; above 2 means locations must be diffused.
    pub protection_level: u8,
}

/// Read-only taxonomy shared by every processor of a run.
#[derive(Debug, Clone, Default)]
pub struct TaxonomySnapshot {
    taxa: Arc<HashMap<TaxonId, Taxon>>,
}

impl TaxonomySnapshot {
    pub fn new(taxa: impl IntoIterator<Item = Taxon>) -> Self {
        Self {
            taxa: Arc::new(taxa.into_iter().map(|t| (t.id, t)).collect()),
        }
    }

    pub fn get(&self, id: TaxonId) -> Option<&Taxon> {
        self.taxa.get(&id)
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Taxon> {
        self.taxa.values()
    }
}
