use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ModelError;
use crate::ids::ProviderId;

/// Tag selecting which harvester/processor implementation serves a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProviderKind {
    Artportalen,
    DarwinCoreArchive,
    ClamGateway,
    FishData,
    Kul,
    Mvm,
    Nors,
    Sers,
    Shark,
    VirtualHerbarium,
    INaturalist,
    Biologg,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 12] = [
        ProviderKind::Artportalen,
        ProviderKind::DarwinCoreArchive,
        ProviderKind::ClamGateway,
        ProviderKind::FishData,
        ProviderKind::Kul,
        ProviderKind::Mvm,
        ProviderKind::Nors,
        ProviderKind::Sers,
        ProviderKind::Shark,
        ProviderKind::VirtualHerbarium,
        ProviderKind::INaturalist,
        ProviderKind::Biologg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Artportalen => "artportalen",
            ProviderKind::DarwinCoreArchive => "darwin_core_archive",
            ProviderKind::ClamGateway => "clam_gateway",
            ProviderKind::FishData => "fish_data",
            ProviderKind::Kul => "kul",
            ProviderKind::Mvm => "mvm",
            ProviderKind::Nors => "nors",
            ProviderKind::Sers => "sers",
            ProviderKind::Shark => "shark",
            ProviderKind::VirtualHerbarium => "virtual_herbarium",
            ProviderKind::INaturalist => "i_naturalist",
            ProviderKind::Biologg => "biologg",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::InvalidProviderKind(s.to_string()))
    }
}

/// Secondary record types a provider can deliver besides observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProviderCapabilities {
    pub checklists: bool,
    pub events: bool,
    pub datasets: bool,
}

/// Descriptive metadata read out of a provider's archive during harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DatasetMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub citation: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

/// An external source contributing observation records.
///
/// Providers are configured outside the pipeline and read fresh on every run;
/// the only field the pipeline writes back is [`Provider::dynamic_metadata`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Provider {
    pub id: ProviderId,
    pub kind: ProviderKind,
    pub name: String,
    pub is_active: bool,
    pub supports_incremental: bool,
    pub include_in_schedule: bool,
    /// A failed harvest or process for this provider fails the whole run.
    pub mandatory_for_success: bool,
    /// Self-contained archive (e.g. a Darwin Core archive URL) the provider is
    /// harvested from, when it has one.
    #[cfg_attr(feature = "serde", serde(default))]
    pub archive_url: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub capabilities: ProviderCapabilities,
    #[cfg_attr(feature = "serde", serde(default))]
    pub last_successful_harvest: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dynamic_metadata: Option<DatasetMetadata>,
}

impl Provider {
    pub fn new(id: i32, kind: ProviderKind, name: impl Into<String>) -> Self {
        Self {
            id: ProviderId(id),
            kind,
            name: name.into(),
            is_active: true,
            supports_incremental: false,
            include_in_schedule: true,
            mandatory_for_success: false,
            archive_url: None,
            capabilities: ProviderCapabilities::default(),
            last_successful_harvest: None,
            dynamic_metadata: None,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory_for_success = true;
        self
    }

    pub fn incremental(mut self) -> Self {
        self.supports_incremental = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn with_archive(mut self, url: impl Into<String>) -> Self {
        self.archive_url = Some(url.into());
        self
    }

    pub fn is_archive_backed(&self) -> bool {
        self.archive_url.is_some()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.id, self.kind)
    }
}
