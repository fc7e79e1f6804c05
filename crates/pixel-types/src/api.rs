use serde::{Deserialize, Serialize};

// -- Upsert --

/// How a bulk upsert treats rows whose id already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// Overwrite the existing row (last write wins).
    #[default]
    MergeDuplicates,
    /// Keep the existing row; only absent ids are inserted.
    IgnoreDuplicates,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MergeDuplicates => "merge-duplicates",
            Self::IgnoreDuplicates => "ignore-duplicates",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpsertQuery {
    #[serde(default)]
    pub resolution: Resolution,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub inserted: usize,
    pub updated: usize,
    pub ignored: usize,
}

// -- Adopt --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdoptRequest {
    pub adopter: String,
    pub color: String,
    pub emoji: String,
}

// -- Reset --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub reset: usize,
}
