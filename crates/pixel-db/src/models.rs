//! Database row types: these map directly to SQLite rows.
//! Distinct from pixel-types wire models to keep the DB layer independent.

use pixel_types::events::ChangeKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelRow {
    pub id: u32,
    pub adopted: bool,
    pub color: String,
    pub adopter: String,
    pub emoji: String,
    pub adopted_at: Option<String>,
    pub version: i64,
}

/// A row as it looks after a write, tagged with how it got there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChange {
    pub kind: ChangeKind,
    pub row: PixelRow,
}

#[derive(Debug, Default)]
pub struct UpsertSummary {
    pub changes: Vec<RowChange>,
    pub ignored: usize,
}

#[derive(Debug)]
pub enum AdoptOutcome {
    Adopted(PixelRow),
    /// The row exists but someone already holds it; carries the current row.
    AlreadyAdopted(PixelRow),
    NotFound,
}
