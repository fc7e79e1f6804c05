use crate::Database;
use crate::models::{AdoptOutcome, PixelRow, RowChange, UpsertSummary};
use anyhow::{Result, anyhow};
use pixel_types::api::Resolution;
use pixel_types::events::ChangeKind;
use pixel_types::models::{DEFAULT_COLOR, RESET_SENTINEL_ID};
use rusqlite::Connection;

const PIXEL_COLUMNS: &str = "id, adopted, color, adopter, emoji, adopted_at, version";

/// Milliseconds since the Unix epoch, as SQL.
const NOW_MILLIS: &str = "CAST(unixepoch('subsec') * 1000 AS INTEGER)";

/// Versions are wall-clock stamps that never go backwards for a row, so a
/// rebuilt database still outranks versions a client cached from the old one.
fn next_version() -> String {
    format!("MAX(version + 1, {})", NOW_MILLIS)
}

impl Database {
    // -- Reads --

    pub fn list_pixels(&self) -> Result<Vec<PixelRow>> {
        self.with_conn(query_all_pixels)
    }

    pub fn get_pixel(&self, id: u32) -> Result<Option<PixelRow>> {
        self.with_conn(|conn| query_pixel(conn, id))
    }

    // -- Writes --

    /// Insert-or-update rows keyed by id, in one transaction.
    ///
    /// New rows are stamped with the current time. Existing rows are overwritten (and their
    /// version bumped) under `MergeDuplicates`, or left alone under
    /// `IgnoreDuplicates`. The caller-supplied `version` is never stored.
    pub fn upsert_pixels(&self, rows: &[PixelRow], resolution: Resolution) -> Result<UpsertSummary> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut summary = UpsertSummary::default();

            for row in rows {
                let exists = tx
                    .query_row("SELECT 1 FROM pixels WHERE id = ?1", [row.id], |_| Ok(()))
                    .optional()?
                    .is_some();

                let kind = if !exists {
                    tx.execute(
                        &format!(
                            "INSERT INTO pixels (id, adopted, color, adopter, emoji, adopted_at, version)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, {})",
                            NOW_MILLIS
                        ),
                        rusqlite::params![row.id, row.adopted, row.color, row.adopter, row.emoji, row.adopted_at],
                    )?;
                    ChangeKind::Insert
                } else if resolution == Resolution::IgnoreDuplicates {
                    summary.ignored += 1;
                    continue;
                } else {
                    tx.execute(
                        &format!(
                            "UPDATE pixels
                             SET adopted = ?2, color = ?3, adopter = ?4, emoji = ?5, adopted_at = ?6,
                                 version = {}
                             WHERE id = ?1",
                            next_version()
                        ),
                        rusqlite::params![row.id, row.adopted, row.color, row.adopter, row.emoji, row.adopted_at],
                    )?;
                    ChangeKind::Update
                };

                let stored = query_pixel(&tx, row.id)?
                    .ok_or_else(|| anyhow!("Pixel {} missing right after upsert", row.id))?;
                summary.changes.push(RowChange { kind, row: stored });
            }

            tx.commit()?;
            Ok(summary)
        })
    }

    /// Adopt a pixel only if it exists and is not adopted yet.
    ///
    /// The check and the write are one conditional UPDATE, so two racing
    /// adopters cannot both win.
    pub fn adopt_pixel(
        &self,
        id: u32,
        adopter: &str,
        color: &str,
        emoji: &str,
        adopted_at: &str,
    ) -> Result<AdoptOutcome> {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "UPDATE pixels
                 SET adopted = 1, adopter = ?2, color = ?3, emoji = ?4, adopted_at = ?5,
                     version = {}
                 WHERE id = ?1 AND adopted = 0
                 RETURNING {}",
                next_version(),
                PIXEL_COLUMNS
            );

            let adopted = conn
                .query_row(
                    &sql,
                    rusqlite::params![id, adopter, color, emoji, adopted_at],
                    map_pixel_row,
                )
                .optional()?;

            if let Some(row) = adopted {
                return Ok(AdoptOutcome::Adopted(row));
            }

            Ok(match query_pixel(conn, id)? {
                Some(current) => AdoptOutcome::AlreadyAdopted(current),
                None => AdoptOutcome::NotFound,
            })
        })
    }

    /// Return every row to the unadopted default. Returns the rows as written,
    /// ordered by id.
    pub fn reset_all(&self) -> Result<Vec<PixelRow>> {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "UPDATE pixels
                 SET adopted = 0, adopter = '', color = ?1, emoji = '', adopted_at = NULL,
                     version = {}
                 WHERE id <> ?2
                 RETURNING {}",
                next_version(),
                PIXEL_COLUMNS
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![DEFAULT_COLOR, RESET_SENTINEL_ID], map_pixel_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // RETURNING order is unspecified
            rows.sort_by_key(|r| r.id);
            Ok(rows)
        })
    }
}

fn map_pixel_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PixelRow> {
    Ok(PixelRow {
        id: row.get(0)?,
        adopted: row.get(1)?,
        color: row.get(2)?,
        adopter: row.get(3)?,
        emoji: row.get(4)?,
        adopted_at: row.get(5)?,
        version: row.get(6)?,
    })
}

fn query_all_pixels(conn: &Connection) -> Result<Vec<PixelRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM pixels ORDER BY id", PIXEL_COLUMNS))?;

    let rows = stmt
        .query_map([], map_pixel_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_pixel(conn: &Connection, id: u32) -> Result<Option<PixelRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM pixels WHERE id = ?1", PIXEL_COLUMNS))?;

    let row = stmt.query_row([id], map_pixel_row).optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
