use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (pixels table)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS pixels (
                id          INTEGER PRIMARY KEY,
                adopted     INTEGER NOT NULL DEFAULT 0,
                color       TEXT NOT NULL DEFAULT '#E5E7EB',
                adopter     TEXT NOT NULL DEFAULT '',
                emoji       TEXT NOT NULL DEFAULT '',
                adopted_at  TEXT
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (row versions)");
        conn.execute_batch(
            "
            ALTER TABLE pixels ADD COLUMN version INTEGER NOT NULL DEFAULT 0;

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
