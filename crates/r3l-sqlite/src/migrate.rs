//! Database migration runner
//!
//! Migrations are embedded in order and each is applied once, recorded in
//! `schema_migrations`.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, SqliteError};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "000",
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    ),
    (
        "001",
        "CREATE TABLE attestations (
            content_hash TEXT PRIMARY KEY NOT NULL,
            proof_type TEXT NOT NULL DEFAULT 'trusted_verifier',
            tx_signature TEXT,
            pda TEXT,
            has_c2pa INTEGER NOT NULL DEFAULT 0,
            trust_list_match TEXT NOT NULL DEFAULT '',
            validation_state TEXT NOT NULL DEFAULT '',
            digital_source_type TEXT NOT NULL DEFAULT '',
            issuer TEXT NOT NULL DEFAULT '',
            common_name TEXT NOT NULL DEFAULT '',
            software_agent TEXT NOT NULL DEFAULT '',
            signing_time TEXT NOT NULL DEFAULT '',
            cert_fingerprint TEXT NOT NULL DEFAULT '',
            email_domain TEXT,
            wallet_pubkey TEXT,
            submitted_by TEXT,
            org_id INTEGER,
            org_domain TEXT,
            verifier_version TEXT NOT NULL DEFAULT '',
            trust_bundle_hash TEXT NOT NULL DEFAULT '',
            content_type TEXT NOT NULL DEFAULT 'file',
            source_url TEXT,
            mime_type TEXT,
            content_size INTEGER,
            stored INTEGER NOT NULL DEFAULT 0,
            private INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX idx_attestations_created_at ON attestations(created_at DESC);",
    ),
    (
        "002",
        "ALTER TABLE attestations ADD COLUMN fuzzy_hash TEXT;
        ALTER TABLE attestations ADD COLUMN embedding FLOAT32_BLOB;
        CREATE INDEX idx_attestations_fuzzy_hash ON attestations(fuzzy_hash)
            WHERE fuzzy_hash IS NOT NULL;",
    ),
];

/// Apply all pending migrations to the database
///
/// # Errors
///
/// Returns an error if any migration fails to apply.
pub fn migrate(conn: &Connection) -> Result<()> {
    for (version, sql) in MIGRATIONS {
        apply_migration(conn, version, sql)?;
    }
    Ok(())
}

fn apply_migration(conn: &Connection, version: &str, sql: &str) -> Result<()> {
    if is_migration_applied(conn, version)? {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)
        .map_err(|e| SqliteError::Migration(format!("{version}: {e}")))?;
    tx.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?, CURRENT_TIMESTAMP)",
        [version],
    )?;
    tx.commit()?;

    debug!(version, "applied migration");
    Ok(())
}

fn is_migration_applied(conn: &Connection, version: &str) -> Result<bool> {
    let table_exists = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='schema_migrations'")?
        .exists([])?;
    if !table_exists {
        return Ok(false);
    }

    Ok(conn
        .prepare("SELECT 1 FROM schema_migrations WHERE version = ?")?
        .exists([version])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
            .unwrap()
            .exists([name])
            .unwrap()
    }

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert!(table_exists(&conn, "schema_migrations"));
        assert!(table_exists(&conn, "attestations"));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_fingerprint_columns_added() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.prepare("SELECT fuzzy_hash, embedding FROM attestations").unwrap();
    }
}
