//! SQLite schema and migrations for the Knowledge Ledger (§4.7, §6).
//!
//! Versioned, idempotent, WAL-mode bootstrap, matching the corpus's
//! embedded-store convention rather than an external migration tool — the
//! spec's out-of-scope "database schema migrations" refers to the
//! application's migration tooling, not this crate's need for a working
//! embedded schema.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS knowledge_nodes (
            id TEXT PRIMARY KEY,
            statement TEXT NOT NULL,
            domain TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            branch TEXT NOT NULL,
            state TEXT NOT NULL,
            confidence INTEGER NOT NULL,
            velocity REAL NOT NULL DEFAULT 0.0,
            priority_queue TEXT NOT NULL DEFAULT 'WARM',
            last_scan TEXT,
            next_scan TEXT,
            idle_cycles INTEGER NOT NULL DEFAULT 0,
            shapley_attribution TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Append-only audit trail (I2): existing rows are never updated.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_trail (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL,
            ts TEXT NOT NULL DEFAULT (datetime('now')),
            action TEXT NOT NULL,
            from_state TEXT,
            to_state TEXT,
            trigger TEXT NOT NULL,
            agent TEXT NOT NULL,
            reason TEXT,
            confidence_delta INTEGER,
            vote_record TEXT,
            FOREIGN KEY (node_id) REFERENCES knowledge_nodes(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS knowledge_dependencies (
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            relation TEXT NOT NULL,
            strength REAL NOT NULL,
            PRIMARY KEY (source_id, target_id),
            FOREIGN KEY (source_id) REFERENCES knowledge_nodes(id) ON DELETE CASCADE,
            FOREIGN KEY (target_id) REFERENCES knowledge_nodes(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checkpoints (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            label TEXT NOT NULL,
            description TEXT,
            state_hash TEXT NOT NULL,
            member_node_ids TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checkpoint_snapshots (
            checkpoint_id TEXT NOT NULL,
            node_id TEXT NOT NULL,
            state TEXT NOT NULL,
            branch TEXT NOT NULL,
            confidence INTEGER NOT NULL,
            velocity REAL NOT NULL,
            priority_queue TEXT NOT NULL,
            audit_trail_length INTEGER NOT NULL,
            PRIMARY KEY (checkpoint_id, node_id),
            FOREIGN KEY (checkpoint_id) REFERENCES checkpoints(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            severity TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS shapley_attributions (
            deliberation_id TEXT NOT NULL,
            member TEXT NOT NULL,
            phi REAL NOT NULL,
            percentage REAL NOT NULL,
            PRIMARY KEY (deliberation_id, member)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            identifier TEXT NOT NULL,
            url TEXT,
            title TEXT,
            authors TEXT NOT NULL DEFAULT '[]',
            trust_score INTEGER NOT NULL,
            retrieved_at TEXT NOT NULL,
            UNIQUE (source_type, identifier)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS deliberations (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            query TEXT NOT NULL,
            payload TEXT NOT NULL,
            total_duration_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_nodes_branch ON knowledge_nodes(branch)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_nodes_queue ON knowledge_nodes(priority_queue)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_nodes_next_scan ON knowledge_nodes(next_scan)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_node ON audit_trail(node_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_deps_source ON knowledge_dependencies(source_id)",
        [],
    )?;

    // Full-text search on node statements.
    conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_nodes_fts USING fts5(
            statement,
            content='knowledge_nodes',
            content_rowid='rowid'
        )",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS nodes_ai AFTER INSERT ON knowledge_nodes BEGIN
            INSERT INTO knowledge_nodes_fts(rowid, statement) VALUES (NEW.rowid, NEW.statement);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS nodes_ad AFTER DELETE ON knowledge_nodes BEGIN
            INSERT INTO knowledge_nodes_fts(knowledge_nodes_fts, rowid, statement) VALUES ('delete', OLD.rowid, OLD.statement);
        END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS nodes_au AFTER UPDATE ON knowledge_nodes BEGIN
            INSERT INTO knowledge_nodes_fts(knowledge_nodes_fts, rowid, statement) VALUES ('delete', OLD.rowid, OLD.statement);
            INSERT INTO knowledge_nodes_fts(rowid, statement) VALUES (NEW.rowid, NEW.statement);
        END",
        [],
    )?;

    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='knowledge_nodes'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_schema() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(is_initialized(&conn));
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_idempotent_initialization() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_wal_mode() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert!(mode == "memory" || mode == "wal");
    }
}
