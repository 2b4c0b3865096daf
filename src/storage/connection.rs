use rusqlite::{Connection, Result as SqlResult};
use std::path::Path;
use std::time::Duration;

// Worker và CLI có thể cùng mở một file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a chat database file in WAL mode.
pub fn open_file<P: AsRef<Path>>(path: P) -> SqlResult<Connection> {
    let conn = Connection::open(path)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("SQLite journal mode: {mode}");
    tune(conn)
}

/// Private in-memory database, used by tests and one-off tooling.
pub fn open_memory() -> SqlResult<Connection> {
    tune(Connection::open_in_memory()?)
}

fn tune(conn: Connection) -> SqlResult<Connection> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_file(dir.path().join("chat.db")).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = open_memory().unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
