use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::info;
use uuid::Uuid;

/// Single-connection bear store.
pub struct BearsDb {
    conn: Mutex<Connection>,
}

impl BearsDb {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bears (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        info!("Bears database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert_bear(&self, name: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        conn.execute(
            "INSERT INTO bears (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id.to_string(), name, Utc::now()],
        )?;
        Ok(id)
    }

    pub fn bear_names(&self) -> Result<Vec<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        let mut stmt = conn.prepare("SELECT name FROM bears ORDER BY created_at, rowid")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_bears_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = BearsDb::open(&dir.path().join("bears.db")).unwrap();
        db.insert_bear("Klaus").unwrap();
        db.insert_bear("Paddington").unwrap();
        assert_eq!(db.bear_names().unwrap(), vec!["Klaus", "Paddington"]);
    }
}
