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
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                name        TEXT NOT NULL,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE stores (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                slug        TEXT NOT NULL UNIQUE COLLATE NOCASE,
                description TEXT NOT NULL DEFAULT '',
                address     TEXT NOT NULL,
                lng         REAL NOT NULL,
                lat         REAL NOT NULL,
                photo       TEXT,
                author_id   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_stores_created ON stores(created_at);
            CREATE INDEX idx_stores_lat_lng ON stores(lat, lng);

            CREATE TABLE store_tags (
                store_id    TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
                tag         TEXT NOT NULL,
                position    INTEGER NOT NULL,
                PRIMARY KEY (store_id, tag)
            );

            CREATE INDEX idx_store_tags_tag ON store_tags(tag);

            CREATE TABLE reviews (
                id          TEXT PRIMARY KEY,
                store_id    TEXT NOT NULL REFERENCES stores(id),
                author_id   TEXT NOT NULL REFERENCES users(id),
                text        TEXT NOT NULL,
                rating      INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_reviews_store ON reviews(store_id, created_at);

            CREATE TABLE hearts (
                user_id     TEXT NOT NULL REFERENCES users(id),
                store_id    TEXT NOT NULL REFERENCES stores(id),
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, store_id)
            );

            -- Full-text index over name + description, kept in sync by triggers
            CREATE VIRTUAL TABLE stores_fts USING fts5(
                name,
                description,
                content = 'stores',
                content_rowid = 'rowid',
                tokenize = 'porter unicode61'
            );

            CREATE TRIGGER stores_fts_insert AFTER INSERT ON stores BEGIN
                INSERT INTO stores_fts (rowid, name, description)
                    VALUES (new.rowid, new.name, new.description);
            END;

            CREATE TRIGGER stores_fts_delete AFTER DELETE ON stores BEGIN
                INSERT INTO stores_fts (stores_fts, rowid, name, description)
                    VALUES ('delete', old.rowid, old.name, old.description);
            END;

            CREATE TRIGGER stores_fts_update AFTER UPDATE OF name, description ON stores BEGIN
                INSERT INTO stores_fts (stores_fts, rowid, name, description)
                    VALUES ('delete', old.rowid, old.name, old.description);
                INSERT INTO stores_fts (rowid, name, description)
                    VALUES (new.rowid, new.name, new.description);
            END;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
