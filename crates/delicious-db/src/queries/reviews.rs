use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use delicious_types::models::{Author, Review};
use rusqlite::params;
use uuid::Uuid;

use super::uuid_at;
use crate::Database;
use crate::models::NewReview;

impl Database {
    // -- Reviews --

    pub fn create_review(&self, new: &NewReview) -> Result<Review> {
        let id = Uuid::new_v4();
        let created = Utc::now();

        let author_name = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO reviews (id, store_id, author_id, text, rating, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    new.store.to_string(),
                    new.author.to_string(),
                    new.text,
                    new.rating,
                    created,
                ],
            )?;
            let name: String = conn
                .query_row(
                    "SELECT name FROM users WHERE id = ?1",
                    [new.author.to_string()],
                    |row| row.get(0),
                )
                .map_err(|_| anyhow!("User not found: {}", new.author))?;
            Ok(name)
        })?;

        Ok(Review {
            id,
            store: new.store,
            author: Author {
                id: new.author,
                name: author_name,
            },
            text: new.text.clone(),
            rating: new.rating,
            created,
        })
    }

    /// Reviews for a store, newest first, each with its author populated.
    pub fn reviews_for_store(&self, store_id: Uuid) -> Result<Vec<Review>> {
        self.with_conn(|conn| {
            // JOIN users so every review comes back with its author
            let mut stmt = conn.prepare(
                "SELECT r.id, r.store_id, r.author_id, u.name, r.text, r.rating, r.created_at
                 FROM reviews r
                 LEFT JOIN users u ON r.author_id = u.id
                 WHERE r.store_id = ?1
                 ORDER BY r.created_at DESC, r.rowid DESC",
            )?;

            let reviews = stmt
                .query_map([store_id.to_string()], |row| {
                    Ok(Review {
                        id: uuid_at(row, 0)?,
                        store: uuid_at(row, 1)?,
                        author: Author {
                            id: uuid_at(row, 2)?,
                            name: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
                        },
                        text: row.get(4)?,
                        rating: row.get(5)?,
                        created: row.get::<_, DateTime<Utc>>(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(reviews)
        })
    }
}
