use anyhow::Result;
use chrono::Utc;
use delicious_types::models::{Author, User};
use rusqlite::{Connection, ErrorCode, params};
use thiserror::Error;
use uuid::Uuid;

use super::{OptionalExt, uuid_at};
use crate::Database;
use crate::models::UserRow;

/// Returned by `create_user` when the email is already registered.
#[derive(Debug, Error)]
#[error("email already registered: {email}")]
pub struct EmailTaken {
    pub email: String,
}

impl Database {
    // -- Users --

    /// Insert a user. Fails with [`EmailTaken`] if the email is in use.
    pub fn create_user(&self, email: &str, name: &str, password_hash: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, name, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), email, name, password_hash, Utc::now()],
            )
            .map_err(|e| {
                if is_email_conflict(&e) {
                    anyhow::Error::new(EmailTaken {
                        email: email.to_string(),
                    })
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })?;
        Ok(id)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    /// The public user with their hearted store ids.
    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let Some(row) = query_user(conn, "id = ?1", &id.to_string())? else {
                return Ok(None);
            };
            let hearts = query_hearts(conn, &id)?;
            Ok(Some(row.into_user(hearts)))
        })
    }

    pub fn get_author(&self, id: Uuid) -> Result<Option<Author>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name FROM users WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Author {
                        id: uuid_at(row, 0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Hearts --

    /// Toggle a heart: removes it if present, adds it if not.
    /// Returns true when the heart was added.
    pub fn toggle_heart(&self, user_id: Uuid, store_id: Uuid) -> Result<bool> {
        let (uid, sid) = (user_id.to_string(), store_id.to_string());
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM hearts WHERE user_id = ?1 AND store_id = ?2",
                params![uid, sid],
            )?;
            if removed > 0 {
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO hearts (user_id, store_id, created_at) VALUES (?1, ?2, ?3)",
                params![uid, sid, Utc::now()],
            )?;
            Ok(true)
        })
    }

    pub fn hearts_for(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_hearts(conn, &user_id))
    }
}

fn is_email_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == ErrorCode::ConstraintViolation && msg.contains("users.email")
    )
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT id, email, name, password FROM users WHERE {predicate}");
    conn.query_row(&sql, [value], |row| {
        Ok(UserRow {
            id: uuid_at(row, 0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            password: row.get(3)?,
        })
    })
    .optional()
}

fn query_hearts(conn: &Connection, user_id: &Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT store_id FROM hearts WHERE user_id = ?1 ORDER BY created_at, rowid",
    )?;
    let hearts = stmt
        .query_map([user_id.to_string()], |row| uuid_at(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(hearts)
}
