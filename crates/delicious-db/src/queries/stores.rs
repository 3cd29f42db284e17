use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use delicious_types::api::NearbyStore;
use delicious_types::models::{Location, Store, StoreDetail, TagCount, TopStore};
use rusqlite::{Connection, ErrorCode, Row, params, params_from_iter};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{OptionalExt, placeholders, uuid_at};
use crate::Database;
use crate::geo::{self, BoundingBox};
use crate::models::{NewStore, StoreChanges};
use crate::slug::{self, MAX_SLUG_ATTEMPTS, SlugConflict};

const STORE_COLUMNS: &str = "s.id, s.name, s.slug, s.description, s.address, s.lng, s.lat, s.photo, \
     s.author_id, s.created_at, (SELECT COUNT(*) FROM reviews r WHERE r.store_id = s.id)";

impl Database {
    // -- Writes --

    /// Insert a store, assigning it a unique slug.
    pub fn create_store(&self, new: &NewStore) -> Result<Store> {
        let id = Uuid::new_v4();
        let created = Utc::now();
        let tags = dedup_tags(&new.tags);

        let slug = self.with_conn_mut(|conn| {
            with_unique_slug(conn, &new.name, None, |conn, slug| {
                conn.execute(
                    "INSERT INTO stores (id, name, slug, description, address, lng, lat, photo, author_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        id.to_string(),
                        new.name,
                        slug,
                        new.description,
                        new.location.address,
                        new.location.lng(),
                        new.location.lat(),
                        new.photo,
                        new.author.to_string(),
                        created,
                    ],
                )?;
                replace_tags(conn, &id, &tags)
            })
        })?;

        debug!("Created store {} with slug {}", id, slug);
        Ok(Store {
            id,
            name: new.name.clone(),
            slug,
            description: new.description.clone(),
            tags,
            created,
            location: Location::point(new.location.lng(), new.location.lat(), new.location.address.clone()),
            photo: new.photo.clone(),
            author: new.author,
            review_count: 0,
        })
    }

    /// Replace a store's editable fields. The slug is recomputed only when
    /// the name changes. Returns `None` if the store does not exist.
    pub fn update_store(&self, id: Uuid, changes: &StoreChanges) -> Result<Option<Store>> {
        let tags = dedup_tags(&changes.tags);
        let id_str = id.to_string();

        self.with_conn_mut(|conn| {
            let current: Option<(String, String)> = conn
                .query_row(
                    "SELECT name, slug FROM stores WHERE id = ?1",
                    [&id_str],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((current_name, current_slug)) = current else {
                return Ok(None);
            };

            let write = |conn: &Connection, slug: &str| -> rusqlite::Result<()> {
                conn.execute(
                    "UPDATE stores
                     SET name = ?2, slug = ?3, description = ?4, address = ?5, lng = ?6, lat = ?7,
                         photo = COALESCE(?8, photo)
                     WHERE id = ?1",
                    params![
                        id_str,
                        changes.name,
                        slug,
                        changes.description,
                        changes.location.address,
                        changes.location.lng(),
                        changes.location.lat(),
                        changes.photo,
                    ],
                )?;
                replace_tags(conn, &id, &tags)
            };

            if current_name == changes.name {
                let tx = conn.unchecked_transaction()?;
                write(&tx, &current_slug)?;
                tx.commit()?;
            } else {
                with_unique_slug(conn, &changes.name, Some(id_str.as_str()), write)?;
            }

            let mut store = query_store(conn, "s.id = ?1", &id_str)?
                .ok_or_else(|| anyhow!("Store vanished during update: {}", id))?;
            attach_tags(conn, std::slice::from_mut(&mut store))?;
            Ok(Some(store))
        })
    }

    // -- Reads --

    pub fn get_store(&self, id: Uuid) -> Result<Option<Store>> {
        self.with_conn(|conn| {
            let mut store = query_store(conn, "s.id = ?1", &id.to_string())?;
            if let Some(store) = store.as_mut() {
                attach_tags(conn, std::slice::from_mut(store))?;
            }
            Ok(store)
        })
    }

    pub fn get_store_by_slug(&self, slug: &str) -> Result<Option<Store>> {
        self.with_conn(|conn| {
            let mut store = query_store(conn, "s.slug = ?1", slug)?;
            if let Some(store) = store.as_mut() {
                attach_tags(conn, std::slice::from_mut(store))?;
            }
            Ok(store)
        })
    }

    /// A store with its author and reviews populated.
    pub fn store_detail(&self, slug: &str) -> Result<Option<StoreDetail>> {
        let Some(store) = self.get_store_by_slug(slug)? else {
            return Ok(None);
        };
        let author = self.get_author(store.author)?;
        let reviews = self.reviews_for_store(store.id)?;
        Ok(Some(StoreDetail {
            store,
            author,
            reviews,
        }))
    }

    /// Newest stores first.
    pub fn list_stores(&self, skip: u32, limit: u32) -> Result<Vec<Store>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {STORE_COLUMNS} FROM stores s
                 ORDER BY s.created_at DESC, s.rowid DESC
                 LIMIT ?1 OFFSET ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut stores = stmt
                .query_map(params![limit, skip], map_store)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            attach_tags(conn, &mut stores)?;
            Ok(stores)
        })
    }

    pub fn count_stores(&self) -> Result<u32> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row("SELECT COUNT(*) FROM stores", [], |r| r.get(0))?;
            Ok(count)
        })
    }

    /// Stores carrying `tag`, or every store when no tag is given.
    pub fn stores_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>> {
        self.with_conn(|conn| {
            let filter = match tag {
                Some(_) => "WHERE EXISTS (SELECT 1 FROM store_tags t WHERE t.store_id = s.id AND t.tag = ?1)",
                None => "",
            };
            let sql = format!(
                "SELECT {STORE_COLUMNS} FROM stores s {filter}
                 ORDER BY s.created_at DESC, s.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = match tag {
                Some(tag) => stmt.query_map([tag], map_store)?,
                None => stmt.query_map([], map_store)?,
            };
            let mut stores = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            attach_tags(conn, &mut stores)?;
            Ok(stores)
        })
    }

    /// Every tag with the number of stores using it, most used first.
    pub fn tag_counts(&self) -> Result<Vec<TagCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT tag, COUNT(*) AS count FROM store_tags
                 GROUP BY tag
                 ORDER BY count DESC, tag ASC",
            )?;
            let tags = stmt
                .query_map([], |row| {
                    Ok(TagCount {
                        tag: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tags)
        })
    }

    /// Full-text search over name and description. Returns stores with a
    /// relevance score, best first.
    pub fn search_stores(&self, query: &str, limit: u32) -> Result<Vec<(Store, f64)>> {
        let Some(match_expr) = fts_query(query) else {
            return Ok(vec![]);
        };

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {STORE_COLUMNS}, bm25(stores_fts) AS relevance
                 FROM stores_fts
                 JOIN stores s ON s.rowid = stores_fts.rowid
                 WHERE stores_fts MATCH ?1
                 ORDER BY relevance
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map(params![match_expr, limit], |row| {
                    let store = map_store(row)?;
                    let relevance: f64 = row.get(11)?;
                    // bm25 is lower-is-better; flip it so callers sort descending
                    Ok((store, -relevance))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let (mut stores, scores): (Vec<Store>, Vec<f64>) = hits.into_iter().unzip();
            attach_tags(conn, &mut stores)?;
            Ok(stores.into_iter().zip(scores).collect())
        })
    }

    /// Stores within `radius_m` metres of the point, nearest first.
    pub fn stores_near(&self, lat: f64, lng: f64, radius_m: f64, limit: usize) -> Result<Vec<NearbyStore>> {
        let bbox = BoundingBox::around(lat, lng, radius_m);

        let candidates = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {STORE_COLUMNS} FROM stores s
                 WHERE s.lat BETWEEN ?1 AND ?2 AND s.lng BETWEEN ?3 AND ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let stores = stmt
                .query_map(
                    params![bbox.min_lat, bbox.max_lat, bbox.min_lng, bbox.max_lng],
                    map_store,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(stores)
        })?;

        let mut nearby: Vec<NearbyStore> = candidates
            .into_iter()
            .filter_map(|s| {
                let distance = geo::haversine_m(lat, lng, s.location.lat(), s.location.lng());
                (distance <= radius_m).then(|| NearbyStore {
                    id: s.id,
                    slug: s.slug,
                    name: s.name,
                    description: s.description,
                    location: s.location,
                    photo: s.photo,
                    distance,
                })
            })
            .collect();

        nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        nearby.truncate(limit);
        Ok(nearby)
    }

    /// Stores with at least two reviews ranked by mean rating.
    pub fn top_stores(&self, limit: u32) -> Result<Vec<TopStore>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.name, s.slug, s.photo, COUNT(r.id) AS review_count, AVG(r.rating) AS average
                 FROM stores s
                 JOIN reviews r ON r.store_id = s.id
                 GROUP BY s.id
                 HAVING COUNT(r.id) >= 2
                 ORDER BY average DESC, review_count DESC
                 LIMIT ?1",
            )?;
            let stores = stmt
                .query_map([limit], |row| {
                    Ok(TopStore {
                        id: uuid_at(row, 0)?,
                        name: row.get(1)?,
                        slug: row.get(2)?,
                        photo: row.get(3)?,
                        review_count: row.get(4)?,
                        average_rating: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(stores)
        })
    }

    /// Stores the user has hearted, most recently hearted first.
    pub fn hearted_stores(&self, user_id: Uuid) -> Result<Vec<Store>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {STORE_COLUMNS} FROM stores s
                 JOIN hearts h ON h.store_id = s.id
                 WHERE h.user_id = ?1
                 ORDER BY h.created_at DESC, h.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut stores = stmt
                .query_map([user_id.to_string()], map_store)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            attach_tags(conn, &mut stores)?;
            Ok(stores)
        })
    }
}

/// Run `write` inside a transaction with the first free slug derived from
/// `name`. The count of existing matches picks the first candidate; a UNIQUE
/// violation on `stores.slug` rolls back and tries the next suffix.
fn with_unique_slug<F>(conn: &Connection, name: &str, exclude_id: Option<&str>, mut write: F) -> Result<String>
where
    F: FnMut(&Connection, &str) -> rusqlite::Result<()>,
{
    let base = slug::slugify(name);
    let collisions = count_slug_collisions(conn, &base, exclude_id)?;

    for attempt in 0..MAX_SLUG_ATTEMPTS {
        let candidate = slug::candidate(&base, collisions, attempt);
        let tx = conn.unchecked_transaction()?;
        match write(&tx, &candidate) {
            Ok(()) => {
                tx.commit()?;
                return Ok(candidate);
            }
            Err(e) if is_slug_conflict(&e) => {
                warn!("Slug {} already taken, retrying", candidate);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(SlugConflict {
        base,
        attempts: MAX_SLUG_ATTEMPTS,
    }
    .into())
}

fn count_slug_collisions(conn: &Connection, base: &str, exclude_id: Option<&str>) -> Result<usize> {
    let pattern = format!("{}%", escape_like(base));
    let mut stmt = conn.prepare("SELECT slug FROM stores WHERE slug LIKE ?1 ESCAPE '\\' AND id != ?2")?;
    let existing = stmt
        .query_map(params![pattern, exclude_id.unwrap_or("")], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(slug::count_collisions(base, existing.iter().map(String::as_str)))
}

fn is_slug_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == ErrorCode::ConstraintViolation && msg.contains("stores.slug")
    )
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn replace_tags(conn: &Connection, store_id: &Uuid, tags: &[String]) -> rusqlite::Result<()> {
    let id = store_id.to_string();
    conn.execute("DELETE FROM store_tags WHERE store_id = ?1", [&id])?;
    let mut stmt = conn.prepare("INSERT INTO store_tags (store_id, tag, position) VALUES (?1, ?2, ?3)")?;
    for (position, tag) in tags.iter().enumerate() {
        stmt.execute(params![id, tag, position as i64])?;
    }
    Ok(())
}

/// Trim tags, drop blanks and repeats, keep first-seen order.
fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Build an FTS5 MATCH expression that ORs every word of the query.
/// Words are quoted so user input can never form FTS syntax.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

fn map_store(row: &Row<'_>) -> rusqlite::Result<Store> {
    let lng: f64 = row.get(5)?;
    let lat: f64 = row.get(6)?;
    let address: String = row.get(4)?;
    Ok(Store {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        tags: vec![],
        location: Location::point(lng, lat, address),
        photo: row.get(7)?,
        author: uuid_at(row, 8)?,
        created: row.get::<_, DateTime<Utc>>(9)?,
        review_count: row.get(10)?,
    })
}

fn query_store(conn: &Connection, predicate: &str, value: &str) -> Result<Option<Store>> {
    let sql = format!("SELECT {STORE_COLUMNS} FROM stores s WHERE {predicate}");
    conn.query_row(&sql, [value], map_store).optional()
}

/// Batch-load tags for a set of stores.
fn attach_tags(conn: &Connection, stores: &mut [Store]) -> Result<()> {
    if stores.is_empty() {
        return Ok(());
    }

    let ids: Vec<String> = stores.iter().map(|s| s.id.to_string()).collect();
    let sql = format!(
        "SELECT store_id, tag FROM store_tags WHERE store_id IN ({}) ORDER BY store_id, position",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_store: HashMap<String, Vec<String>> = HashMap::new();
    for (store_id, tag) in rows {
        by_store.entry(store_id).or_default().push(tag);
    }
    for store in stores.iter_mut() {
        if let Some(tags) = by_store.remove(&store.id.to_string()) {
            store.tags = tags;
        }
    }
    Ok(())
}
