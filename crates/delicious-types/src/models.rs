use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// GeoJSON-style point. `coordinates` is `[lng, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
    pub address: String,
}

impl Location {
    pub fn point(lng: f64, lat: f64, address: impl Into<String>) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [lng, lat],
            address: address.into(),
        }
    }

    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub location: Location,
    pub photo: Option<String>,
    pub author: Uuid,
    pub review_count: u32,
}

/// Public view of a user. The password hash never leaves the db crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub hearts: Vec<Uuid>,
}

/// The populated `author` of a review or store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub store: Uuid,
    pub author: Author,
    pub text: String,
    pub rating: u8,
    pub created: DateTime<Utc>,
}

/// A store together with its populated author and reviews.
#[derive(Debug, Clone, Serialize)]
pub struct StoreDetail {
    pub store: Store,
    pub author: Option<Author>,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopStore {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub photo: Option<String>,
    pub review_count: u32,
    pub average_rating: f64,
}
