use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Location, Store};

// -- JWT Claims --

/// Session claims carried in the bearer token or the `token` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub name: String,
    pub token: String,
}

// -- Search --

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// A text-search hit: the store plus its relevance score (higher is better).
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub store: Store,
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub lat: f64,
    pub lng: f64,
}

/// Trimmed store projection returned by the geo-near endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyStore {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub location: Location,
    pub photo: Option<String>,
    /// Great-circle distance from the query point, in metres.
    pub distance: f64,
}

// -- Reviews --

#[derive(Debug, Deserialize)]
pub struct ReviewForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rating: String,
}
