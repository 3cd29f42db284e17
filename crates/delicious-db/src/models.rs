/// Row and input types for the db layer.
/// Read models shared with the API live in delicious-types.
use delicious_types::models::{Location, User};
use uuid::Uuid;

pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password: String,
}

impl UserRow {
    pub fn into_user(self, hearts: Vec<Uuid>) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            hearts,
        }
    }
}

/// Fields for a store insert. The slug is derived from `name` at write time.
#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub location: Location,
    pub photo: Option<String>,
    pub author: Uuid,
}

/// Replacement fields for a store update. `photo: None` keeps the current photo.
#[derive(Debug, Clone)]
pub struct StoreChanges {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub location: Location,
    pub photo: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub store: Uuid,
    pub author: Uuid,
    pub text: String,
    pub rating: u8,
}
