pub mod auth;
pub mod error;
pub mod flash;
pub mod hearts;
pub mod middleware;
pub mod pagination;
pub mod photos;
pub mod reviews;
pub mod routes;
pub mod state;
pub mod stores;
pub mod views;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
