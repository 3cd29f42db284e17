use std::sync::Arc;

use delicious_db::Database;
use tracing::error;

use crate::error::ApiError;
use crate::photos::PhotoStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub photos: PhotoStore,
}

/// Run a blocking database call off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("database task failed".to_string())
        })?
        .map_err(ApiError::from)
}
