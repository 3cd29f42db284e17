use axum::{
    Extension, Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};
use uuid::Uuid;

use delicious_types::api::Claims;
use delicious_types::models::User;

use crate::error::ApiError;
use crate::state::{AppState, run_db};
use crate::views::{self, Nav, StoreCard, StoresTemplate};

enum HeartOutcome {
    Toggled(User),
    MissingStore,
    MissingUser,
}

/// Add or remove a store from the current user's hearts.
#[instrument(skip_all, fields(user = %claims.sub, store = %store_id))]
pub async fn heart_store(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(store_id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let user_id = claims.sub;
    let outcome = run_db(&state, move |db| {
        if db.get_store(store_id)?.is_none() {
            return Ok(HeartOutcome::MissingStore);
        }
        let added = db.toggle_heart(user_id, store_id)?;
        debug!("Heart {} for store {}", if added { "added" } else { "removed" }, store_id);
        Ok(match db.get_user(user_id)? {
            Some(user) => HeartOutcome::Toggled(user),
            None => HeartOutcome::MissingUser,
        })
    })
    .await?;

    match outcome {
        HeartOutcome::Toggled(user) => Ok(Json(user)),
        HeartOutcome::MissingStore => Err(ApiError::NotFound(format!("store {}", store_id))),
        // token outlived its user
        HeartOutcome::MissingUser => Err(ApiError::Unauthorized),
    }
}

pub async fn hearts_page(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let user_id = claims.sub;
    let stores = run_db(&state, move |db| db.hearted_stores(user_id)).await?;

    let hearts: Vec<Uuid> = stores.iter().map(|s| s.id).collect();
    let cards = StoreCard::list(&stores, Some(&claims), &hearts);
    let page = StoresTemplate::unpaged(Nav::new(Some(&claims)), "Hearted Stores", cards);
    Ok(views::render(&page)?.into_response())
}
