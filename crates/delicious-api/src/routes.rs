use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, hearts, reviews, stores};

/// Upper bound on any request body, photo uploads included.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Assemble the whole application: pages, JSON API, auth and uploaded photos.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(stores::index))
        .route("/stores", get(stores::index))
        .route("/stores/page/{page}", get(stores::page))
        .route("/store/{slug}", get(stores::show))
        .route("/tags", get(stores::tags))
        .route("/tags/{tag}", get(stores::tag))
        .route("/top", get(stores::top))
        .route("/map", get(stores::map_page))
        .route("/register", get(auth::register_page).post(auth::register_form))
        .route("/login", get(auth::login_page).post(auth::login_form))
        .route("/logout", get(auth::logout))
        .route("/api/search", get(stores::search))
        .route("/api/stores/near", get(stores::near))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/add", get(stores::add_page).post(stores::create))
        .route("/add/{id}", post(stores::update))
        .route("/stores/{id}/edit", get(stores::edit_page))
        .route("/reviews/{id}", post(reviews::add_review))
        .route("/hearts", get(hearts::hearts_page))
        .route("/api/stores/{id}/heart", post(hearts::heart_store))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let uploads = ServeDir::new(state.photos.dir());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
