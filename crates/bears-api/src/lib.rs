//! Minimal bears REST API: a welcome route and bear creation under `/api`.

pub mod db;

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{FromRequest, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::db::BearsDb;

pub type AppState = Arc<BearsDb>;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub message: String,
}

impl Message {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum BearsError {
    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for BearsError {
    fn into_response(self) -> Response {
        match self {
            Self::Database(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, Message::new("Internal server error")).into_response()
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, Message::new(&msg)).into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewBear {
    #[serde(default)]
    pub name: String,
}

/// `NewBear` from either a JSON or a url-encoded body.
pub struct BearBody(pub NewBear);

impl<S: Send + Sync> FromRequest<S> for BearBody {
    type Rejection = BearsError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let bear = if is_json {
            let Json(bear) = Json::<NewBear>::from_request(req, state)
                .await
                .map_err(|e| BearsError::BadRequest(e.body_text()))?;
            bear
        } else {
            let Form(bear) = Form::<NewBear>::from_request(req, state)
                .await
                .map_err(|e| BearsError::BadRequest(e.body_text()))?;
            bear
        };
        Ok(Self(bear))
    }
}

async fn log_request(req: Request, next: Next) -> Response {
    info!("Something happening: {} {}", req.method(), req.uri().path());
    next.run(req).await
}

pub async fn welcome() -> Json<Message> {
    Message::new("hooray! welcome to our api!")
}

pub async fn create_bear(
    State(db): State<AppState>,
    BearBody(bear): BearBody,
) -> Result<impl IntoResponse, BearsError> {
    let name = bear.name.trim().to_string();
    if name.is_empty() {
        return Err(BearsError::BadRequest("A bear needs a name".to_string()));
    }

    let id = tokio::task::spawn_blocking(move || db.insert_bear(&name))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;
    info!("Created bear {}", id);

    Ok((StatusCode::CREATED, Message::new("Bear created!")))
}

pub fn router(db: AppState) -> Router {
    Router::new()
        .route("/api", get(welcome))
        .route("/api/", get(welcome))
        .route("/api/bears", post(create_bear))
        .route_layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}
