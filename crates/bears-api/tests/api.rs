use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use bears_api::db::BearsDb;
use bears_api::{Message, router};

fn app() -> (TempDir, Arc<BearsDb>, Router) {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(BearsDb::open(&dir.path().join("bears.db")).unwrap());
    let app = router(db.clone());
    (dir, db, app)
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Message) {
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn post(content_type: &str, body: &'static str) -> Request<Body> {
    Request::post("/api/bears")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn welcome_message() {
    let (_dir, _db, app) = app();
    let req = Request::get("/api/").body(Body::empty()).unwrap();
    let (status, msg) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(msg.message, "hooray! welcome to our api!");
}

#[tokio::test]
async fn creates_bears_from_json_and_forms() {
    let (_dir, db, app) = app();

    let (status, msg) = send(app.clone(), post("application/json", r#"{"name":"Klaus"}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(msg.message, "Bear created!");

    let (status, _) = send(app, post("application/x-www-form-urlencoded", "name=Paddington")).await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(db.bear_names().unwrap(), vec!["Klaus", "Paddington"]);
}

#[tokio::test]
async fn nameless_bears_are_rejected() {
    let (_dir, db, app) = app();
    let (status, _) = send(app.clone(), post("application/json", r#"{"name":"  "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(app, post("application/json", "{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(db.bear_names().unwrap().is_empty());
}
