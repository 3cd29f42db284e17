use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use delicious_api::photos::PhotoStore;
use delicious_api::{AppState, AppStateInner, router};
use delicious_db::Database;
use delicious_db::models::NewStore;
use delicious_types::api::AuthResponse;
use delicious_types::models::{Location, Store, User};

const BOUNDARY: &str = "XdeliciousX";

struct TestApp {
    _dir: TempDir,
    state: AppState,
    app: Router,
}

async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("test.db")).unwrap();
    let photos = PhotoStore::new(dir.path().join("uploads")).await.unwrap();
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: "test-secret".to_string(),
        photos,
    });
    let app = router(state.clone());
    TestApp { _dir: dir, state, app }
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    async fn register(&self, name: &str, email: &str) -> AuthResponse {
        let req = json_request(
            "/api/auth/register",
            json!({ "name": name, "email": email, "password": "password123" }),
        );
        let (status, _, body) = self.send(req).await;
        assert_eq!(status, StatusCode::CREATED);
        serde_json::from_slice(&body).unwrap()
    }

    fn seed_store(&self, author: Uuid, name: &str) -> Store {
        self.state
            .db
            .create_store(&NewStore {
                name: name.to_string(),
                description: format!("{} serves great coffee", name),
                tags: vec!["Wifi".to_string()],
                location: Location::point(-79.8, 43.2, "1 King St"),
                photo: None,
                author,
            })
            .unwrap()
    }

    fn upload_count(&self) -> usize {
        std::fs::read_dir(self.state.photos.dir()).unwrap().count()
    }
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut req = Request::get(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    req.body(Body::empty()).unwrap()
}

fn post_empty(uri: &str, token: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn multipart_request(uri: &str, token: &str, fields: &[(&str, &str)], photo: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((content_type, data)) = photo {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn location(headers: &axum::http::HeaderMap) -> &str {
    headers.get(header::LOCATION).unwrap().to_str().unwrap()
}

/// The `flash=...` pair from a response's Set-Cookie headers.
fn flash_cookie(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("flash="))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn png_upload() -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(4, 4)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

const STORE_FIELDS: [(&str, &str); 6] = [
    ("name", "Bean There"),
    ("description", "Small batch coffee"),
    ("tags", "Wifi"),
    ("address", "12 James St N"),
    ("lng", "-79.87"),
    ("lat", "43.25"),
];

#[tokio::test]
async fn register_and_login_over_json() {
    let app = spawn_app().await;
    let auth = app.register("Wes", "Wes@Example.com").await;
    assert_eq!(auth.name, "Wes");

    // same email, different case
    let (status, _, _) = app
        .send(json_request(
            "/api/auth/register",
            json!({ "name": "Other", "email": "wes@example.com", "password": "password123" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = app
        .send(json_request(
            "/api/auth/login",
            json!({ "email": "wes@example.com", "password": "wrong-password" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = app
        .send(json_request(
            "/api/auth/login",
            json!({ "email": "wes@example.com", "password": "password123" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let login: AuthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(login.user_id, auth.user_id);
}

#[tokio::test]
async fn short_passwords_are_rejected() {
    let app = spawn_app().await;
    let (status, _, _) = app
        .send(json_request(
            "/api/auth/register",
            json!({ "name": "Wes", "email": "wes@example.com", "password": "short" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = spawn_app().await;

    let (status, headers, _) = app.send(get("/add", None)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/login");

    let req = Request::post(format!("/api/stores/{}/heart", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_cookie_is_accepted() {
    let app = spawn_app().await;
    let auth = app.register("Wes", "wes@example.com").await;

    let req = Request::get("/add")
        .header(header::COOKIE, format!("token={}", auth.token))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Add Store"));
}

#[tokio::test]
async fn create_store_and_view_it() {
    let app = spawn_app().await;
    let auth = app.register("Wes", "wes@example.com").await;

    let (status, headers, _) = app
        .send(multipart_request("/add", &auth.token, &STORE_FIELDS, None))
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/store/bean-there");
    let flash = flash_cookie(&headers).unwrap();

    let (status, _, body) = app.send(get_with_cookie("/store/bean-there", &flash)).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("Successfully Created Bean There. Care to leave a review?"));
    assert!(html.contains("Bean There"));
    assert!(html.contains("Added by Wes"));

    let (status, _, _) = app.send(get("/store/nowhere", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_image_uploads_are_rejected_without_writing() {
    let app = spawn_app().await;
    let auth = app.register("Wes", "wes@example.com").await;

    let (status, _, body) = app
        .send(multipart_request(
            "/add",
            &auth.token,
            &STORE_FIELDS,
            Some(("text/plain", b"just some text")),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8(body).unwrap(), "That filetype isn't allowed!");
    assert_eq!(app.upload_count(), 0);
    assert_eq!(app.state.db.count_stores().unwrap(), 0);
}

#[tokio::test]
async fn failed_store_write_discards_the_uploaded_photo() {
    let app = spawn_app().await;
    // valid signature, but no such user row for the store's author
    let token = delicious_api::auth::create_token("test-secret", Uuid::new_v4(), "Ghost").unwrap();

    let png = png_upload();
    let (status, _, _) = app
        .send(multipart_request("/add", &token, &STORE_FIELDS, Some(("image/png", &png))))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.upload_count(), 0);
    assert_eq!(app.state.db.count_stores().unwrap(), 0);
}

#[tokio::test]
async fn register_form_reports_a_taken_email() {
    let app = spawn_app().await;
    app.register("Wes", "wes@example.com").await;

    let req = Request::post("/register")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "name=Other&email=WES%40example.com&password=password123&password-confirm=password123",
        ))
        .unwrap();
    let (status, headers, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(headers.get(header::SET_COOKIE).is_none());
    assert!(String::from_utf8(body).unwrap().contains("That email is already registered"));
}

#[tokio::test]
async fn only_the_author_can_edit() {
    let app = spawn_app().await;
    let owner = app.register("Owner", "owner@example.com").await;
    let other = app.register("Other", "other@example.com").await;
    let store = app.seed_store(owner.user_id, "Owner's Cafe");

    let edit = format!("/stores/{}/edit", store.id);
    let (status, _, body) = app.send(get(&edit, Some(&other.token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(String::from_utf8(body).unwrap(), "You must own a store in order to edit it!");

    let update = format!("/add/{}", store.id);
    let (status, _, _) = app
        .send(multipart_request(&update, &other.token, &STORE_FIELDS, None))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = app.send(get(&edit, Some(&owner.token))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, _) = app
        .send(multipart_request(&update, &owner.token, &STORE_FIELDS, None))
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), edit);
    assert!(flash_cookie(&headers).is_some());
    let updated = app.state.db.get_store(store.id).unwrap().unwrap();
    assert_eq!(updated.slug, "bean-there");

    let missing = format!("/stores/{}/edit", Uuid::new_v4());
    let (status, _, _) = app.send(get(&missing, Some(&owner.token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pages_past_the_end_redirect_to_the_last_page() {
    let app = spawn_app().await;
    let auth = app.register("Wes", "wes@example.com").await;
    for i in 0..5 {
        app.seed_store(auth.user_id, &format!("Store {}", i));
    }

    let (status, _, _) = app.send(get("/stores/page/2", None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, _) = app.send(get("/stores/page/9", None)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/stores/page/2");

    // the redirect target shows why the page changed, once
    let flash = flash_cookie(&headers).unwrap();
    let (status, headers, body) = app.send(get_with_cookie("/stores/page/2", &flash)).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("Hey! You asked for page 9."));
    assert!(html.contains("So I put you on page 2"));
    let cleared = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with("flash=") && v.contains("Max-Age=0"));
    assert!(cleared);

    let (_, _, body) = app.send(get("/stores/page/2", None)).await;
    assert!(!String::from_utf8(body).unwrap().contains("You asked for page"));

    let (status, _, _) = app.send(get("/stores/page/two", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn heart_toggles_and_returns_the_user() {
    let app = spawn_app().await;
    let auth = app.register("Wes", "wes@example.com").await;
    let store = app.seed_store(auth.user_id, "Hearty");
    let uri = format!("/api/stores/{}/heart", store.id);

    let (status, _, body) = app.send(post_empty(&uri, &auth.token)).await;
    assert_eq!(status, StatusCode::OK);
    let user: User = serde_json::from_slice(&body).unwrap();
    assert_eq!(user.hearts, vec![store.id]);

    let (_, _, body) = app.send(post_empty(&uri, &auth.token)).await;
    let user: User = serde_json::from_slice(&body).unwrap();
    assert!(user.hearts.is_empty());

    let missing = format!("/api/stores/{}/heart", Uuid::new_v4());
    let (status, _, _) = app.send(post_empty(&missing, &auth.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_and_near_return_json() {
    let app = spawn_app().await;
    let auth = app.register("Wes", "wes@example.com").await;
    let store = app.seed_store(auth.user_id, "Coffee Corner");

    let (status, _, body) = app.send(get("/api/search?q=coffee", None)).await;
    assert_eq!(status, StatusCode::OK);
    let hits: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["slug"], "coffee-corner");
    assert!(hits[0]["score"].is_number());

    let (_, _, body) = app.send(get("/api/search?q=", None)).await;
    assert_eq!(serde_json::from_slice::<Vec<Value>>(&body).unwrap().len(), 0);

    let (status, _, body) = app.send(get("/api/stores/near?lat=43.21&lng=-79.81", None)).await;
    assert_eq!(status, StatusCode::OK);
    let near: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(near.len(), 1);
    assert_eq!(near[0]["id"], store.id.to_string());
    assert!(near[0]["distance"].as_f64().unwrap() < 10_000.0);

    let (status, _, _) = app.send(get("/api/stores/near?lat=123&lng=0", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reviews_redirect_back_to_the_store() {
    let app = spawn_app().await;
    let auth = app.register("Wes", "wes@example.com").await;
    let store = app.seed_store(auth.user_id, "Reviewed");
    let uri = format!("/reviews/{}", store.id);

    let form = |body: &'static str| {
        Request::post(uri.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {}", auth.token))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    };

    let (status, headers, _) = app.send(form("text=Lovely+place&rating=4")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/store/reviewed");

    let (status, _, _) = app.send(form("text=Lovely+place&rating=9")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = app.send(get("/store/reviewed", None)).await;
    assert!(String::from_utf8(body).unwrap().contains("Lovely place"));
}

#[tokio::test]
async fn tag_page_lists_counts() {
    let app = spawn_app().await;
    let auth = app.register("Wes", "wes@example.com").await;
    app.seed_store(auth.user_id, "Tagged");

    let (status, _, body) = app.send(get("/tags/Wifi", None)).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("tag__link--active"));
    assert!(html.contains("Tagged"));
}
