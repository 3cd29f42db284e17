use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use bytes::Bytes;
use futures_util::stream;
use http_body_util::BodyExt;
use tower::ServiceExt;

async fn send(body: Body) -> (StatusCode, String) {
    let req = Request::post("/anything").body(body).unwrap();
    let res = stream_echo::router().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn echoes_json_split_across_chunks() {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"{\"na")),
        Ok(Bytes::from_static(b"me\": \"bear\", ")),
        Ok(Bytes::from_static(b"\"n\": 3}")),
    ];
    let (status, text) = send(Body::from_stream(stream::iter(chunks))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, r#"typeof data is: object and data is {"name":"bear","n":3}"#);
}

#[tokio::test]
async fn scalars_report_their_type() {
    let (status, text) = send(Body::from("42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "typeof data is: number and data is 42");
}

#[tokio::test]
async fn bad_json_is_a_400() {
    let (status, text) = send(Body::from("{oops")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.starts_with("error: "));
}
