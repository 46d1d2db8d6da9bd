//! REST terminus against an in-process mock server

use axum::{
    body::{Body, Bytes},
    extract::Path,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::time::Duration;

use indirector_core::{
    Format, IndirectorError, Instance, Method, ModelSpec, Options, Request, Terminus,
    DEFAULT_FORMATS,
};
use indirector_termini::RestTerminus;

async fn find_widget(Path(key): Path<String>, headers: HeaderMap) -> Response {
    match key.as_str() {
        "w1" => Json(json!({"name": "w1", "color": "red"})).into_response(),
        "accept" => {
            let accept = headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Json(json!({"name": "accept", "accept": accept})).into_response()
        }
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "bare" => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from("{}"))
            .unwrap(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn post_widget(Path(key): Path<String>, body: Bytes) -> Response {
    Json(json!({"name": key, "method": "post", "body_length": body.len()})).into_response()
}

async fn put_widget(Path(key): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != "application/json" {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }
    let mut data: serde_json::Value = serde_json::from_slice(&body).unwrap();
    data["stored_as"] = json!(key);
    Json(data).into_response()
}

async fn delete_widget(Path(key): Path<String>) -> Response {
    if key == "w1" {
        Json(json!({"name": "w1", "color": "red"})).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn search_widgets() -> Response {
    Json(json!([
        {"name": "w1", "color": "red"},
        {"name": "w2", "color": "blue"}
    ]))
    .into_response()
}

async fn spawn_mock() -> String {
    let app = Router::new()
        .route(
            "/puppet/v3/widget/:key",
            get(find_widget)
                .head(find_widget)
                .post(post_widget)
                .put(put_widget)
                .delete(delete_widget),
        )
        .route("/puppet/v3/widgets/", get(search_widgets));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn terminus(base_url: &str) -> RestTerminus {
    RestTerminus::new(
        "rest",
        "widget",
        base_url,
        ModelSpec::untyped("widget", DEFAULT_FORMATS),
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn request(method: Method, key: &str, options: Options) -> Request {
    Request::new("widget", method, key, options, None).unwrap()
}

#[tokio::test]
async fn test_find_decodes_by_content_type() {
    let t = terminus(&spawn_mock().await);
    let found = t
        .find(&request(Method::Find, "w1", Options::new().with_environment("production")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.name, "w1");
    assert_eq!(found.data["color"], "red");
}

#[tokio::test]
async fn test_not_found_is_a_miss() {
    let t = terminus(&spawn_mock().await);
    assert!(t.find(&request(Method::Find, "missing", Options::new())).await.unwrap().is_none());
    assert!(!t.head(&request(Method::Head, "missing", Options::new())).await.unwrap());
    assert!(t.destroy(&request(Method::Destroy, "missing", Options::new())).await.unwrap().is_none());
}

#[tokio::test]
async fn test_fail_on_404_raises() {
    let t = terminus(&spawn_mock().await);
    let mut options = Options::new();
    options.fail_on_404 = true;
    let err = t.find(&request(Method::Find, "missing", options)).await.unwrap_err();
    assert!(matches!(err, IndirectorError::Terminus { .. }));
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_server_error_is_terminus_error() {
    let t = terminus(&spawn_mock().await);
    let err = t.find(&request(Method::Find, "broken", Options::new())).await.unwrap_err();
    match err {
        IndirectorError::Terminus { message, .. } => {
            assert!(message.contains("500"));
            assert!(message.contains("boom"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_content_type_is_terminus_error() {
    let t = terminus(&spawn_mock().await);
    let err = t.find(&request(Method::Find, "bare", Options::new())).await.unwrap_err();
    assert!(err.to_string().contains("No content type"));
}

#[tokio::test]
async fn test_accept_header_lists_model_formats_without_yaml() {
    let t = terminus(&spawn_mock().await);
    let found = t.find(&request(Method::Find, "accept", Options::new())).await.unwrap().unwrap();
    assert_eq!(found.data["accept"], "application/json, text/pson");
}

#[tokio::test]
async fn test_long_url_switches_to_post() {
    let t = terminus(&spawn_mock().await);
    let options = Options::new().with_param("facts", "x".repeat(3000));
    let found = t.find(&request(Method::Find, "long", options)).await.unwrap().unwrap();
    assert_eq!(found.data["method"], "post");
    assert!(found.data["body_length"].as_u64().unwrap() > 3000);
}

#[tokio::test]
async fn test_save_sends_json_body() {
    let t = terminus(&spawn_mock().await);
    let instance = Instance::new("w2", json!({"name": "w2", "color": "blue"}));
    let save = Request::new("widget", Method::Save, "w2", Options::new(), Some(instance)).unwrap();
    let saved = t.save(&save).await.unwrap();
    assert_eq!(saved.data["stored_as"], "w2");
    assert_eq!(saved.data["color"], "blue");
}

#[tokio::test]
async fn test_search_uses_plural_name() {
    let t = terminus(&spawn_mock().await);
    let found = t.search(&request(Method::Search, "", Options::new())).await.unwrap();
    let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["w1", "w2"]);
}

#[tokio::test]
async fn test_unreachable_server_is_terminus_error() {
    let t = terminus("http://127.0.0.1:1");
    let err = t.find(&request(Method::Find, "w1", Options::new())).await.unwrap_err();
    assert!(matches!(err, IndirectorError::Terminus { .. }));
}

#[test]
fn test_base_url_drops_trailing_slash() {
    let t = RestTerminus::new(
        "rest",
        "certificate",
        "https://puppet:8140/",
        ModelSpec::untyped("certificate", &[Format::Text]),
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
    .unwrap();
    assert_eq!(t.base_url(), "https://puppet:8140");
}
