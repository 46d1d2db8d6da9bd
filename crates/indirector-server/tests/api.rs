//! HTTP-level tests for the indirector API
//!
//! Each test drives the router with `oneshot`, so no socket is opened.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request as HttpRequest, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use indirector_core::settings::{AuthRuleConfig, ClientIdentityConfig};
use indirector_core::{
    Capabilities, IndirectionSpec, IndirectorError, Instance, Method, ModelSpec, Options,
    PluralizationRules, Registry, Request, Result, Settings, Terminus, DEFAULT_FORMATS,
};
use indirector_server::{
    create_router, AllowAll, AppState, Authorizer, ClientIdentity, RuleAuthorizer,
    StaticEnvironments,
};
use indirector_termini::{builtin_factories, MemoryTerminus};

// =============================================================================
// Test Helpers
// =============================================================================

/// Memory terminus counting every call it receives
#[derive(Debug, Default)]
struct Spy {
    inner: MemoryTerminus,
    calls: AtomicUsize,
    last_params: Mutex<Vec<(String, String)>>,
}

impl Spy {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, request: &Request) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = request
            .options()
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if request.key() == "boom" {
            return Err(IndirectorError::terminus("disk on fire at /srv/secret"));
        }
        Ok(())
    }
}

#[async_trait]
impl Terminus for Spy {
    fn name(&self) -> &str {
        "spy"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn find(&self, request: &Request) -> Result<Option<Instance>> {
        self.record(request)?;
        self.inner.find(request).await
    }

    async fn search(&self, request: &Request) -> Result<Vec<Instance>> {
        self.record(request)?;
        self.inner.search(request).await
    }

    async fn save(&self, request: &Request) -> Result<Instance> {
        self.record(request)?;
        self.inner.save(request).await
    }

    async fn destroy(&self, request: &Request) -> Result<Option<Instance>> {
        self.record(request)?;
        self.inner.destroy(request).await
    }

    async fn head(&self, request: &Request) -> Result<bool> {
        self.record(request)?;
        self.inner.head(request).await
    }
}

/// Authorizer delegating to another and counting consultations
#[derive(Debug)]
struct CountingAuthorizer {
    inner: Box<dyn Authorizer>,
    calls: AtomicUsize,
}

impl Authorizer for CountingAuthorizer {
    fn authorize(&self, method: Method, path: &str, client: &ClientIdentity) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.authorize(method, path, client)
    }
}

struct TestApp {
    router: axum::Router,
    spy: Arc<Spy>,
    authorizer: Arc<CountingAuthorizer>,
}

fn build_app(authorizer: Box<dyn Authorizer>) -> TestApp {
    let spy = Arc::new(Spy::default());
    let mut factories = builtin_factories();
    factories.register_instance("spy", spy.clone());

    let registry = Registry::new(Arc::new(Settings::default()), factories);
    registry
        .register(
            IndirectionSpec::new("widget", ModelSpec::untyped("widget", DEFAULT_FORMATS))
                .default_terminus_everywhere("spy"),
        )
        .unwrap();
    registry
        .register(
            IndirectionSpec::new("secret", ModelSpec::untyped("secret", DEFAULT_FORMATS))
                .default_terminus_everywhere("disabled"),
        )
        .unwrap();
    registry
        .register(
            IndirectionSpec::new("status", ModelSpec::untyped("status", DEFAULT_FORMATS))
                .default_terminus_everywhere("local"),
        )
        .unwrap();

    let authorizer = Arc::new(CountingAuthorizer {
        inner: authorizer,
        calls: AtomicUsize::new(0),
    });
    let state = AppState {
        registry: Arc::new(registry),
        authorizer: authorizer.clone(),
        environments: Arc::new(StaticEnvironments::new(["production", "development"])),
        rules: PluralizationRules::default(),
        client_identity: ClientIdentityConfig::default(),
    };

    TestApp {
        router: create_router(Arc::new(state)),
        spy,
        authorizer,
    }
}

fn open_app() -> TestApp {
    build_app(Box::new(AllowAll))
}

async fn send(app: &TestApp, request: HttpRequest<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn get(app: &TestApp, uri: &str) -> Response {
    send(app, HttpRequest::get(uri).body(Body::empty()).unwrap()).await
}

async fn put_json(app: &TestApp, uri: &str, body: Value) -> Response {
    send(
        app,
        HttpRequest::put(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = open_app();
    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["indirections"].as_array().unwrap().contains(&json!("widget")));
}

#[tokio::test]
async fn test_save_then_find() {
    let app = open_app();
    let response = put_json(
        &app,
        "/puppet/v3/widget/w1?environment=production",
        json!({"name": "w1", "color": "red"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/puppet/v3/widget/w1?environment=production").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body = body_json(response).await;
    assert_eq!(body, json!({"name": "w1", "color": "red"}));
}

#[tokio::test]
async fn test_keys_with_reserved_characters_are_stored_verbatim() {
    let app = open_app();
    for (raw, key) in [("a=b", "a=b"), ("c++", "c++"), ("x&y", "x&y")] {
        let response = put_json(
            &app,
            &format!("/puppet/v3/widget/{}?environment=production", raw),
            json!({"color": "red"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK, "{}", raw);

        let found = app
            .spy
            .inner
            .find(&Request::new("widget", Method::Find, key, Options::new(), None).unwrap())
            .await
            .unwrap();
        assert!(found.is_some(), "{} not stored under {:?}", raw, key);
    }

    for truncated in ["a", "c  ", "x"] {
        let found = app
            .spy
            .inner
            .find(&Request::new("widget", Method::Find, truncated, Options::new(), None).unwrap())
            .await
            .unwrap();
        assert!(found.is_none(), "{:?} should not exist", truncated);
    }

    let response = get(&app, "/puppet/v3/widget/c++?environment=production").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_find_miss_is_not_found() {
    let app = open_app();
    let response = get(&app, "/puppet/v3/widget/nope?environment=production").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_search_with_plural_name() {
    let app = open_app();
    for (name, color) in [("w1", "red"), ("w2", "blue")] {
        put_json(
            &app,
            &format!("/puppet/v3/widget/{}?environment=production", name),
            json!({"name": name, "color": color}),
        )
        .await;
    }

    let response = get(&app, "/puppet/v3/widgets/?environment=production").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["w1", "w2"]);
}

#[tokio::test]
async fn test_destroy() {
    let app = open_app();
    put_json(&app, "/puppet/v3/widget/w1?environment=production", json!({"name": "w1"})).await;

    let response = send(
        &app,
        HttpRequest::delete("/puppet/v3/widget/w1?environment=production")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "w1");

    let response = get(&app, "/puppet/v3/widget/w1?environment=production").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_head() {
    let app = open_app();
    put_json(&app, "/puppet/v3/widget/w1?environment=production", json!({"name": "w1"})).await;

    let head = |uri: &'static str| HttpRequest::head(uri).body(Body::empty()).unwrap();
    let response = send(&app, head("/puppet/v3/widget/w1?environment=production")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());

    let response = send(&app, head("/puppet/v3/widget/w2?environment=production")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_find_merges_body_into_options() {
    let app = open_app();
    put_json(&app, "/puppet/v3/widget/w1?environment=production", json!({"name": "w1"})).await;

    let response = send(
        &app,
        HttpRequest::post("/puppet/v3/widget/w1?environment=production")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("facts_format=json&transaction_uuid=abc"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let params = app.spy.last_params.lock().unwrap().clone();
    assert!(params.contains(&("facts_format".to_string(), "json".to_string())));
    assert!(params.contains(&("transaction_uuid".to_string(), "abc".to_string())));
}

#[tokio::test]
async fn test_yaml_accept() {
    let app = open_app();
    put_json(&app, "/puppet/v3/widget/w1?environment=production", json!({"name": "w1"})).await;

    let response = send(
        &app,
        HttpRequest::get("/puppet/v3/widget/w1?environment=production")
            .header("accept", "text/yaml")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/yaml");
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("name: w1"));
}

#[tokio::test]
async fn test_v1_and_v2_routes() {
    let app = open_app();
    put_json(&app, "/puppet/v3/widget/w1?environment=production", json!({"name": "w1"})).await;

    let response = get(&app, "/production/widget/w1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "w1");

    let response = get(&app, "/staging/widget/w1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app, "/v2.0/environments").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["environments"]["production"].is_object());
    assert!(body["environments"]["development"].is_object());
}

// =============================================================================
// Refusals
// =============================================================================

#[tokio::test]
async fn test_denied_requests_never_reach_terminus() {
    let app = build_app(Box::new(RuleAuthorizer::from_config(&[]).unwrap()));
    let response = get(&app, "/puppet/v3/widget/w1?environment=production").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_bad_environment_is_rejected_before_authorization() {
    let app = open_app();
    for uri in [
        "/puppet/v3/widget/w1?environment=bad!name",
        "/puppet/v3/widget/w1",
    ] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
    assert_eq!(app.authorizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_missing_key_is_rejected_before_authorization() {
    let app = open_app();
    for uri in [
        "/puppet/v3/widget/?environment=production",
        "/puppet/v3/widget?environment=production",
        "/production/widget/",
    ] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
    assert_eq!(app.authorizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_unknown_environment_is_not_found() {
    let app = open_app();
    let response = get(&app, "/puppet/v3/widget/w1?environment=staging").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.authorizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_unacceptable_format() {
    let app = open_app();
    let response = send(
        &app,
        HttpRequest::get("/puppet/v3/widget/w1?environment=production")
            .header("accept", "application/xml")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_unsupported_and_malformed_bodies() {
    let app = open_app();
    let response = send(
        &app,
        HttpRequest::put("/puppet/v3/widget/w1?environment=production")
            .header("content-type", "application/xml")
            .body(Body::from("<widget/>"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = send(
        &app,
        HttpRequest::put("/puppet/v3/widget/w1?environment=production")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_unknown_indirection_and_paths() {
    let app = open_app();
    let response = get(&app, "/puppet/v3/gadget/g1?environment=production").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app, "/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_verb() {
    let app = open_app();
    let response = send(
        &app,
        HttpRequest::patch("/puppet/v3/widget/w1?environment=production")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_plural_put_is_bad_request() {
    let app = open_app();
    let response = put_json(&app, "/puppet/v3/widgets/w1?environment=production", json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remote_access_disallowed() {
    let app = open_app();
    let response = get(&app, "/puppet/v3/secret/s1?environment=production").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_operation_has_no_handler() {
    let app = open_app();
    let response = get(&app, "/puppet/v3/statuses/?environment=production").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "No handler for status");
}

#[tokio::test]
async fn test_backend_failure_hides_detail() {
    let app = open_app();
    let response = get(&app, "/puppet/v3/widget/boom?environment=production").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Internal server error");
    assert!(!body.to_string().contains("/srv/secret"));
}

// =============================================================================
// Client identity
// =============================================================================

#[tokio::test]
async fn test_verified_identity_feeds_backreferences() {
    let rules = RuleAuthorizer::from_config(&[AuthRuleConfig {
        path: "~ ^/puppet/v3/widget/([^/]+)$".into(),
        methods: vec!["find".into()],
        allow: vec!["$1".into()],
        authenticated: Some(true),
    }])
    .unwrap();
    let app = build_app(Box::new(rules));
    app.spy
        .inner
        .save(
            &Request::new(
                "widget",
                Method::Save,
                "agent01",
                Options::new(),
                Some(Instance::new("agent01", json!({"name": "agent01"}))),
            )
            .unwrap(),
        )
        .await
        .unwrap();

    let request = |verify: &str| {
        HttpRequest::get("/puppet/v3/widget/agent01?environment=production")
            .header("X-Client-DN", "/CN=agent01")
            .header("X-Client-Verify", verify)
            .body(Body::empty())
            .unwrap()
    };

    let response = send(&app, request("SUCCESS")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, request("FAILED")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_backreferences_compare_decoded_keys() {
    let rules = RuleAuthorizer::from_config(&[AuthRuleConfig {
        path: "~ ^/puppet/v3/widget/([^/]+)$".into(),
        methods: vec!["find".into()],
        allow: vec!["$1".into()],
        authenticated: Some(true),
    }])
    .unwrap();
    let app = build_app(Box::new(rules));

    let response = send(
        &app,
        HttpRequest::get("/puppet/v3/widget/agent%20one?environment=production")
            .header("X-Client-DN", "/CN=agent one")
            .header("X-Client-Verify", "SUCCESS")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    // Authorized, then a miss in the empty terminus
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.spy.calls(), 1);
}
