#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;

use axum::extract::Path;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use restime_core::{arg, HandlerFailure, MetricTag, RestimeError, TimedResource};
use restime_server::config::ServerConfig;
use restime_server::resources::DemoModule;
use restime_server::{build_app, Binder, ServerModule, TestServer, Timed};

fn demo() -> Vec<Box<dyn ServerModule>> {
    vec![Box::new(DemoModule::default())]
}

async fn metrics_text(server: &TestServer) -> String {
    let resp = reqwest::get(server.url("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    resp.text().await.unwrap()
}

#[tokio::test]
async fn healthz_answers_on_reported_port() {
    let server = TestServer::start(demo()).unwrap();
    let resp = reqwest::get(server.url("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn echo_is_timed_with_raw_tag() {
    let server = TestServer::start(demo()).unwrap();

    let resp = reqwest::get(server.url("/v1/echo/hello")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "hello");

    let text = metrics_text(&server).await;
    assert!(text.contains(
        "restime_resource_requests_total{resource=\"/v1/echo/:word\",metric=\"echo\",method=\"GET\",status=\"200\",class=\"2xx\",word=\"hello\"} 1"
    ));
    assert!(text.contains("# TYPE restime_resource_duration_micros histogram"));
}

#[tokio::test]
async fn create_item_records_owner_tag() {
    let server = TestServer::start(demo()).unwrap();
    let client = Client::new();

    let resp = client
        .post(server.url("/v1/items"))
        .json(&json!({ "ownerId": 7, "name": "lamp" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ownerId"], 7);
    assert_eq!(body["name"], "lamp");

    let text = metrics_text(&server).await;
    assert!(text.contains(
        "restime_resource_requests_total{resource=\"/v1/items\",metric=\"create_item\",method=\"POST\",status=\"201\",class=\"2xx\",owner=\"7\"} 1"
    ));
}

#[tokio::test]
async fn blank_name_is_a_carried_400() {
    let server = TestServer::start(demo()).unwrap();

    let resp = Client::new()
        .post(server.url("/v1/items"))
        .json(&json!({ "ownerId": 1, "name": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "BAD_REQUEST");

    let text = metrics_text(&server).await;
    assert!(text.contains("metric=\"create_item\",method=\"POST\",status=\"400\",class=\"4xx\",owner=\"1\"} 1"));
}

#[tokio::test]
async fn full_store_is_mapped_to_503() {
    let server = TestServer::start(vec![Box::new(DemoModule::with_capacity(1))]).unwrap();
    let client = Client::new();

    for (i, expected) in [StatusCode::CREATED, StatusCode::SERVICE_UNAVAILABLE].into_iter().enumerate() {
        let resp = client
            .post(server.url("/v1/items"))
            .json(&json!({ "ownerId": 3, "name": format!("item-{i}") }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), expected);
    }

    let text = metrics_text(&server).await;
    assert!(text.contains("status=\"201\",class=\"2xx\",owner=\"3\"} 1"));
    assert!(text.contains("status=\"503\",class=\"5xx\",owner=\"3\"} 1"));
}

#[tokio::test]
async fn get_and_delete_items() {
    let server = TestServer::start(demo()).unwrap();
    let client = Client::new();

    let missing = client.get(server.url("/v1/items/99")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let created: Value = client
        .post(server.url("/v1/items"))
        .json(&json!({ "ownerId": 5, "name": "desk" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_u64().unwrap();

    let found = client.get(server.url(&format!("/v1/items/{id}"))).send().await.unwrap();
    assert_eq!(found.status(), StatusCode::OK);
    let item: Value = found.json().await.unwrap();
    assert_eq!(item["name"], "desk");

    let deleted = client.delete(server.url(&format!("/v1/items/{id}"))).send().await.unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = client.delete(server.url(&format!("/v1/items/{id}"))).send().await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let text = metrics_text(&server).await;
    assert!(text.contains("metric=\"get_item\",method=\"GET\",status=\"404\",class=\"4xx\"} 1"));
    assert!(text.contains("metric=\"get_item\",method=\"GET\",status=\"200\",class=\"2xx\"} 1"));
    assert!(text.contains("metric=\"delete_item\",method=\"DELETE\",status=\"204\",class=\"2xx\"} 1"));
    assert!(text.contains("metric=\"delete_item\",method=\"DELETE\",status=\"404\",class=\"4xx\"} 1"));
}

#[tokio::test]
async fn resources_are_listed() {
    let server = TestServer::start(demo()).unwrap();

    let list: Value = reqwest::get(server.url("/v1/resources")).await.unwrap().json().await.unwrap();
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 4);
    assert_eq!(
        list[0],
        json!({ "method": "GET", "path": "/v1/echo/:word", "metric": "echo", "tags": ["word"] })
    );
    assert!(list.contains(&json!({
        "method": "POST", "path": "/v1/items", "metric": "create_item", "tags": ["owner"]
    })));
    assert_eq!(server.state().resources().len(), 4);
    assert!(server.state().resource("DELETE", "/v1/items/:id").is_some());
}

#[derive(Debug, Error)]
#[error("opaque failure")]
struct Opaque;

impl HandlerFailure for Opaque {}

#[derive(Debug, Error)]
#[error("teapot")]
struct Teapot;

impl HandlerFailure for Teapot {}

async fn fail(timed: Timed) -> Response {
    timed.respond(&[], || Err::<&'static str, _>(Opaque))
}

async fn brew(timed: Timed, Path(kind): Path<String>) -> Response {
    timed
        .respond_async(&[arg(&kind)], async { Err::<&'static str, _>(Teapot) })
        .await
}

async fn untimed(_timed: Timed) -> &'static str {
    "no timed call"
}

async fn twice(timed: Timed) -> Response {
    let _first = timed.respond(&[], || Ok::<_, Opaque>("first"));
    timed.respond(&[], || Ok::<_, Opaque>(StatusCode::ACCEPTED))
}

async fn plain() -> &'static str {
    "plain"
}

struct FailingModule;

impl ServerModule for FailingModule {
    fn configure(&self, binder: &mut Binder) {
        binder
            .map_error::<Teapot, _, _>(|_| (StatusCode::IM_A_TEAPOT, "short and stout"))
            .timed(TimedResource::new(Method::GET, "/v1/fail", "fail"), fail)
            .timed(
                TimedResource::new(Method::GET, "/v1/brew/:kind", "brew").tagged(MetricTag::raw("kind")),
                brew,
            )
            .timed(
                TimedResource::new(Method::GET, "/v1/untimed/:id", "untimed").tagged(MetricTag::raw("id")),
                untimed,
            )
            .timed(TimedResource::new(Method::GET, "/v1/twice", "twice"), twice);
    }
}

#[tokio::test]
async fn served_status_matches_recorded_status() {
    let server = TestServer::start(vec![Box::new(FailingModule)]).unwrap();

    let resp = reqwest::get(server.url("/v1/fail")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "INTERNAL_SERVER_ERROR");

    let resp = reqwest::get(server.url("/v1/brew/tea")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(resp.text().await.unwrap(), "short and stout");

    let text = metrics_text(&server).await;
    assert!(text.contains("metric=\"fail\",method=\"GET\",status=\"500\",class=\"5xx\"} 1"));
    assert!(text.contains("metric=\"brew\",method=\"GET\",status=\"418\",class=\"4xx\",kind=\"tea\"} 1"));
}

#[tokio::test]
async fn timed_route_without_timed_call_is_still_recorded() {
    let server = TestServer::start(vec![Box::new(FailingModule)]).unwrap();

    let resp = reqwest::get(server.url("/v1/untimed/1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let text = metrics_text(&server).await;
    assert!(text.contains("metric=\"untimed\",method=\"GET\",status=\"200\",class=\"2xx\",id=\"null\"} 1"));
}

#[tokio::test]
async fn second_timed_call_in_a_request_is_not_recorded() {
    let server = TestServer::start(vec![Box::new(FailingModule)]).unwrap();

    let resp = reqwest::get(server.url("/v1/twice")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let text = metrics_text(&server).await;
    let series: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("restime_resource_requests_total{") && l.contains("metric=\"twice\""))
        .collect();
    assert_eq!(series, ["restime_resource_requests_total{resource=\"/v1/twice\",metric=\"twice\",method=\"GET\",status=\"200\",class=\"2xx\"} 1"]);
}

#[tokio::test]
async fn rejected_request_is_recorded_with_null_tags() {
    let server = TestServer::start(demo()).unwrap();

    let resp = Client::new()
        .post(server.url("/v1/items"))
        .header("content-type", "application/json")
        .body("{")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let text = metrics_text(&server).await;
    assert!(text.contains("metric=\"create_item\",method=\"POST\",status=\"400\",class=\"4xx\",owner=\"null\"} 1"));
}

fn local_cfg() -> ServerConfig {
    ServerConfig::default_for_testing(SocketAddr::from(([127, 0, 0, 1], 0)))
}

fn build_err(module: impl ServerModule + 'static) -> RestimeError {
    build_app(local_cfg(), &[Box::new(module) as Box<dyn ServerModule>])
        .err()
        .expect("must fail")
}

struct Duplicated;

impl ServerModule for Duplicated {
    fn configure(&self, binder: &mut Binder) {
        binder
            .timed(TimedResource::new(Method::GET, "/v1/fail", "first"), fail)
            .timed(TimedResource::new(Method::GET, "/v1/fail", "second"), fail);
    }
}

#[test]
fn duplicate_timed_resources_are_rejected() {
    match build_err(Duplicated) {
        RestimeError::DuplicateResource { method, path } => {
            assert_eq!(method, "GET");
            assert_eq!(path, "/v1/fail");
        }
        other => panic!("unexpected error: {other}"),
    }
}

struct Overlapping;

impl ServerModule for Overlapping {
    fn configure(&self, binder: &mut Binder) {
        binder
            .route(Method::GET, "/v1/thing", plain)
            .timed(TimedResource::new(Method::GET, "/v1/thing", "thing"), fail);
    }
}

struct ShadowsOps;

impl ServerModule for ShadowsOps {
    fn configure(&self, binder: &mut Binder) {
        binder.timed(TimedResource::new(Method::GET, "/metrics", "metrics"), fail);
    }
}

struct ParamNames;

impl ServerModule for ParamNames {
    fn configure(&self, binder: &mut Binder) {
        binder
            .timed(TimedResource::new(Method::GET, "/v1/things/:id", "get"), fail)
            .timed(TimedResource::new(Method::DELETE, "/v1/things/:key", "delete"), fail);
    }
}

#[test]
fn overlapping_routes_fail_the_build() {
    match build_err(Overlapping) {
        RestimeError::DuplicateResource { method, path } => {
            assert_eq!((method.as_str(), path.as_str()), ("GET", "/v1/thing"));
        }
        other => panic!("unexpected error: {other}"),
    }
    match build_err(ShadowsOps) {
        RestimeError::DuplicateResource { path, .. } => assert_eq!(path, "/metrics"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(build_err(ParamNames).code(), "INVALID_CONFIG");
}

struct CollidingTags;

impl ServerModule for CollidingTags {
    fn configure(&self, binder: &mut Binder) {
        binder.timed(
            TimedResource::new(Method::GET, "/v1/users/:a/:b", "users")
                .tagged(MetricTag::raw("user-id"))
                .tagged(MetricTag::raw("user_id")),
            untimed,
        );
    }
}

#[test]
fn colliding_tag_labels_fail_the_build() {
    let err = build_err(CollidingTags);
    assert_eq!(err.code(), "INVALID_CONFIG");
    assert!(err.to_string().contains("user_id"));
}

struct BadBindings;

impl ServerModule for BadBindings {
    fn configure(&self, binder: &mut Binder) {
        binder.timed(TimedResource::new(Method::GET, "v1/relative", "relative"), fail);
    }
}

struct UnsupportedMethod;

impl ServerModule for UnsupportedMethod {
    fn configure(&self, binder: &mut Binder) {
        let purge = Method::from_bytes(b"PURGE").unwrap();
        binder.timed(TimedResource::new(purge, "/v1/cache", "purge"), fail);
    }
}

#[test]
fn invalid_bindings_fail_the_build() {
    assert_eq!(build_err(BadBindings).code(), "INVALID_CONFIG");
    assert_eq!(build_err(UnsupportedMethod).code(), "UNSUPPORTED_METHOD");

    let err = TestServer::start_with(local_cfg(), vec![Box::new(BadBindings)]).err().unwrap();
    assert_eq!(err.code(), "INVALID_CONFIG");
}

#[tokio::test]
async fn custom_namespace_prefixes_series() {
    let mut cfg = local_cfg();
    cfg.metrics.namespace = "kb".into();
    let server = TestServer::start_with(cfg, demo()).unwrap();

    reqwest::get(server.url("/v1/echo/x")).await.unwrap();
    let text = metrics_text(&server).await;
    assert!(text.contains("kb_resource_requests_total{"));
    assert!(!text.contains("restime_resource_requests_total"));
}

#[test]
fn server_stops_on_drop() {
    let server = TestServer::start(demo()).unwrap();
    let addr = server.addr();
    assert!(server.is_running());
    drop(server);
    assert!(std::net::TcpStream::connect(addr).is_err());
}
