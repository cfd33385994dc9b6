//! Single-node, in-process exercises of the HTTP surface via `tower::ServiceExt::oneshot`
//! — no real sockets, no real clock skew, just the router wired to a fresh `LocalStore`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use quorumdb::coordinator::Coordinator;
use quorumdb::http::{router, AppState};
use quorumdb::store::{LocalStorage, LocalStore};
use quorumdb::task_watcher::TaskWatcher;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn single_node_app() -> axum::Router {
    let store = LocalStore::open(None).await.unwrap();
    let local: Arc<dyn LocalStorage> = Arc::new(store);
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let watcher = Arc::new(TaskWatcher::spawn());
    let coordinator = Arc::new(Coordinator::new(local, http, Vec::new(), None, watcher));
    let state = Arc::new(AppState { coordinator });
    router(state, false)
}

#[tokio::test]
async fn status_reports_ok() {
    let app = single_node_app().await;
    let response = app
        .oneshot(Request::get("/v0/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// S1 — single-node round-trip: PUT -> GET -> DELETE -> GET(404).
#[tokio::test]
async fn single_node_round_trip() {
    let app = single_node_app().await;

    let put = app
        .clone()
        .oneshot(
            Request::put("/v0/entity?id=foo")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::CREATED);

    let get = app
        .clone()
        .oneshot(Request::get("/v0/entity?id=foo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    assert!(get.headers().contains_key("x-last-modified"));
    let body = axum::body::to_bytes(get.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"hello");

    let delete = app
        .clone()
        .oneshot(Request::delete("/v0/entity?id=foo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::ACCEPTED);

    let missing = app
        .clone()
        .oneshot(Request::get("/v0/entity?id=foo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(missing.headers().contains_key("x-last-modified"));
}

// S8 — idempotent delete: two deletes both 202, subsequent GET still 404.
#[tokio::test]
async fn repeated_delete_is_idempotent() {
    let app = single_node_app().await;
    for _ in 0..2 {
        let delete = app
            .clone()
            .oneshot(Request::delete("/v0/entity?id=k").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::ACCEPTED);
    }
    let get = app
        .oneshot(Request::get("/v0/entity?id=k").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_key_is_not_found() {
    let app = single_node_app().await;
    let response = app
        .oneshot(Request::get("/v0/entity?id=nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_id_is_bad_request() {
    let app = single_node_app().await;
    let response = app
        .oneshot(Request::get("/v0/entity?id=").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_replicas_is_bad_request() {
    let app = single_node_app().await;
    let response = app
        .oneshot(
            Request::get("/v0/entity?id=foo&replicas=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ack_greater_than_from_is_bad_request() {
    let app = single_node_app().await;
    let response = app
        .oneshot(
            Request::get("/v0/entity?id=foo&replicas=3/2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unmatched_route_is_bad_request_not_not_found() {
    let app = single_node_app().await;
    let response = app
        .oneshot(Request::get("/v0/nonsense").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// S6 — a replicated-hop request only ever touches the local node, even when the
// cluster_urls list names peers that would refuse a real connection: replicated mode
// never fans out, so those peers are never dialed.
#[tokio::test]
async fn replicated_request_does_not_fan_out() {
    let store = LocalStore::open(None).await.unwrap();
    let local: Arc<dyn LocalStorage> = Arc::new(store);
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(50))
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let watcher = Arc::new(TaskWatcher::spawn());
    let dead_peers = vec![
        url::Url::parse("http://127.0.0.1:1/").unwrap(),
        url::Url::parse("http://127.0.0.1:2/").unwrap(),
    ];
    let coordinator = Arc::new(Coordinator::new(local, http, dead_peers, None, watcher));
    let state = Arc::new(AppState { coordinator });
    let app = router(state, false);

    let put = app
        .oneshot(
            Request::put("/v0/entity?id=foo")
                .header("x-replicated", "yes")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::CREATED);
}
