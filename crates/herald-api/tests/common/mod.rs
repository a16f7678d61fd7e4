//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use herald_core::clock::Clock;
use herald_core::store::Storage;
use herald_event_store::InMemoryStore;
use herald_test_support::{FixedClock, RecordingBroker};
use tower::ServiceExt;

use herald_api::pipeline::Pipeline;
use herald_api::state::AppState;

pub const EXCHANGE: &str = "herald.agilepm";
pub const DISPATCHER_ID: &str = "herald.agilepm.dispatcher";

/// The router plus the pipeline behind it, over one in-memory store.
pub struct TestApp {
    pub storage: Arc<dyn Storage>,
    pub pipeline: Pipeline,
    pub broker: Arc<RecordingBroker>,
    state: AppState,
}

impl TestApp {
    /// A fresh app with `notifications_per_log` notifications per page.
    ///
    /// # Panics
    ///
    /// Panics if the pipeline cannot be wired.
    pub fn new(notifications_per_log: i64) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::standard());
        let broker = Arc::new(RecordingBroker::new());
        let pipeline =
            Pipeline::new(&storage, broker.clone(), EXCHANGE, DISPATCHER_ID, 100).unwrap();
        let state = AppState::new(
            Arc::clone(&storage),
            clock,
            EXCHANGE,
            DISPATCHER_ID,
            notifications_per_log,
        );
        Self {
            storage,
            pipeline,
            broker,
            state,
        }
    }

    /// Same route structure as `main.rs`.
    pub fn router(&self) -> Router {
        herald_api::app(self.state.clone())
    }

    /// Runs one dispatch-and-publish round.
    pub async fn tick(&self) {
        self.pipeline.scheduler(Duration::from_secs(1)).tick().await;
    }

    /// Creates a product through the API and returns its id.
    ///
    /// # Panics
    ///
    /// Panics unless the API answers 201.
    pub async fn create_product(&self, name: &str) -> String {
        let (status, json) = post_json(
            self.router(),
            "/api/v1/products",
            &serde_json::json!({ "name": name, "description": "test" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["productId"].as_str().unwrap().to_owned()
    }
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return status, headers and raw body.
pub async fn get_raw(app: Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

    (status, headers, body_bytes)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body_bytes) = get_raw(app, uri).await;
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
