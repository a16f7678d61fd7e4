//! Integration tests for the diagnostics endpoint.

mod common;

use axum::http::StatusCode;

#[tokio::test]
async fn test_cursors_start_at_zero() {
    let app = common::TestApp::new(20);

    let (status, json) = common::get_json(app.router(), "/diagnostics/cursors").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dispatcherId"], common::DISPATCHER_ID);
    assert_eq!(json["lastDispatchedGlobalSequence"], 0);
    assert_eq!(json["maxGlobalSequence"], 0);
    assert_eq!(json["exchangeName"], common::EXCHANGE);
    assert_eq!(json["notificationCount"], 0);
    assert_eq!(json["mostRecentPublishedNotificationId"], 0);
}

#[tokio::test]
async fn test_cursors_follow_the_pipeline() {
    let app = common::TestApp::new(20);
    app.create_product("Herald").await;
    app.create_product("Herald 2").await;

    let (_, before) = common::get_json(app.router(), "/diagnostics/cursors").await;
    app.tick().await;
    let (_, after) = common::get_json(app.router(), "/diagnostics/cursors").await;

    assert_eq!(before["maxGlobalSequence"], 2);
    assert_eq!(before["lastDispatchedGlobalSequence"], 0);
    assert_eq!(after["lastDispatchedGlobalSequence"], 2);
    assert_eq!(after["notificationCount"], 2);
    assert_eq!(after["mostRecentPublishedNotificationId"], 2);
}
