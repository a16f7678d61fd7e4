//! Integration tests for the notification log resource.

mod common;

use axum::http::{StatusCode, header};
use herald_notification::NotificationLogReader;

async fn app_with_products(per_log: i64, products: usize) -> common::TestApp {
    let app = common::TestApp::new(per_log);
    for n in 0..products {
        app.create_product(&format!("Product {n}")).await;
    }
    app.tick().await;
    app
}

fn cache_control(headers: &axum::http::HeaderMap) -> &str {
    headers
        .get(header::CACHE_CONTROL)
        .unwrap()
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn test_five_notifications_in_pages_of_two() {
    // Arrange
    let app = app_with_products(2, 5).await;

    // Act
    let (status, headers, body) = common::get_raw(app.router(), "/notifications").await;

    // Assert - current page
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_control(&headers), "max-age=60");
    let current: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(current["id"], "5,6");
    assert_eq!(current["archived"], false);
    assert_eq!(current["notifications"].as_array().unwrap().len(), 1);
    assert_eq!(current["notifications"][0]["notificationId"], 5);
    assert_eq!(
        current["notifications"][0]["typeName"],
        "agilepm.product_created"
    );
    assert_eq!(current["linkSelf"]["href"], "/notifications/5,6");
    assert_eq!(current["linkSelf"]["rel"], "self");
    assert!(current["linkNext"].is_null());
    assert_eq!(current["linkPrevious"]["href"], "/notifications/3,4");
    assert_eq!(current["linkPrevious"]["rel"], "previous");

    // Assert - archived pages
    for (uri, next, previous) in [
        ("/notifications/1,2", "/notifications/3,4", None),
        (
            "/notifications/3,4",
            "/notifications/5,6",
            Some("/notifications/1,2"),
        ),
    ] {
        let (status, headers, body) = common::get_raw(app.router(), uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache_control(&headers), "max-age=3600");
        let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(page["archived"], true);
        assert_eq!(page["notifications"].as_array().unwrap().len(), 2);
        assert_eq!(page["linkNext"]["href"], next);
        match previous {
            Some(href) => assert_eq!(page["linkPrevious"]["href"], href),
            None => assert!(page["linkPrevious"].is_null()),
        }
    }
}

#[tokio::test]
async fn test_consumer_walks_back_from_current_page_and_keeps_archived_pages() {
    // Arrange
    let app = app_with_products(2, 5).await;
    let mut uri = "/notifications".to_owned();
    let mut pages = Vec::new();

    // Act
    loop {
        let (status, _, body) = common::get_raw(app.router(), &uri).await;
        assert_eq!(status, StatusCode::OK);
        let page = NotificationLogReader::parse(std::str::from_utf8(&body).unwrap()).unwrap();
        let previous = page.previous().map(|link| link.href.clone());
        pages.push(page);
        match previous {
            Some(href) => uri = href,
            None => break,
        }
    }

    // Assert
    let ids: Vec<i64> = pages
        .iter()
        .rev()
        .flat_map(|page| page.notifications().iter())
        .map(|n| n.notification_id().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    let archived: Vec<&str> = pages
        .iter()
        .filter(|page| page.is_archived())
        .map(NotificationLogReader::id)
        .collect();
    assert_eq!(archived, vec!["3,4", "1,2"]);
    assert!(!pages[0].has_next());
}

#[tokio::test]
async fn test_archived_page_is_byte_identical_after_more_notifications() {
    // Arrange
    let app = app_with_products(2, 3).await;
    let (_, _, before) = common::get_raw(app.router(), "/notifications/1,2").await;

    // Act
    app.create_product("Later").await;
    app.create_product("Even later").await;
    app.tick().await;
    let (_, _, after) = common::get_raw(app.router(), "/notifications/1,2").await;

    // Assert
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_specific_unarchived_page_is_short_lived() {
    let app = app_with_products(2, 3).await;

    let (status, headers, _) = common::get_raw(app.router(), "/notifications/3,4").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_control(&headers), "max-age=60");
}

#[tokio::test]
async fn test_empty_exchange_serves_empty_first_page() {
    let app = common::TestApp::new(2);

    let (status, json) = common::get_json(app.router(), "/notifications").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "1,2");
    assert_eq!(json["archived"], false);
    assert!(json["notifications"].as_array().unwrap().is_empty());
    assert!(json["linkPrevious"].is_null());
}

#[tokio::test]
async fn test_notifications_are_not_logged_before_dispatch() {
    let app = common::TestApp::new(2);
    app.create_product("Herald").await;

    let (_, json) = common::get_json(app.router(), "/notifications").await;

    assert!(json["notifications"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_page_ids_are_rejected() {
    let app = app_with_products(2, 3).await;

    let (misaligned, json) = common::get_json(app.router(), "/notifications/2,3").await;
    let (garbage, _) = common::get_json(app.router(), "/notifications/abc").await;
    let (future, _) = common::get_json(app.router(), "/notifications/7,8").await;

    assert_eq!(misaligned, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
    assert_eq!(garbage, StatusCode::BAD_REQUEST);
    assert_eq!(future, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tick_publishes_every_logged_notification() {
    let app = app_with_products(2, 3).await;

    assert_eq!(app.broker.sent_message_ids(), vec!["1", "2", "3"]);
}
