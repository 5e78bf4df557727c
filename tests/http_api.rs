#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use rearch::Container;
use serde_json::{Value, json};
use shortcode_service::{
    clock::{Clock, ManualClock},
    config::clock_init_action,
    server,
};
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339, macros::datetime};

/// Builds a server whose registry reads time from the returned clock.
fn make_server() -> (TestServer, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(datetime!(2025-06-01 09:30:00 UTC)));
    let container = Container::new();
    container.read(clock_init_action)(Arc::clone(&clock) as Arc<dyn Clock>);
    let server = TestServer::new(server::router(container)).unwrap();
    (server, clock)
}

fn code_of(created: &Value) -> String {
    let short_link = created["shortLink"].as_str().unwrap();
    short_link.rsplit('/').next().unwrap().to_owned()
}

fn parse_timestamp(value: &Value) -> OffsetDateTime {
    OffsetDateTime::parse(value.as_str().unwrap(), &Rfc3339).unwrap()
}

#[tokio::test]
async fn test_create_with_shortcode() {
    let (server, _) = make_server();

    let response = server
        .post("/shorturls")
        .json(&json!({ "url": "https://example.com", "validity": 10, "shortcode": "promo" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let created = response.json::<Value>();
    assert!(created["shortLink"].as_str().unwrap().ends_with("/promo"));
    assert_eq!(created["expiry"], "2025-06-01T09:40:00Z");
}

#[tokio::test]
async fn test_create_generates_code_with_default_validity() {
    let (server, _) = make_server();

    let response = server
        .post("/shorturls")
        .json(&json!({ "url": "https://example.com" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let created = response.json::<Value>();
    let code = code_of(&created);
    assert_eq!(code.len(), 7);

    let stats = server
        .get(&format!("/shorturls/{code}"))
        .await
        .json::<Value>();
    assert_eq!(
        parse_timestamp(&stats["expiryDate"]) - parse_timestamp(&stats["creationDate"]),
        Duration::minutes(30)
    );
    assert_eq!(stats["expiryDate"], created["expiry"]);
}

#[tokio::test]
async fn test_create_missing_url() {
    let (server, _) = make_server();

    let response = server
        .post("/shorturls")
        .json(&json!({ "shortcode": "promo" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["error"], "URL is a required field.");
    assert!(body["errorId"].is_string());

    server
        .get("/shorturls/promo")
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_create_same_shortcode_twice_conflicts() {
    let (server, _) = make_server();

    server
        .post("/shorturls")
        .json(&json!({ "url": "https://example.com", "shortcode": "promo" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .post("/shorturls")
        .json(&json!({ "url": "https://other.example", "shortcode": "promo" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        response.json::<Value>()["error"],
        "This shortcode is already in use."
    );

    let stats = server.get("/shorturls/promo").await.json::<Value>();
    assert_eq!(stats["originalUrl"], "https://example.com");
}

#[tokio::test]
async fn test_stats_unknown_code() {
    let (server, _) = make_server();

    server
        .get("/shorturls/unknown123")
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_redirect_unknown_code() {
    let (server, _) = make_server();

    server.get("/unknown123").await.assert_status_not_found();
}

#[tokio::test]
async fn test_redirect_records_clicks() {
    let (server, clock) = make_server();
    server
        .post("/shorturls")
        .json(&json!({ "url": "https://example.com/landing", "shortcode": "promo" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .get("/promo")
        .add_header("referer", "https://news.example")
        .await;
    response.assert_status(StatusCode::FOUND);
    assert_eq!(response.header("location"), "https://example.com/landing");

    clock.advance(Duration::minutes(5));
    server.get("/promo").await.assert_status(StatusCode::FOUND);

    let stats = server.get("/shorturls/promo").await.json::<Value>();
    assert_eq!(stats["totalClicks"], 2);
    assert_eq!(
        stats["clickDetails"],
        json!([
            {
                "timestamp": "2025-06-01T09:30:00Z",
                "referrer": "https://news.example",
                "location": "N/A",
            },
            {
                "timestamp": "2025-06-01T09:35:00Z",
                "referrer": "direct",
                "location": "N/A",
            },
        ])
    );
}

#[tokio::test]
async fn test_expired_link_is_gone_but_keeps_stats() {
    let (server, clock) = make_server();
    let created = server
        .post("/shorturls")
        .json(&json!({ "url": "https://example.com", "validity": 1 }))
        .await
        .json::<Value>();
    let code = code_of(&created);

    server.get(&format!("/{code}")).await.assert_status(StatusCode::FOUND);

    clock.advance(Duration::seconds(61));
    let response = server.get(&format!("/{code}")).await;
    response.assert_status(StatusCode::GONE);
    assert_eq!(response.json::<Value>()["error"], "This link has expired.");

    let response = server.get(&format!("/shorturls/{code}")).await;
    response.assert_status_ok();
    let stats = response.json::<Value>();
    assert_eq!(stats["originalUrl"], "https://example.com");
    assert_eq!(stats["creationDate"], "2025-06-01T09:30:00Z");
    assert_eq!(stats["expiryDate"], "2025-06-01T09:31:00Z");
    assert_eq!(stats["totalClicks"], 1);
    assert_eq!(stats["clickDetails"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_redirect_at_exact_expiry() {
    let (server, clock) = make_server();
    server
        .post("/shorturls")
        .json(&json!({ "url": "https://example.com", "validity": 1, "shortcode": "edge" }))
        .await
        .assert_status(StatusCode::CREATED);

    clock.advance(Duration::minutes(1));
    server.get("/edge").await.assert_status(StatusCode::FOUND);

    clock.advance(Duration::nanoseconds(1));
    server.get("/edge").await.assert_status(StatusCode::GONE);

    let stats = server.get("/shorturls/edge").await.json::<Value>();
    assert_eq!(stats["totalClicks"], 1);
}

#[tokio::test]
async fn test_shortcode_named_like_the_create_route_redirects() {
    let (server, _) = make_server();
    server
        .post("/shorturls")
        .json(&json!({ "url": "https://example.com", "shortcode": "shorturls" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.get("/shorturls").await;
    response.assert_status(StatusCode::FOUND);
    assert_eq!(response.header("location"), "https://example.com");

    let stats = server.get("/shorturls/shorturls").await.json::<Value>();
    assert_eq!(stats["totalClicks"], 1);
}

#[tokio::test]
async fn test_get_create_route_without_such_shortcode() {
    let (server, _) = make_server();

    server.get("/shorturls").await.assert_status_not_found();
}

#[tokio::test]
async fn test_create_truncates_fractional_validity() {
    let (server, _) = make_server();

    let response = server
        .post("/shorturls")
        .json(&json!({ "url": "https://example.com", "validity": 1.5, "shortcode": "half" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>()["expiry"], "2025-06-01T09:31:00Z");
}

#[tokio::test]
async fn test_create_malformed_validity() {
    let (server, _) = make_server();

    let response = server
        .post("/shorturls")
        .json(&json!({ "url": "https://example.com", "validity": "soon", "shortcode": "soon" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert!(body["error"].is_string());
    assert!(body["errorId"].is_string());

    server
        .get("/shorturls/soon")
        .await
        .assert_status_not_found();
}
