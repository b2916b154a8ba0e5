//! HTTP request metrics export tests for water-billing-service.

use axum::{middleware, routing::get, Router};
use service_core::middleware::metrics::metrics_middleware;
use tokio::net::TcpListener;
use water_billing_service::services::{get_metrics, init_metrics};

#[tokio::test]
async fn http_request_metrics_are_exported() {
    init_metrics();

    let router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .layer(middleware::from_fn(metrics_middleware));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    let body = reqwest::get(format!("{}/health", address))
        .await
        .expect("Failed to execute request")
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");

    let exported = get_metrics();
    assert!(exported.contains("http_requests_total"));
    assert!(exported.contains("http_request_duration_seconds"));
    assert!(exported.contains(r#"path="/health""#));
    assert!(exported.contains("water_billing_rule_of_three_total"));
}
