use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::{middleware, routing::get, Router};
use base64::{engine::general_purpose, Engine as _};
use http_body_util::BodyExt;
use serial_test::serial;
use tower::util::ServiceExt;

use nurseprep_api::handlers;

fn metrics_router() -> Router {
    Router::new().route(
        "/metrics",
        get(handlers::metrics_handler)
            .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
    )
}

fn basic_auth(credentials: &str) -> String {
    format!("Basic {}", general_purpose::STANDARD.encode(credentials))
}

#[tokio::test]
#[serial]
async fn metrics_without_credentials_is_unauthorized() {
    std::env::set_var("METRICS_AUTH", "ops:s3cret");

    let response = metrics_router()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn metrics_with_wrong_credentials_is_unauthorized() {
    std::env::set_var("METRICS_AUTH", "ops:s3cret");

    let response = metrics_router()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header(header::AUTHORIZATION, basic_auth("ops:wrong"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
async fn metrics_with_valid_credentials_serves_prometheus_text() {
    std::env::set_var("METRICS_AUTH", "ops:s3cret");
    nurseprep_api::metrics::QUIZZES_STARTED_TOTAL
        .with_label_values(&["success"])
        .inc();

    let response = metrics_router()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header(header::AUTHORIZATION, basic_auth("ops:s3cret"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("quizzes_started_total"));
}
