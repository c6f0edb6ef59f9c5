use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics;
use crate::services::AppState;

pub mod auth;
pub mod payments;
pub mod questions;
pub mod quizzes;

const MONGO_PING_TIMEOUT: Duration = Duration::from_secs(1);
const REDIS_PING_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct DependencyHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl DependencyHealth {
    fn up() -> Self {
        Self {
            status: "up",
            error: None,
        }
    }

    fn down(error: String) -> Self {
        Self {
            status: "down",
            error: Some(error),
        }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Reports the service and its two backing stores. Degrades to 503 when
/// either store fails its ping within the timeout.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mongo = ping_mongo(&state).await;
    let redis = ping_redis(&state).await;

    let healthy = mongo.is_up() && redis.is_up();
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "service": "nurseprep-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": {
                "mongodb": mongo,
                "redis": redis,
            },
        })),
    )
}

async fn ping_mongo(state: &AppState) -> DependencyHealth {
    let ping = state.mongo.run_command(mongodb::bson::doc! { "ping": 1 });
    match tokio::time::timeout(MONGO_PING_TIMEOUT, ping).await {
        Ok(Ok(_)) => DependencyHealth::up(),
        Ok(Err(e)) => DependencyHealth::down(e.to_string()),
        Err(_) => DependencyHealth::down(format!("ping timed out after {:?}", MONGO_PING_TIMEOUT)),
    }
}

async fn ping_redis(state: &AppState) -> DependencyHealth {
    let mut conn = state.redis.clone();
    let cmd = redis::cmd("PING");
    let ping = cmd.query_async::<String>(&mut conn);
    match tokio::time::timeout(REDIS_PING_TIMEOUT, ping).await {
        Ok(Ok(_)) => DependencyHealth::up(),
        Ok(Err(e)) => DependencyHealth::down(e.to_string()),
        Err(_) => DependencyHealth::down(format!("ping timed out after {:?}", REDIS_PING_TIMEOUT)),
    }
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Basic-Auth gate for /metrics. Expected credentials come from the
/// METRICS_AUTH env var as `user:password`.
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| general_purpose::STANDARD.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    if presented != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_health_serializes_without_null_error() {
        let up = serde_json::to_value(DependencyHealth::up()).unwrap();
        assert_eq!(up, json!({ "status": "up" }));

        let down = serde_json::to_value(DependencyHealth::down("refused".to_string())).unwrap();
        assert_eq!(down, json!({ "status": "down", "error": "refused" }));
    }
}
