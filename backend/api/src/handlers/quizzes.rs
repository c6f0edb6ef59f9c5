use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::extractors::AppJson;
use crate::middlewares::auth::JwtClaims;
use crate::models::session::{HistoryQuery, StartQuizRequest, SubmitQuizRequest};
use crate::services::{quiz_service::QuizService, AppState};

fn service(state: &AppState) -> QuizService {
    QuizService::new(
        state.mongo.clone(),
        state.redis.clone(),
        state.config.quiz.clone(),
    )
}

pub async fn start_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<StartQuizRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Starting quiz for user: {}", claims.sub);

    match service(&state).start_quiz(&claims.sub, req).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("activation required") {
                StatusCode::FORBIDDEN
            } else if msg.contains("No questions available") {
                StatusCode::SERVICE_UNAVAILABLE
            } else if msg.contains("not found") {
                StatusCode::NOT_FOUND
            } else {
                tracing::error!("Failed to start quiz: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = match service(&state).get_session(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            let msg = e.to_string();
            let status = session_lookup_status(&msg);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!("Failed to load session {}: {}", session_id, e);
            }
            return Err((status, msg));
        }
    };

    // Sessions are private to their owner.
    if session.user_id != claims.sub {
        return Err((StatusCode::NOT_FOUND, "Session not found".to_string()));
    }

    Ok((StatusCode::OK, Json(session)))
}

// A missing session is a 404; anything else (cache or store trouble) is an
// internal failure and must not masquerade as a miss.
fn session_lookup_status(msg: &str) -> StatusCode {
    if msg.contains("Session not found") {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SubmitQuizRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Submitting quiz: {} by user: {}", session_id, claims.sub);

    match service(&state)
        .submit_quiz(&claims.sub, &session_id, req)
        .await
    {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("not found") {
                StatusCode::NOT_FOUND
            } else if msg.contains("already completed") {
                StatusCode::CONFLICT
            } else {
                tracing::error!("Failed to submit quiz: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).history(&claims.sub, query).await {
        Ok(summaries) => Ok((StatusCode::OK, Json(summaries))),
        Err(e) => {
            tracing::error!("Failed to load quiz history: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).stats(&claims.sub).await {
        Ok(stats) => Ok((StatusCode::OK, Json(stats))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("not found") {
                StatusCode::NOT_FOUND
            } else {
                tracing::error!("Failed to load quiz stats: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_session_maps_to_not_found() {
        assert_eq!(
            session_lookup_status("Session not found"),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn backend_failures_map_to_internal_error() {
        assert_eq!(
            session_lookup_status("Failed to read session cache: connection refused"),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            session_lookup_status("Failed to query quiz session: pool timed out"),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
