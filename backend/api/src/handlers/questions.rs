use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::extractors::AppJson;
use crate::middlewares::auth::JwtClaims;
use crate::models::question::{
    BulkUploadRequest, CreateQuestionRequest, ListQuestionsQuery, UpdateQuestionRequest,
};
use crate::services::{question_service::QuestionService, AppState};

fn service(state: &AppState) -> QuestionService {
    QuestionService::new(state.mongo.clone())
}

pub async fn create_question(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateQuestionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    match service(&state).create(req, &claims.sub).await {
        Ok(question) => Ok((StatusCode::CREATED, Json(question))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("Invalid question") {
                StatusCode::BAD_REQUEST
            } else {
                tracing::error!("Failed to create question: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn bulk_upload(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<BulkUploadRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    tracing::info!("Bulk question upload by: {}", claims.sub);

    match service(&state).bulk_upload(&req.text, &claims.sub).await {
        Ok(response) => {
            let status = if response.uploaded == 0 {
                // Nothing usable in the pasted text.
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                StatusCode::CREATED
            };
            Ok((status, Json(response)))
        }
        Err(e) => {
            tracing::error!("Bulk upload failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuestionsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).list(query).await {
        Ok(questions) => Ok((StatusCode::OK, Json(questions))),
        Err(e) => {
            tracing::error!("Failed to list questions: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn get_question(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).get(&question_id).await {
        Ok(question) => Ok((StatusCode::OK, Json(question))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("not found") || msg.contains("Invalid question id") {
                StatusCode::NOT_FOUND
            } else {
                tracing::error!("Failed to load question: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn update_question(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<String>,
    AppJson(req): AppJson<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).update(&question_id, req).await {
        Ok(question) => Ok((StatusCode::OK, Json(question))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("Invalid question:") {
                StatusCode::BAD_REQUEST
            } else if msg.contains("not found") || msg.contains("Invalid question id") {
                StatusCode::NOT_FOUND
            } else {
                tracing::error!("Failed to update question: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).delete(&question_id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("not found") || msg.contains("Invalid question id") {
                StatusCode::NOT_FOUND
            } else {
                tracing::error!("Failed to delete question: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).categories().await {
        Ok(categories) => Ok((StatusCode::OK, Json(categories))),
        Err(e) => {
            tracing::error!("Failed to list categories: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn count(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).count().await {
        Ok(total) => Ok((StatusCode::OK, Json(json!({ "total": total })))),
        Err(e) => {
            tracing::error!("Failed to count questions: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn difficulty_distribution(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).difficulty_distribution().await {
        Ok(distribution) => {
            let by_difficulty: serde_json::Map<String, serde_json::Value> = distribution
                .into_iter()
                .map(|(difficulty, count)| (difficulty, json!(count)))
                .collect();
            Ok((StatusCode::OK, Json(json!(by_difficulty))))
        }
        Err(e) => {
            tracing::error!("Failed to aggregate difficulty distribution: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
