use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use std::sync::Arc;
use validator::Validate;

use crate::extractors::AppJson;
use crate::middlewares::auth::JwtClaims;
use crate::models::user::{ChangePasswordRequest, LoginRequest, RegisterRequest};
use crate::services::{auth_service::AuthService, AppState};

fn service(state: &AppState) -> AuthService {
    AuthService::new(
        state.mongo.clone(),
        state.redis.clone(),
        state.config.jwt_secret.clone(),
    )
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    tracing::info!("Registering user: {}", req.email);

    match service(&state).register(req).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("already registered") {
                StatusCode::CONFLICT
            } else {
                tracing::error!("Registration failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    tracing::info!("Login attempt: {}", req.email);

    match service(&state).login(req).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("Invalid credentials") {
                StatusCode::UNAUTHORIZED
            } else if msg.contains("temporarily locked") {
                StatusCode::TOO_MANY_REQUESTS
            } else {
                tracing::error!("Login failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match service(&state).get_profile(&claims.sub).await {
        Ok(profile) => Ok((StatusCode::OK, Json(profile))),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("not found") {
                StatusCode::NOT_FOUND
            } else {
                tracing::error!("Failed to load profile: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    match service(&state)
        .change_password(&claims.sub, &req.old_password, &req.new_password)
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("Invalid credentials") {
                StatusCode::UNAUTHORIZED
            } else if msg.contains("not found") {
                StatusCode::NOT_FOUND
            } else {
                tracing::error!("Password change failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, msg))
        }
    }
}
