use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// JSON body extractor whose rejection is itself JSON, so API clients never
/// see axum's plain-text rejection bodies.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(reject)?;
        Ok(AppJson(value))
    }
}

fn reject(rejection: JsonRejection) -> Response {
    let detail = rejection.body_text();
    tracing::warn!("Rejected request body: {}", detail);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "invalid request body",
            "detail": detail,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header;

    #[derive(serde::Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        name: String,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn valid_body_is_extracted() {
        let req = json_request(r#"{"name":"amaka"}"#);
        let result = AppJson::<Payload>::from_request(req, &()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn malformed_body_rejects_with_json_error() {
        let req = json_request(r#"{"name":"#);
        let rejection = AppJson::<Payload>::from_request(req, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection.status(), StatusCode::BAD_REQUEST);
        let content_type = rejection
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(content_type.starts_with("application/json"));
    }
}
