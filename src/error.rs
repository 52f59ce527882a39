use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Rendered as a falsy `null` body with the success status; lookups that
    /// miss are not distinguished by status code.
    #[error("not found")]
    NotFound,
    #[error("validation failed")]
    Validation(String),
    #[error("store error")]
    Store(String),
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound | RepoError::IncorrectPassword => ApiError::NotFound,
            RepoError::Validation(detail) => ApiError::Validation(detail),
            RepoError::Store(detail) => ApiError::Store(detail),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::NotFound => StatusCode::OK,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut res = HttpResponse::build(self.status_code());
        match self {
            ApiError::NotFound => res.json(serde_json::Value::Null),
            ApiError::Validation(detail) | ApiError::Store(detail) => res.json(ApiErrorBody {
                error: self.to_string(),
                detail: Some(detail.clone()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn validation_relays_the_store_detail() {
        let err = ApiError::from(RepoError::Validation("text is required".into()));
        let res = err.error_response();
        assert_eq!(res.status(), 400);
        let body = to_bytes(res.into_body()).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["error"], "validation failed");
        assert_eq!(v["detail"], "text is required");
    }

    #[actix_web::test]
    async fn not_found_is_a_null_body() {
        let res = ApiError::NotFound.error_response();
        assert_eq!(res.status(), 200);
        let body = to_bytes(res.into_body()).await.unwrap();
        assert_eq!(&body[..], b"null");
    }
}
