use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayError {
    #[error("[Invalid Pay Config] {0}")]
    InvalidConfig(String),
    #[error("[Malformed Pay Request] {0}")]
    MalformedRequest(String),
    #[error("[Internal Error] {0}")]
    InternalError(String),
}

impl IntoResponse for PayError {
    fn into_response(self) -> Response {
        tracing::error!("{:?}", self);
        let (status_code, err_msg) = match self {
            PayError::MalformedRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            PayError::InvalidConfig(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            PayError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status_code, err_msg).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        let res = PayError::MalformedRequest("bad".into()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let res = PayError::InvalidConfig("missing key".into()).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let res = PayError::InternalError("boom".into()).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
