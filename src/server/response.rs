use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::ApiError;
use crate::model::HttpMethod;
use crate::pipeline::Stop;

/// Wrapper for API responses that automatically adds success envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: Option<StatusCode>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self {
            data,
            status_code: None,
        }
    }

    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self {
            data,
            status_code: Some(status_code),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }

        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return ApiError::internal_server_error("Failed to serialize response data").into_response();
            }
        };

        (status, Json(json!({ "success": true, "data": data_value }))).into_response()
    }
}

/// A stopped chain answers with the stop's status; the payload, when
/// present, is the body as-is.
impl IntoResponse for Stop {
    fn into_response(self) -> Response {
        match self.payload {
            Some(payload) => (self.status, Json(payload)).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// 405 with an `Allow` header listing the permitted methods
pub fn method_not_allowed(allow: &[HttpMethod]) -> Response {
    let list = allow.iter().map(HttpMethod::as_str).collect::<Vec<_>>().join(", ");
    let mut response = ApiError::method_not_allowed("Method not allowed").into_response();
    if let Ok(value) = HeaderValue::from_str(&list) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_header_lists_methods_in_order() {
        let response = method_not_allowed(&[HttpMethod::Post, HttpMethod::Delete]);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST, DELETE");
    }

    #[test]
    fn stop_without_payload_has_empty_body() {
        let response = Stop::internal().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
