use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The uniform success envelope returned by every operation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

/// Wrap `data` in the success envelope under the given HTTP status.
pub fn respond<T: Serialize>(status: StatusCode, data: T, message: impl Into<String>) -> Response {
    let body = ApiResponse {
        status_code: status.as_u16(),
        data,
        message: message.into(),
        success: status.as_u16() < 400,
    };
    (status, Json(body)).into_response()
}
