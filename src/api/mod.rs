//! Operator REST API.
//!
//! Thin handlers over the terminal handle. Every state-changing endpoint
//! answers with the fresh terminal snapshot so the UI renders from a single
//! source.

mod capture;
mod ledger;
mod review;
mod terminal;

pub use capture::*;
pub use ledger::*;
pub use review::*;
pub use terminal::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Wrap a handle call into the response envelope.
pub fn respond<T: Serialize>(result: Result<T, AppError>) -> ApiResult<T> {
    result.map(ApiResponse::new)
}
