use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::error;

use crate::{models::MessageResponse, store::StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("You've already claimed a coupon. Try again later.")]
    RateLimited,

    #[error("No more coupons available")]
    Exhausted,

    #[error("No client address on request")]
    MissingIdentity,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Exhausted => StatusCode::BAD_REQUEST,
            AppError::MissingIdentity | AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(MessageResponse { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AppError::Exhausted.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Store(StoreError::Unavailable("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
