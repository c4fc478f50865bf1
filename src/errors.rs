use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::chain::ChainError;
use crate::notification::DeliveryError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no approval recorded for {0}")]
    UnknownAddress(String),

    #[error("approval for {0} has already been processed")]
    AlreadyProcessed(String),

    #[error("invalid approval report: {0}")]
    InvalidReport(String),

    #[error("transfer failed: {0}")]
    TransferExecution(#[source] ChainError),

    #[error("chain query failed: {0}")]
    ChainQuery(#[source] ChainError),

    #[error("notification delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidReport(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::UnknownAddress(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::AlreadyProcessed(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::TransferExecution(_) | AppError::ChainQuery(_) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::Delivery(e) => {
                tracing::error!("Notification delivery error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "notification delivery failed".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::InvalidReport("x".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Delivery(DeliveryError::Rejected {
                    status: 400,
                    description: "chat not found".into(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let err = AppError::Delivery(DeliveryError::Rejected {
            status: 401,
            description: "Unauthorized: token 999:SECRET".into(),
        });

        let resp = err.into_response();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "notification delivery failed");
    }
}
