use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::approval::ApprovalReport;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub success: bool,
    pub message: String,
}

/// POST /telegram-notify: record an approval and notify the operators.
pub async fn notify_approval(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ApprovalReport>, JsonRejection>,
) -> Result<Json<NotifyResponse>, AppError> {
    let Json(report) = payload.map_err(|e| AppError::InvalidReport(e.body_text()))?;

    state.router.handle_report(report).await?;

    Ok(Json(NotifyResponse {
        success: true,
        message: "notification sent".to_string(),
    }))
}
