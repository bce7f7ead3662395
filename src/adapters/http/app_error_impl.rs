use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        tracing::error!(error = ?self, "Request failed");

        let code = self.code();
        match self {
            AppError::ProviderUnavailable(msg) => {
                error_resp(StatusCode::SERVICE_UNAVAILABLE, code, Some(msg))
            }
            AppError::ProviderRejected(msg) => {
                error_resp(StatusCode::PAYMENT_REQUIRED, code, Some(msg))
            }
            AppError::AuthenticationFailure(_) | AppError::InvalidCredentials => {
                error_resp(StatusCode::UNAUTHORIZED, code, None)
            }
            AppError::UnknownIntent | AppError::PlanNotFound | AppError::NotFound => {
                error_resp(StatusCode::NOT_FOUND, code, None)
            }
            AppError::PlanInactive | AppError::NoActiveSubscription => {
                error_resp(StatusCode::BAD_REQUEST, code, None)
            }
            AppError::InvalidInput(msg) => error_resp(StatusCode::BAD_REQUEST, code, Some(msg)),
            AppError::Database(_) | AppError::Internal(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, code, None)
            }
        }
    }
}

pub(crate) fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
