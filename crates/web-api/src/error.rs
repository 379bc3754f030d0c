use application::ApplicationError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;
        use domain::DomainError;

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            AppErr::Domain(DomainError::CounsellorNotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "COUNSELLOR_NOT_FOUND",
                "counsellor not found",
            ),
            AppErr::Domain(DomainError::CounsellorInactive) => ApiError::new(
                StatusCode::CONFLICT,
                "COUNSELLOR_INACTIVE",
                "counsellor is not accepting bookings",
            ),
            AppErr::Domain(DomainError::BookingNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "BOOKING_NOT_FOUND", "booking not found")
            }
            AppErr::Domain(DomainError::PaymentNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND", "payment not found")
            }
            AppErr::Domain(DomainError::SlotConflict) => {
                ApiError::new(StatusCode::CONFLICT, "SLOT_TAKEN", "slot was just taken")
            }
            AppErr::Domain(err @ DomainError::InvalidState { .. }) => {
                ApiError::new(StatusCode::CONFLICT, "INVALID_STATE", err.to_string())
            }
            AppErr::Domain(DomainError::Expired) => ApiError::new(
                StatusCode::GONE,
                "BOOKING_EXPIRED",
                "payment window has expired",
            ),
            AppErr::Domain(err @ DomainError::CancellationWindowClosed) => {
                ApiError::new(StatusCode::CONFLICT, "CANCELLATION_WINDOW_CLOSED", err.to_string())
            }
            AppErr::Domain(err @ DomainError::DuplicateFeedback) => {
                ApiError::new(StatusCode::CONFLICT, "DUPLICATE_FEEDBACK", err.to_string())
            }
            AppErr::Domain(err @ DomainError::PendingLimitReached) => {
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "PENDING_LIMIT_REACHED", err.to_string())
            }
            AppErr::Domain(err @ DomainError::PayoutExceedsDue) => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "PAYOUT_EXCEEDS_DUE",
                err.to_string(),
            ),
            AppErr::Repository(repo_err) => match repo_err {
                domain::RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                domain::RepositoryError::Conflict => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                domain::RepositoryError::Storage { message } => ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    format!("storage error: {}", message),
                ),
            },
            AppErr::CalendarUnavailable(message) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "CALENDAR_UNAVAILABLE",
                format!("calendar unavailable: {}", message),
            ),
            AppErr::PaymentFailure(message) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "PAYMENT_FAILURE",
                format!("payment failure: {}", message),
            ),
            AppErr::Infrastructure(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INFRASTRUCTURE_ERROR",
                message,
            ),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.body.code, message = %self.body.message, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
