use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Payment provider rejected the request: {0}")]
    ProviderRejected(String),

    #[error("Webhook authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Unknown payment intent")]
    UnknownIntent,

    #[error("Subscription plan not found")]
    PlanNotFound,

    #[error("Subscription plan is not active")]
    PlanInactive,

    #[error("No active subscription")]
    NoActiveSubscription,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the same request may succeed if retried later.
    ///
    /// Webhook handlers answer retryable errors with a 5xx so the provider redelivers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ProviderUnavailable(_) | AppError::Database(_) | AppError::Internal(_)
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
            AppError::ProviderRejected(_) => ErrorCode::ProviderRejected,
            AppError::AuthenticationFailure(_) => ErrorCode::AuthenticationFailure,
            AppError::UnknownIntent => ErrorCode::UnknownIntent,
            AppError::PlanNotFound => ErrorCode::PlanNotFound,
            AppError::PlanInactive => ErrorCode::PlanInactive,
            AppError::NoActiveSubscription => ErrorCode::NoActiveSubscription,
            AppError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    ProviderUnavailable,
    ProviderRejected,
    AuthenticationFailure,
    UnknownIntent,
    PlanNotFound,
    PlanInactive,
    NoActiveSubscription,
    InvalidCredentials,
    InvalidInput,
    NotFound,
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorCode::ProviderRejected => "PROVIDER_REJECTED",
            ErrorCode::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            ErrorCode::UnknownIntent => "UNKNOWN_INTENT",
            ErrorCode::PlanNotFound => "PLAN_NOT_FOUND",
            ErrorCode::PlanInactive => "PLAN_INACTIVE",
            ErrorCode::NoActiveSubscription => "NO_ACTIVE_SUBSCRIPTION",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
