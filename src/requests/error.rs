use crate::error::ApiError;
use crate::policy::Rejection;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("user not found")]
    UserNotFound,

    #[error("request not found")]
    RequestNotFound,

    #[error("between 1 and 3 modules must be requested (got {0})")]
    InvalidModuleCount(usize),

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("only active requests can be cancelled")]
    CancelNotActive,

    #[error("only active requests can be renewed")]
    RenewNotActive,

    #[error("request has no expiration date")]
    NoExpiration,

    #[error("renewal only available within {0} days of expiration")]
    OutsideRenewalWindow(i64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::UserNotFound => Self::NotFound("user".into()),
            RequestError::RequestNotFound => Self::NotFound("request".into()),
            RequestError::InvalidModuleCount(_)
            | RequestError::Rejected(_)
            | RequestError::CancelNotActive
            | RequestError::RenewNotActive
            | RequestError::NoExpiration
            | RequestError::OutsideRenewalWindow(_) => Self::BadRequest(err.to_string()),
            RequestError::Other(e) => Self::Internal(e),
        }
    }
}
