use reqwest::StatusCode;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failure of a data-access operation. Cloneable so a single in-flight
/// request can hand the same outcome to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failure: {0}")]
    Validation(String),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Caller contract violations on UI state. The state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("unknown {field} filter {value:?}")]
    UnknownFilter { field: &'static str, value: String },

    #[error("edit mode requires the service being edited")]
    MissingRecord,

    #[error("the service being edited has no id")]
    MissingId,
}

impl ApiError {
    /// Maps a non-success response onto the error taxonomy.
    pub fn from_status(status: StatusCode, what: &str, body: String) -> Self {
        match status {
            StatusCode::NOT_FOUND => ApiError::NotFound(what.to_string()),
            StatusCode::BAD_REQUEST
            | StatusCode::UNSUPPORTED_MEDIA_TYPE
            | StatusCode::UNPROCESSABLE_ENTITY => {
                if body.is_empty() {
                    ApiError::Validation(format!("{} rejected", what))
                } else {
                    ApiError::Validation(body)
                }
            }
            other => ApiError::Status {
                status: other.as_u16(),
                message: body,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from_status(StatusCode::NOT_FOUND, "service s1", String::new()),
            ApiError::NotFound("service s1".to_string())
        );
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "service", "type is required".into()),
            ApiError::Validation(msg) if msg == "type is required"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "service", String::new()),
            ApiError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn test_messages_are_human_readable() {
        assert_eq!(
            ApiError::NotFound("service abc".to_string()).to_string(),
            "service abc not found"
        );
    }
}
