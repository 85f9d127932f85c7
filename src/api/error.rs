use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use deadpool_redis::{redis::RedisError, CreatePoolError, PoolError};
use std::borrow::Cow;

use crate::ENV;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Bad Request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("Unauthorized: {0}")]
    Unauthorized(Cow<'static, str>),
    #[error("Forbidden: {0}")]
    Forbidden(Cow<'static, str>),
    #[error("Not Found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("Conflict: {0}")]
    Conflict(Cow<'static, str>),
    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(Cow<'static, str>),
    #[error("Internal Server Error")]
    InternalServer,
}

#[derive(serde::Serialize)]
pub struct ErrorBody {
    pub message: Cow<'static, str>,
}

impl Error {
    pub fn unauthorized(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Plain-language text shown to the user.
    pub fn user_message(&self) -> Cow<'static, str> {
        match self {
            Error::NotFound(msg)
            | Error::Conflict(msg)
            | Error::Unauthorized(msg)
            | Error::BadRequest(msg)
            | Error::Forbidden(msg)
            | Error::ServiceUnavailable(msg) => msg.clone(),
            Error::InternalServer => "Something went wrong. Please try again.".into(),
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match *self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InternalServer => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let header = ("Access-Control-Allow-Origin", ENV.frontend_url.as_str());
        let mut res = HttpResponse::build(self.status_code());

        res.insert_header(header);
        res.insert_header(("Access-Control-Allow-Credentials", "true"));

        res.json(ErrorBody { message: self.user_message() })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SystemError {
    #[error("JWT Error")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    #[error("Database Error : {0}")]
    DatabaseError(Cow<'static, str>),
    #[error("Migration Error")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("JSON Serialization/Deserialization Error")]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    PoolInit(#[from] CreatePoolError),
    #[error("Redis pool error: {0}")]
    PoolGet(#[from] PoolError),
    #[error("Redis error")]
    RedisError(#[from] RedisError),
    // Custom Errors
    #[error("Bad Request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("Forbidden: {0}")]
    Forbidden(Cow<'static, str>),
    #[error("Database Not Found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("Database Conflict: {0:?}")]
    Conflict(Option<DbErrorMeta>),
    #[error("Profile not ready")]
    ProfileNotReady,
    #[error("Backend unavailable: {0}")]
    Unavailable(Cow<'static, str>),
    #[error("Timed out: {0}")]
    Timeout(&'static str),
    #[error("Internal System Error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

fn conflict_message(meta: &Option<DbErrorMeta>) -> Cow<'static, str> {
    let Some(m) = meta else {
        return "Duplicate value".into();
    };

    let Some(constraint) = &m.constraint else {
        return "Duplicate value".into();
    };

    let field = constraint.trim_end_matches("_key").split('_').next_back().unwrap_or("value");

    let mut chars = field.chars();
    let field = match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => "Value".to_string(),
    };

    format!("{field} already exists").into()
}

#[derive(Debug)]
pub struct DbErrorMeta {
    pub code: Option<String>,
    pub constraint: Option<String>,
    pub message: String,
}

impl From<SystemError> for Error {
    fn from(value: SystemError) -> Self {
        match value {
            SystemError::BadRequest(msg) => Error::BadRequest(msg),
            SystemError::Forbidden(msg) => Error::Forbidden(msg),
            SystemError::NotFound(msg) => Error::NotFound(msg),
            SystemError::Conflict(meta) => Error::Conflict(conflict_message(&meta)),
            SystemError::ProfileNotReady => Error::ServiceUnavailable(
                "Your profile is still being set up. Please try again in a moment.".into(),
            ),
            SystemError::Unavailable(_) | SystemError::Timeout(_) | SystemError::PoolGet(_) => {
                log::warn!("Backend unavailable: {:?}", value);
                Error::ServiceUnavailable(
                    "The service is temporarily unavailable. Please try again.".into(),
                )
            }
            _ => {
                log::error!("Internal Server Error: {:?}", value);
                Error::InternalServer
            }
        }
    }
}

impl From<sqlx::Error> for SystemError {
    fn from(err: sqlx::Error) -> Self {
        log::error!("{:?}", err);
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => SystemError::Conflict(Some(DbErrorMeta {
                    code: db_err.code().map(|s| s.to_string()),
                    constraint: db_err.constraint().map(|s| s.to_string()),
                    message: db_err.message().to_string(),
                })),
                Some("42P01") => SystemError::NotFound("Resource not found".into()),
                _ => {
                    log::error!("Unhandled DB error: {:?}", db_err);
                    SystemError::DatabaseError(db_err.message().to_string().into())
                }
            },
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                SystemError::Unavailable(err.to_string().into())
            }
            _ => SystemError::InternalError(Box::new(err)),
        }
    }
}

impl SystemError {
    pub fn bad_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn unavailable(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into().into())
    }

    /// Failures worth retrying: the same call may succeed a moment later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SystemError::Unavailable(_)
                | SystemError::Timeout(_)
                | SystemError::PoolGet(_)
                | SystemError::ProfileNotReady
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SystemError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_keep_their_status() {
        let cases: Vec<(SystemError, StatusCode)> = vec![
            (SystemError::bad_request("Message cannot be empty"), StatusCode::BAD_REQUEST),
            (SystemError::forbidden("Not a participant"), StatusCode::FORBIDDEN),
            (SystemError::not_found("Conversation not found"), StatusCode::NOT_FOUND),
            (SystemError::ProfileNotReady, StatusCode::SERVICE_UNAVAILABLE),
            (SystemError::Timeout("message.create"), StatusCode::SERVICE_UNAVAILABLE),
            (SystemError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (system, status) in cases {
            let err: Error = system.into();
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn test_sign_in_errors_are_401() {
        let err = Error::unauthorized("Access token required");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.user_message(), "Access token required");
    }

    #[test]
    fn test_internal_details_are_not_shown_to_users() {
        let err: Error = SystemError::DatabaseError("relation \"messages\" is locked".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.user_message().contains("messages"));
    }

    #[test]
    fn test_conflict_message_uses_constraint_field() {
        let meta = Some(DbErrorMeta {
            code: Some("23505".into()),
            constraint: Some("profiles_username_key".into()),
            message: "duplicate key value".into(),
        });
        assert_eq!(conflict_message(&meta), "Username already exists");
        assert_eq!(conflict_message(&None), "Duplicate value");
    }

    #[test]
    fn test_transient_classification() {
        assert!(SystemError::unavailable("connection reset").is_transient());
        assert!(SystemError::Timeout("profile.lookup").is_transient());
        assert!(SystemError::ProfileNotReady.is_transient());
        assert!(!SystemError::bad_request("nope").is_transient());
        assert!(!SystemError::Conflict(None).is_transient());
    }
}
