use log::error;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::{Request, Response};
use thiserror::Error;

/// Failure of a single API operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> Status {
        match self {
            ServiceError::NotFound(_) => Status::NotFound,
            ServiceError::Forbidden(_) => Status::Forbidden,
            ServiceError::BadRequest(_) => Status::BadRequest,
            ServiceError::Unauthorized(_) => Status::Unauthorized,
            ServiceError::Conflict(_) => Status::Conflict,
            ServiceError::Database(_) | ServiceError::Storage(_) => Status::InternalServerError,
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(value: sqlx::Error) -> Self {
        match &value {
            sqlx::Error::RowNotFound => ServiceError::NotFound("Record"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ServiceError::Conflict("Record already exists".to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                ServiceError::Conflict("Record is still referenced".to_string())
            }
            // string_data_right_truncation
            sqlx::Error::Database(db) if db.code().as_deref() == Some("22001") => {
                ServiceError::bad_request("Value too long")
            }
            _ => ServiceError::Database(value),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
struct ErrorBody {
    status: &'static str,
    message: String,
}

/// JSON error response, `{"status":"error","message":...}`
#[derive(Debug)]
pub struct ApiError {
    pub status: Status,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Status, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let body = Json(ErrorBody {
            status: "error",
            message: self.message,
        });
        Response::build_from(body.respond_to(request)?)
            .status(self.status)
            .ok()
    }
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        let status = value.status();
        if status.code >= 500 {
            error!("{}", value);
            return ApiError::new(status, "Internal server error");
        }
        ApiError::new(status, value.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        ServiceError::from(value).into()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
