use serde_json::json;
use std::convert::Infallible;
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject::{InvalidQuery, MethodNotAllowed, PayloadTooLarge, Reject};
use warp::{Rejection, Reply};

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl Reject for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Unauthorized => "Missing or invalid bearer token".to_string(),
            ApiError::NotFound(what) => format!("{} not found", what),
            ApiError::BadRequest(reason) | ApiError::Conflict(reason) => reason.clone(),
            // Storage details stay in the log.
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

/// Storage and other unexpected failures.
pub fn internal(e: anyhow::Error) -> Rejection {
    warp::reject::custom(ApiError::Internal(e))
}

pub fn bad_request(e: impl ToString) -> Rejection {
    warp::reject::custom(ApiError::BadRequest(e.to_string()))
}

pub fn not_found(what: impl Into<String>) -> Rejection {
    warp::reject::custom(ApiError::NotFound(what.into()))
}

/// Render every rejection as `{"error": "..."}`.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(e) = err.find::<ApiError>() {
        match e {
            ApiError::Internal(cause) => log::error!("API request failed: {:#}", cause),
            other => log::warn!("API request rejected: {:?}", other),
        }
        (e.status(), e.message())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        log::error!("Unhandled API rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": message })),
        status,
    ))
}
