use std::sync::Arc;
use warp::{Filter, Rejection};

use super::error::ApiError;

/// Value of an `Authorization: Bearer <token>` header.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Passes only requests carrying the configured token.
pub fn require_token(token: Arc<str>) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let token = token.clone();
            async move {
                match header.as_deref().and_then(bearer_token) {
                    Some(given) if given == &*token => Ok(()),
                    _ => Err(warp::reject::custom(ApiError::Unauthorized)),
                }
            }
        })
        .untuple_one()
}
