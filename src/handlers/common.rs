use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ApiError;

/// Body for endpoints that only acknowledge an action, the JSON
/// stand-in for a flash notice.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiMessage {
    pub message: String,
}

pub fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub fn message(text: impl Into<String>) -> Response {
    success(ApiMessage {
        message: text.into(),
    })
}

/// Runs `validator` checks before the input reaches a service.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(e.to_string()))
}

/// Parses the comma-separated id lists the bulk book operations accept.
/// Blank fragments are ignored; anything non-numeric rejects the input.
pub fn parse_id_list(raw: &str) -> Result<Vec<i32>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| {
            fragment
                .parse::<i32>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid id '{}'", fragment)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1, 2,,3," => vec![1, 2, 3] ; "blank fragments are skipped")]
    #[test_case("" => Vec::<i32>::new() ; "empty input is an empty list")]
    #[test_case("42" => vec![42] ; "single id")]
    fn id_list_parses(raw: &str) -> Vec<i32> {
        parse_id_list(raw).unwrap()
    }

    #[test_case("1,two,3")]
    #[test_case("1;2;3")]
    fn id_list_rejects_garbage(raw: &str) {
        assert!(parse_id_list(raw).is_err());
    }
}
