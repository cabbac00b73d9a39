//! Error responses for the cardroom HTTP API.
//!
//! Every failure a handler can produce is funnelled through [`ApiError`], which
//! implements [`IntoErrorResponse`] and renders the standard
//! `{ "error", "message", "details"? }` body with the matching status code.
use cardroom_engine::errors::GameError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

use crate::persistence::PersistenceError;
use crate::store::StoreError;

/// Standard error response format for all API endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "game_not_found")
    pub error: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn into_response(self, status: StatusCode) -> Response {
        reply::with_status(reply::json(&self), status).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Error classification for logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// 4xx, part of normal play (wrong turn, bad bet)
    Client,
    /// 5xx, needs investigation
    Server,
    /// Shared state can no longer be trusted
    Critical,
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait IntoErrorResponse {
    fn status_code(&self) -> StatusCode;

    fn error_code(&self) -> &'static str;

    fn error_message(&self) -> String;

    fn error_details(&self) -> Option<serde_json::Value> {
        None
    }

    fn severity(&self) -> ErrorSeverity {
        if self.status_code().is_server_error() {
            ErrorSeverity::Server
        } else {
            ErrorSeverity::Client
        }
    }

    fn to_error_response(&self) -> ErrorResponse {
        if let Some(details) = self.error_details() {
            ErrorResponse::with_details(self.error_code(), self.error_message(), details)
        } else {
            ErrorResponse::new(self.error_code(), self.error_message())
        }
    }

    /// Convert to HTTP response, logging at a level matching the severity
    fn into_http_response(self) -> Response
    where
        Self: Sized,
    {
        let status = self.status_code();
        let severity = self.severity();
        let body = self.to_error_response();

        match severity {
            ErrorSeverity::Client => tracing::info!(
                status = status.as_u16(),
                code = %body.error,
                "client error: {}",
                body.message
            ),
            ErrorSeverity::Server => tracing::error!(
                status = status.as_u16(),
                code = %body.error,
                "server error: {}",
                body.message
            ),
            ErrorSeverity::Critical => tracing::error!(
                status = status.as_u16(),
                code = %body.error,
                critical = true,
                "critical error: {}",
                body.message
            ),
        }

        body.into_response(status)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("player not found: {0}")]
    PlayerNotFound(String),
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        ApiError::Store(StoreError::Rule(err))
    }
}

fn game_error_code(err: &GameError) -> &'static str {
    match err {
        GameError::InvalidState { .. } => "invalid_state",
        GameError::PlayerNotFound(_) => "player_not_seated",
        GameError::NotPlayersTurn(_) => "not_players_turn",
        GameError::PlayerNotActive(_) => "player_not_active",
        GameError::BetOutOfRange { .. } => "bet_out_of_range",
        GameError::InsufficientBalance { .. } => "insufficient_balance",
        GameError::NoPlayers => "no_players",
        GameError::MissingBets => "missing_bets",
        GameError::EmptyDeck => "deck_empty",
    }
}

impl IntoErrorResponse for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PlayerNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(err) => match err {
                StoreError::GameNotFound(_) | StoreError::TableNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                StoreError::TableBusy(_) => StatusCode::CONFLICT,
                StoreError::Rule(_) => StatusCode::BAD_REQUEST,
                StoreError::StoragePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::PlayerNotFound(_) => "player_not_found",
            ApiError::Persistence(_) => "storage_error",
            ApiError::Store(err) => match err {
                StoreError::GameNotFound(_) => "game_not_found",
                StoreError::TableNotFound(_) => "table_not_found",
                StoreError::TableBusy(_) => "table_busy",
                StoreError::Rule(rule) => game_error_code(rule),
                StoreError::StoragePoisoned => "storage_poisoned",
            },
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Store(StoreError::Rule(GameError::BetOutOfRange { amount, min, max })) => {
                Some(serde_json::json!({ "amount": amount, "minBet": min, "maxBet": max }))
            }
            ApiError::Store(StoreError::Rule(GameError::InsufficientBalance {
                amount,
                balance,
            })) => Some(serde_json::json!({ "amount": amount, "balance": balance })),
            ApiError::Store(StoreError::Rule(GameError::InvalidState { expected, actual })) => {
                Some(serde_json::json!({ "expected": expected, "actual": actual }))
            }
            _ => None,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            ApiError::Store(StoreError::StoragePoisoned) => ErrorSeverity::Critical,
            _ if self.status_code().is_server_error() => ErrorSeverity::Server,
            _ => ErrorSeverity::Client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardroom_engine::game::GameStatus;
    use serde_json::json;

    #[test]
    fn error_response_serialization() {
        let error = ErrorResponse::new("test_error", "Test error message");
        let json = serde_json::to_value(&error).expect("serialize");

        assert_eq!(json["error"], "test_error");
        assert_eq!(json["message"], "Test error message");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn error_response_display() {
        let error = ErrorResponse::new("not_found", "Resource not found");
        assert_eq!(format!("{}", error), "not_found: Resource not found");
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::Store(StoreError::GameNotFound("g".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Store(StoreError::TableBusy("t".into())),
                StatusCode::CONFLICT,
            ),
            (ApiError::from(GameError::MissingBets), StatusCode::BAD_REQUEST),
            (
                ApiError::Store(StoreError::StoragePoisoned),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::PlayerNotFound("p".into()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn bet_errors_carry_details() {
        let err = ApiError::from(GameError::BetOutOfRange {
            amount: 5,
            min: 10,
            max: 1000,
        });
        let body = err.to_error_response();
        assert_eq!(body.error, "bet_out_of_range");
        assert_eq!(
            body.details,
            Some(json!({ "amount": 5, "minBet": 10, "maxBet": 1000 }))
        );

        let state = ApiError::from(GameError::InvalidState {
            expected: GameStatus::Betting,
            actual: GameStatus::Waiting,
        });
        assert_eq!(
            state.error_details(),
            Some(json!({ "expected": "betting", "actual": "waiting" }))
        );
    }

    #[test]
    fn poisoned_storage_is_critical() {
        assert_eq!(
            ApiError::Store(StoreError::StoragePoisoned).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            ApiError::from(GameError::NoPlayers).severity(),
            ErrorSeverity::Client
        );
    }
}
