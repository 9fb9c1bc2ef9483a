//! Error types for the placement engine
//!
//! Provides the taxonomy every workflow reports through:
//! - Validation failures detected before any request
//! - Conflicts (409) that invalidate cached occupancy or constraint snapshots
//! - Authorization failures (403), never retried
//! - Transient transport/server failures, retried only by the operator
//! - Stale references (404) and late responses for torn-down views

use lis_model::ModelError;
use serde::Deserialize;
use std::fmt;

/// Error body returned by the REST backend (`{message|error}`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerMessage {
    /// Human-readable detail
    #[serde(default)]
    pub message: Option<String>,
    /// Short error title
    #[serde(default)]
    pub error: Option<String>,
}

impl ServerMessage {
    /// Message with only a `message` field
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            error: None,
        }
    }

    /// Empty body
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Preferred text: `message`, then `error`
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(self.error.as_deref().filter(|e| !e.is_empty()))
    }

    /// Preferred text or a caller-supplied fallback
    #[must_use]
    pub fn text_or(&self, fallback: &str) -> String {
        self.text().unwrap_or(fallback).to_string()
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text().unwrap_or("no detail provided"))
    }
}

/// Transport-level failure reported by a `StorageApi` implementation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// 400 - server-side validation rejected the request
    #[error("bad request: {0}")]
    BadRequest(ServerMessage),

    /// 403 - actor lacks the required privilege
    #[error("forbidden: {0}")]
    Forbidden(ServerMessage),

    /// 404 - entity no longer exists
    #[error("not found: {0}")]
    NotFound(ServerMessage),

    /// 409 - constraint or occupancy conflict
    #[error("conflict: {0}")]
    Conflict(ServerMessage),

    /// 5xx or other unexpected status
    #[error("server error {status}: {body}")]
    Server { status: u16, body: ServerMessage },

    /// Request never completed (connection, timeout)
    #[error("transport failure: {0}")]
    Transport(String),

    /// Response could not be decoded
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Taxonomy bucket of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Client-detectable input problem
    Validation,
    /// Recoverable by re-checking state
    Conflict,
    /// Requires privilege escalation outside the engine
    Authorization,
    /// Safe to retry manually
    Transient,
    /// Entity deleted concurrently
    NotFound,
}

impl ApiError {
    /// Classify into the engine taxonomy
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BadRequest(_) => ErrorClass::Validation,
            Self::Forbidden(_) => ErrorClass::Authorization,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::Server { .. } | Self::Transport(_) | Self::Decode(_) => ErrorClass::Transient,
        }
    }

    /// Server body, when the failure carried one
    #[must_use]
    pub fn server_message(&self) -> Option<&ServerMessage> {
        match self {
            Self::BadRequest(m) | Self::Forbidden(m) | Self::NotFound(m) | Self::Conflict(m) => Some(m),
            Self::Server { body, .. } => Some(body),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    /// Operator-facing message: server text when present, else `fallback`
    #[must_use]
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message()
            .and_then(ServerMessage::text)
            .unwrap_or(fallback)
            .to_string()
    }

    /// Whether a manual retry could succeed without changing anything
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Aliquot form validation failures, in rule order
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AliquotValidationError {
    /// Quantity left blank
    #[error("quantity to transfer is required")]
    QuantityRequired,

    /// Quantity not a positive number
    #[error("quantity to transfer must be a positive number")]
    QuantityNotPositive,

    /// Quantity larger than what the parent still holds
    #[error("requested {requested} exceeds remaining {remaining}")]
    QuantityExceedsRemaining { requested: f64, remaining: f64 },

    /// Aliquot count outside `[1, 100]`
    #[error("number of aliquots must be between {min} and {max}, got {count}")]
    InvalidCount { count: i64, min: u32, max: u32 },

    /// Per-aliquot quantity below the smallest representable unit
    #[error("quantity per aliquot {quantity_per_aliquot} is below the minimum of 0.001")]
    QuantityPerAliquotTooSmall { quantity_per_aliquot: String },

    /// Parent has nothing left to split
    #[error("sample {0} has no remaining quantity")]
    NothingRemaining(String),
}

/// Created aliquot volumes that do not add back up to the request
///
/// Reported alongside the committed aliquots, never instead of them.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("aliquot volumes sum to {actual}, expected {expected}")]
pub struct VolumeDiscrepancy {
    pub expected: f64,
    pub actual: f64,
}

/// Box-grid selection and assignment failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// Coordinate already holds a sample
    #[error("position {coordinate} is already occupied")]
    Occupied { coordinate: String },

    /// Coordinate is not part of the box grid
    #[error("position {coordinate} does not exist in this box")]
    UnknownCoordinate { coordinate: String },

    /// No box selected
    #[error("no box selected")]
    NoBoxSelected,

    /// No rack selected
    #[error("no rack selected")]
    NoRackSelected,

    /// Box does not belong to the selected rack
    #[error("box {box_id} is not in rack {rack_id}")]
    BoxNotInRack { box_id: String, rack_id: String },

    /// Sample identifier missing
    #[error("sample identifier is required")]
    MissingSample,

    /// Coordinate missing
    #[error("no position selected")]
    MissingCoordinate,

    /// An assignment is already in flight
    #[error("an assignment is already in progress")]
    AssignmentInFlight,

    /// Occupancy must be re-fetched before another attempt
    #[error("box occupancy is out of date; refresh before retrying")]
    StaleOccupancy,
}

/// Deletion workflow failures that are not server outcomes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeletionError {
    /// Event does not apply to the current state
    #[error("{event} is not allowed while {state}")]
    IllegalTransition {
        state: &'static str,
        event: &'static str,
    },

    /// Delete requested before the checkbox was ticked
    #[error("deletion has not been acknowledged")]
    NotAcknowledged,

    /// Blocked node and actor has no cascade path
    #[error("location cannot be deleted: {0}")]
    Blocked(String),
}

/// Main engine error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Aliquot input rejected locally
    #[error("validation failed: {0}")]
    Aliquot(#[from] AliquotValidationError),

    /// Grid selection rejected locally
    #[error("placement rejected: {0}")]
    Grid(#[from] GridError),

    /// Deletion workflow misuse
    #[error("deletion rejected: {0}")]
    Deletion(#[from] DeletionError),

    /// Collaborator call failed
    #[error("request failed: {0}")]
    Api(#[from] ApiError),

    /// Server data violated a model invariant
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// None of the selected samples has remaining quantity
    #[error("no eligible samples selected")]
    NoEligibleSamples,

    /// Bulk operation without any test chosen
    #[error("no tests selected")]
    NoTestsSelected,

    /// Response arrived after its view was torn down
    #[error("response discarded: originating view is gone")]
    Stale,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Classify into the engine taxonomy
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Aliquot(_)
            | Self::Grid(_)
            | Self::Deletion(_)
            | Self::Config(_)
            | Self::NoEligibleSamples
            | Self::NoTestsSelected => ErrorClass::Validation,
            Self::Api(e) => e.class(),
            Self::Model(_) | Self::Stale => ErrorClass::Transient,
        }
    }

    /// Whether the error was caught before any request was sent
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.class() == ErrorClass::Validation
    }

    /// Whether cached occupancy/constraint snapshots must be re-fetched
    #[inline]
    #[must_use]
    pub fn invalidates_snapshot(&self) -> bool {
        matches!(self.class(), ErrorClass::Conflict | ErrorClass::NotFound)
    }

    /// Check if a manual retry is sensible
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_prefers_message_over_error() {
        let body = ServerMessage {
            message: Some("contains 8 device(s)".into()),
            error: Some("Cannot delete room".into()),
        };
        assert_eq!(body.text(), Some("contains 8 device(s)"));

        let only_error = ServerMessage {
            message: Some(String::new()),
            error: Some("Cannot delete room".into()),
        };
        assert_eq!(only_error.text(), Some("Cannot delete room"));
    }

    #[test]
    fn api_error_classes() {
        assert_eq!(ApiError::Conflict(ServerMessage::empty()).class(), ErrorClass::Conflict);
        assert_eq!(ApiError::Forbidden(ServerMessage::empty()).class(), ErrorClass::Authorization);
        assert_eq!(ApiError::Transport("reset".into()).class(), ErrorClass::Transient);
        assert!(ApiError::Server { status: 503, body: ServerMessage::empty() }.is_retryable());
        assert!(!ApiError::Forbidden(ServerMessage::empty()).is_retryable());
    }

    #[test]
    fn user_message_falls_back() {
        let err = ApiError::Transport("connection refused".into());
        assert_eq!(err.user_message("Unable to assign sample to box."), "Unable to assign sample to box.");

        let err = ApiError::Conflict(ServerMessage::new("Position A1 is occupied"));
        assert_eq!(err.user_message("fallback"), "Position A1 is occupied");
    }

    #[test]
    fn engine_error_snapshot_invalidation() {
        let conflict = EngineError::from(ApiError::Conflict(ServerMessage::empty()));
        assert!(conflict.invalidates_snapshot());
        assert!(!conflict.is_local());

        let local = EngineError::from(GridError::MissingSample);
        assert!(local.is_local());
        assert!(!local.invalidates_snapshot());
    }
}
