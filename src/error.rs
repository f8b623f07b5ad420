//! Typed outcomes for the scan pipeline.
//!
//! Infrastructure failures travel as `anyhow::Error`; the enums here are the
//! domain-level refusals the presenter shows to the operator.

use serde::Serialize;
use thiserror::Error;

/// Why the classifier refused a raw payload. Blank payloads carry empty text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "payload", rename_all = "snake_case")]
pub enum ScanRejection {
    #[error("unrecognized code format: {0:?}")]
    UnrecognizedFormat(String),
}

/// Why the move applier refused a move.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "id", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("unknown spool {0}")]
    UnknownSpool(String),
    #[error("unknown location {0}")]
    UnknownLocation(String),
    #[error("spool {0} is archived")]
    ArchivedSpool(String),
}

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("move rejected: {0}")]
    Rejected(RejectReason),
    #[error("registry failure: {0:#}")]
    Registry(#[from] anyhow::Error),
}
