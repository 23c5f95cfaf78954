//! Error types for the manifest layer.
//!
//! Two kinds of error live here:
//! - [`ManifestError`]: something the caller must handle (a run cannot proceed).
//! - [`RecordedError`]: an item-level failure stored on a manifest entry or on
//!   the manifest itself. These are data, not control flow.

use crate::manifest::PipelineProfile;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use thiserror::Error;

/// Manifest operation result type.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Manifest errors.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Stored data was written by a different schema version. Never recoverable.
    #[error("Manifest schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: u32, found: u32 },

    /// A previous manifest can only seed a run of the same pipeline profile.
    #[error("Pipeline profile mismatch: previous manifest is {previous}, current run is {current}")]
    ProfileMismatch {
        previous: PipelineProfile,
        current: PipelineProfile,
    },

    #[error("Invalid manifest: {0}")]
    Invalid(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A failure recorded against one content item or against the whole run.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RecordedError {
    /// The remote endpoint answered with an error payload.
    #[error("Remote request failed ({status_code}): {summary}")]
    Remote {
        status_code: u16,
        #[serde(default)]
        code: Option<String>,
        summary: String,
        #[serde(default)]
        detail: Option<String>,
        #[serde(default)]
        request_url: Option<String>,
    },

    #[error("Timed out: {operation}")]
    Timeout { operation: String },

    #[error("Canceled: {message}")]
    Canceled { message: String },

    #[error("IO error ({error_kind}): {message}")]
    Io { error_kind: String, message: String },

    /// Catch-all. `sources` holds the rendered cause chain, outermost first.
    #[error("{message}")]
    Generic {
        message: String,
        #[serde(default)]
        sources: Vec<String>,
    },
}

type CaptureEncoder = fn(&(dyn StdError + 'static)) -> Option<RecordedError>;

/// Specific encoders, tried in order for each cause before the generic fallback.
const CAPTURE_CHAIN: &[CaptureEncoder] = &[
    capture_recorded,
    capture_manifest_canceled,
    capture_elapsed,
    capture_io,
];

impl RecordedError {
    pub fn generic(message: impl Into<String>) -> Self {
        RecordedError::Generic {
            message: message.into(),
            sources: Vec::new(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        RecordedError::Timeout {
            operation: operation.into(),
        }
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        RecordedError::Canceled {
            message: message.into(),
        }
    }

    /// Convert a live error into its recorded form.
    ///
    /// Each cause in the chain, outermost first, is offered to the specific
    /// encoders; the first match wins. Otherwise the error is recorded as
    /// [`RecordedError::Generic`].
    pub fn capture(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(recorded) = CAPTURE_CHAIN.iter().find_map(|encode| encode(cause)) {
                return recorded;
            }
        }
        RecordedError::Generic {
            message: err.to_string(),
            sources: err.chain().skip(1).map(|cause| cause.to_string()).collect(),
        }
    }

    /// Same as [`RecordedError::capture`] for a plain std error.
    pub fn capture_std(err: &(dyn StdError + 'static)) -> Self {
        let mut cause = Some(err);
        while let Some(current) = cause {
            if let Some(recorded) = CAPTURE_CHAIN.iter().find_map(|encode| encode(current)) {
                return recorded;
            }
            cause = current.source();
        }
        let mut sources = Vec::new();
        let mut next = err.source();
        while let Some(source) = next {
            sources.push(source.to_string());
            next = source.source();
        }
        RecordedError::Generic {
            message: err.to_string(),
            sources,
        }
    }

    /// Short machine-friendly name of the kind, as persisted.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordedError::Remote { .. } => "remote",
            RecordedError::Timeout { .. } => "timeout",
            RecordedError::Canceled { .. } => "canceled",
            RecordedError::Io { .. } => "io",
            RecordedError::Generic { .. } => "generic",
        }
    }
}

fn capture_recorded(err: &(dyn StdError + 'static)) -> Option<RecordedError> {
    err.downcast_ref::<RecordedError>().cloned()
}

fn capture_manifest_canceled(err: &(dyn StdError + 'static)) -> Option<RecordedError> {
    match err.downcast_ref::<ManifestError>() {
        Some(ManifestError::Canceled) => Some(RecordedError::canceled(err.to_string())),
        _ => None,
    }
}

fn capture_elapsed(err: &(dyn StdError + 'static)) -> Option<RecordedError> {
    err.downcast_ref::<tokio::time::error::Elapsed>()
        .map(|elapsed| RecordedError::timeout(elapsed.to_string()))
}

fn capture_io(err: &(dyn StdError + 'static)) -> Option<RecordedError> {
    let io = err.downcast_ref::<std::io::Error>()?;
    if io.kind() == std::io::ErrorKind::TimedOut {
        return Some(RecordedError::timeout(io.to_string()));
    }
    Some(RecordedError::Io {
        error_kind: format!("{:?}", io.kind()),
        message: io.to_string(),
    })
}
