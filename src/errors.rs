// src/errors.rs
use thiserror::Error;

/// Crate-wide error type.
///
/// Everything here is recovered at the command boundary: a job ends in a
/// single user-visible report, never a propagated panic or a corrupted host
/// session.
#[derive(Error, Debug)]
pub enum RdecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unsupported architecture: '{0}'")]
    UnsupportedArchitecture(String),

    #[error("HTTP request failed to '{url}': {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("remote service returned HTTP {status}: {reason}")]
    RemoteFailure { status: u16, reason: String },

    #[error("submission rejected by remote service (HTTP {status}): {reason}")]
    SubmissionRejected { status: u16, reason: String },

    #[error("decompilation did not finish within {attempts} poll attempts")]
    PollTimeout { attempts: u32 },

    #[error("job cancelled")]
    Cancelled,

    #[error("remote decompilation reported failure")]
    JobFailed,

    #[error("artifact kind '{kind}' missing from job outputs")]
    ArtifactMissing { kind: String },

    #[error("failed to download artifact from '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl RdecError {
    /// Cancellation is a clean termination, not a failure; callers use this
    /// to pick the right final report wording.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RdecError::Cancelled)
    }
}
