use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::subprocess::ProcessError;

/// Why a deployment run failed.
///
/// Status reporters branch on the kind only; the context and cause of a
/// [`HelmError`] are diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A pre-command failed before helm ran.
    PreFail,
    /// The main helm invocation failed.
    Failed,
    /// A post-command failed after a successful release.
    PostFail,
    /// The release succeeded but `helm test` failed and no rollback was requested.
    TestFailed,
    /// The tests failed and the release was rolled back.
    RollbackSuccess,
    /// The tests failed and the rollback failed too.
    RollbackFailed,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::PreFail,
        ErrorKind::Failed,
        ErrorKind::PostFail,
        ErrorKind::TestFailed,
        ErrorKind::RollbackSuccess,
        ErrorKind::RollbackFailed,
    ];

    /// Stable label used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PreFail => "prefail",
            ErrorKind::Failed => "failed",
            ErrorKind::PostFail => "postfail",
            ErrorKind::TestFailed => "test_failed",
            ErrorKind::RollbackSuccess => "rollback_success",
            ErrorKind::RollbackFailed => "rollback_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified execution failure.
#[derive(Debug, Error)]
#[error("{context}: {source}")]
pub struct HelmError {
    kind: ErrorKind,
    context: &'static str,
    #[source]
    source: ProcessError,
}

impl HelmError {
    pub fn wrap(source: ProcessError, context: &'static str, kind: ErrorKind) -> Self {
        Self {
            kind,
            context,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> &str {
        self.context
    }

    pub fn cause(&self) -> &ProcessError {
        &self.source
    }
}

/// Invalid options, detected before anything runs.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("release name is required")]
    MissingRelease,

    #[error("chart path is required")]
    MissingChart,

    #[error("runner is required")]
    MissingRunner,

    #[error("mode {0:?} is not known")]
    UnknownMode(String),

    #[error("not in key=value format: {0}")]
    InvalidKeyValue(String),

    #[error("unable to find default values file: {}", .0.display())]
    MissingDefaultValues(PathBuf),

    #[error("{0} command is empty")]
    EmptyCommand(&'static str),

    #[error("unable to write kustomization file {}: {source}", .path.display())]
    Kustomization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
