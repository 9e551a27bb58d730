//! Subprocess execution behind an injectable [`ProcessRunner`].

pub mod context;
pub mod error;
pub mod mock;
pub mod redact;
pub mod runner;


pub use context::RunContext;
pub use error::ProcessError;
pub use mock::{MockCommandConfig, MockProcessRunner};
pub use redact::{redact_args, redact_pair, REDACTED};
pub use runner::{ProcessCommand, ProcessRunner, TokioProcessRunner};

use std::sync::Arc;

/// The runner used outside of tests.
pub fn production() -> Arc<dyn ProcessRunner> {
    Arc::new(TokioProcessRunner::new())
}
