//! # drone-helm3
//!
//! A Drone plugin that deploys Helm 3 charts: it writes a kubeconfig,
//! lints, builds dependencies, runs `helm upgrade --install`, optionally
//! tests and rolls back, and reports the outcome.
//!
//! ## Modules
//!
//! - `helm` - Deployment plan builder and phase-by-phase executor
//! - `subprocess` - Process runner abstraction with a tokio runner and a mock for tests
//! - `kube` - Kubeconfig generation
//! - `config` - Plugin settings from `PLUGIN_*` variables or flags
//! - `envsubst` - Variable expansion for `--set` values
//! - `status` - Exit code and Pushgateway status reporting
//! - `deploy` - Glue from settings to a reported deployment
pub mod config;
pub mod deploy;
pub mod envsubst;
pub mod helm;
pub mod kube;
pub mod status;
pub mod subprocess;
