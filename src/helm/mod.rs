//! Building and running the helm deployment plan.
//!
//! ```ignore
//! use drone_helm3::helm::{HelmCommand, HelmMode, HelmOption};
//!
//! let cmd = HelmCommand::new(
//!     HelmMode::InstallUpgrade,
//!     [
//!         HelmOption::Release("myapp".into()),
//!         HelmOption::Chart("./helm/myapp".into()),
//!         HelmOption::Namespace("myapp".into()),
//!         HelmOption::Runner(drone_helm3::subprocess::production()),
//!     ],
//! )?;
//! cmd.run(&RunContext::with_timeout(timeout)).await?;
//! ```

pub mod command;
pub mod error;
pub mod executor;
pub mod options;

pub use command::{HelmCommand, HelmMode, HELM};
pub use error::{ErrorKind, HelmError, PlanError};
pub use executor::Phase;
pub use options::{format_duration, HelmOption};
