//! IPGeo Common Library
//!
//! Shared logging setup and error reporting for the IPGeo workspace members.
//!
//! - **Logging**: console / rolling-file subscriber configured from the environment
//! - **Errors**: the shared [`IpGeoError`] type and [`error::error_chain`], which
//!   renders an error together with every nested cause
//!
//! # Example
//!
//! ```no_run
//! use ipgeo_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

pub use error::{error_chain, IpGeoError, Result};
