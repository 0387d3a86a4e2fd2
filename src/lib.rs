//! # logcontext
//!
//! Attach monitoring linkage to structured [`log`] records.
//!
//! An [`Application`] is a monitoring session with an identity (its name, entity GUID and
//! hostname); a [`Transaction`] is one tracked unit of work within it, backed by an
//! OpenTelemetry span with a trace id and a span id. This crate wraps any [`log::Log`]
//! "core" so that every record flowing through it carries those identifiers as extra
//! key-values, which lets a log backend correlate log lines with the traces they belong to.
//!
//! There are two ways to wrap a core:
//!  - [`wrap_background_core`] for logs emitted outside any transaction: records gain
//!    `entity.name`, `entity.type`, `entity.guid` (when known) and `hostname`.
//!  - [`wrap_transaction_core`] for logs emitted while a transaction is in flight: records
//!    additionally gain `trace.id` and `span.id`.
//!
//! Both return a [`LinkedCore`], itself a [`log::Log`], so it can be installed with
//! [`log::set_boxed_logger`] or used directly with the `logger:` argument of the `log`
//! macros.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use logcontext::{
//!     WrapError,
//!     cores::{Target, WriterCore},
//!     wrap_background_core, wrap_transaction_core,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = logcontext::configure()
//!         .with_app_name("example")
//!         .finish()?;
//!
//!     let output = Arc::new(Mutex::new(Vec::<u8>::new()));
//!     let core = Arc::new(
//!         WriterCore::builder()
//!             .with_target(Target::Pipe(output.clone()))
//!             .build(),
//!     );
//!     // the `log` macros drop records above the global max level, which starts at `Off`
//!     log::set_max_level(core.max_level());
//!
//!     let background = wrap_background_core(core.clone(), Some(&app)).or_else(WrapError::recover)?;
//!     log::info!(logger: &background, foo = 3.5; "a background message");
//!
//!     let txn = app.start_transaction("work");
//!     let in_txn = wrap_transaction_core(core, Some(&txn)).or_else(WrapError::recover)?;
//!     log::info!(logger: &in_txn, "a message linked to the transaction");
//!     txn.end();
//!
//!     let written = String::from_utf8(output.lock().unwrap().clone())?;
//!     let lines: Vec<&str> = written.lines().collect();
//!     assert_eq!(lines.len(), 2);
//!     assert!(lines[0].contains(r#""entity.name":"example""#));
//!     assert!(lines[1].contains(r#""trace.id":"#));
//!
//!     app.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! The `log` macros check [`log::max_level`] before calling any logger, including one
//! passed with `logger:`, so raise it with [`log::set_max_level`] to match the base core.
//!
//! A missing application or transaction is not fatal: the wrap functions hand the core
//! back with a nil-handle [`WrapError`], which [`WrapError::recover`] turns into a
//! pass-through core.
//!
//! ## Configuration
//!
//! [`configure()`] reads these environment variables when the builder leaves a value unset:
//! - `LOGCONTEXT_APP_NAME` (then `OTEL_SERVICE_NAME`): the application name.
//! - `LOGCONTEXT_ENTITY_GUID`: the entity GUID.
//! - `LOGCONTEXT_HOSTNAME` (then `HOSTNAME`): the hostname.
//! - `LOGCONTEXT_ENABLED`: `true` or `false`.

use thiserror::Error;

use crate::config::ApplicationConfigBuilder;

mod application;
mod bridges;
pub mod config;
pub mod cores;
pub mod linking;
mod transaction;

mod internal;

pub use crate::application::{Application, ConnectionState, ShutdownGuard};
pub use crate::bridges::log::{
    LinkedCore, SinkMode, WrapError, WrapErrorKind, wrap_background_core, wrap_transaction_core,
};
pub use crate::linking::LinkingMetadata;
pub use crate::transaction::Transaction;

/// An error which may arise when configuring an [`Application`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigureError {
    /// The application name resolved to an empty string.
    #[error(
        "An application name is required; the one from `with_app_name()` or `LOGCONTEXT_APP_NAME` is empty"
    )]
    AppNameRequired,

    /// A configuration value (from environment) was invalid.
    #[error("Invalid configuration value for {parameter}: {value}")]
    InvalidConfigurationValue {
        /// The name of the configuration parameter.
        parameter: &'static str,
        /// The invalid value passed for the parameter.
        value: String,
    },
}

/// An error which may arise when shutting down an [`Application`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShutdownError {
    /// The opentelemetry SDK failed to shut down.
    #[error("Failed to shutdown Otel SDK: {0}")]
    OtelError(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Why [`Application::wait_for_connection`] did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// The application was configured disabled and will never connect.
    #[error("the application is disabled")]
    Disabled,
    /// The application has been shut down.
    #[error("the application has been shut down")]
    ShutDown,
}

/// Main entry point to configure a monitoring application.
///
/// See [`ApplicationConfigBuilder`] for the full set of configuration options.
///
/// # Example
///
/// ```rust
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let app = logcontext::configure()
///         .with_app_name("my app")
///         .finish()?;
///
///     let _guard = app.clone().shutdown_guard();
///
///     assert_eq!(app.linking_metadata().entity_name, "my app");
///
///     // Guard automatically shuts down the application when it goes out of scope
///     Ok(())
/// }
/// ```
pub fn configure() -> ApplicationConfigBuilder {
    ApplicationConfigBuilder::default()
}

#[cfg(test)]
mod test_utils;
