use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use opentelemetry::{
    Context, KeyValue,
    trace::{Tracer as _, TracerProvider as _},
};
use opentelemetry_sdk::{
    Resource,
    trace::{SdkTracerProvider, Tracer},
};

use crate::{
    ConfigureError, ConnectError, ShutdownError,
    config::{
        ApplicationConfigBuilder, LOGCONTEXT_APP_NAME, LOGCONTEXT_ENABLED, LOGCONTEXT_ENTITY_GUID,
        LOGCONTEXT_HOSTNAME,
    },
    linking::{ENTITY_TYPE_SERVICE, LinkingMetadata},
    transaction::Transaction,
};

const TRACER_NAME: &str = "logcontext";

/// Lifecycle state of an [`Application`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionState {
    /// The application is recording transactions.
    Connected,
    /// The application was configured disabled; it provides identity but records nothing.
    Disabled,
    /// [`Application::shutdown`] has been called.
    ShutDown,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connected,
            1 => ConnectionState::Disabled,
            _ => ConnectionState::ShutDown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Connected => 0,
            ConnectionState::Disabled => 1,
            ConnectionState::ShutDown => 2,
        }
    }
}

/// A monitoring application: the process-wide identity that log records are linked to,
/// and the factory for [`Transaction`]s.
///
/// This instance is created by calling [`logcontext::configure()`][crate::configure].
/// Clones share the same underlying session.
#[derive(Clone)]
pub struct Application {
    inner: Arc<ApplicationInner>,
}

struct ApplicationInner {
    app_name: String,
    entity_guid: Option<String>,
    hostname: String,
    tracer_provider: SdkTracerProvider,
    tracer: Tracer,
    state: AtomicU8,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("app_name", &self.inner.app_name)
            .field("entity_guid", &self.inner.entity_guid)
            .field("hostname", &self.inner.hostname)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl Application {
    /// The application name, reported as `entity.name`.
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    /// The entity GUID, if configured.
    #[must_use]
    pub fn entity_guid(&self) -> Option<&str> {
        self.inner.entity_guid.as_deref()
    }

    /// The hostname reported on linked records.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.inner.hostname
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Whether [`shutdown`][Self::shutdown] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.connection_state() == ConnectionState::ShutDown
    }

    /// Wait until the application is connected and recording.
    ///
    /// The tracing pipeline is built synchronously by
    /// [`finish()`][crate::config::ApplicationConfigBuilder::finish], so an enabled
    /// application is connected as soon as it exists and this returns without blocking.
    /// `timeout` is therefore never waited on; it is only recorded in the debug event.
    ///
    /// # Errors
    ///
    /// [`ConnectError::Disabled`] if the application was configured disabled,
    /// [`ConnectError::ShutDown`] if it has been shut down.
    pub fn wait_for_connection(&self, timeout: Duration) -> Result<(), ConnectError> {
        match self.connection_state() {
            ConnectionState::Connected => {
                tracing::debug!(app_name = %self.inner.app_name, ?timeout, "application connected");
                Ok(())
            }
            ConnectionState::Disabled => Err(ConnectError::Disabled),
            ConnectionState::ShutDown => Err(ConnectError::ShutDown),
        }
    }

    /// The application identity, without any transaction linkage.
    #[must_use]
    pub fn linking_metadata(&self) -> LinkingMetadata<'_> {
        LinkingMetadata {
            entity_name: &self.inner.app_name,
            entity_type: ENTITY_TYPE_SERVICE,
            entity_guid: self.inner.entity_guid.as_deref(),
            hostname: &self.inner.hostname,
            trace_id: None,
            span_id: None,
        }
    }

    /// Start a new transaction, the root of a new trace.
    ///
    /// Transactions started on a disabled or shut down application record nothing and
    /// have no trace or span id.
    pub fn start_transaction<T: Into<String>>(&self, name: T) -> Transaction {
        let name = name.into();
        if self.connection_state() != ConnectionState::Connected {
            tracing::debug!(
                app_name = %self.inner.app_name,
                transaction = %name,
                state = ?self.connection_state(),
                "starting unrecorded transaction"
            );
            return Transaction::unrecorded(self.clone(), name);
        }

        let span = self
            .inner
            .tracer
            .start_with_context(name.clone(), &Context::new());
        let transaction = Transaction::recorded(self.clone(), name, span);
        tracing::debug!(
            app_name = %self.inner.app_name,
            transaction = %transaction.name(),
            trace_id = ?transaction.trace_id(),
            "started transaction"
        );
        transaction
    }

    /// Create a shutdown guard that will automatically shut down the application when dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let app = logcontext::configure()
    ///         .with_app_name("guarded")
    ///         .finish()?;
    ///
    ///     let guard = app.clone().shutdown_guard();
    ///
    ///     let txn = app.start_transaction("work");
    ///     txn.end();
    ///
    ///     guard.shutdown()?;
    ///     assert!(app.is_shut_down());
    ///     Ok(())
    /// }
    /// ```
    pub fn shutdown_guard(self) -> ShutdownGuard {
        ShutdownGuard { app: Some(self) }
    }

    /// Shuts down the application.
    ///
    /// This flushes all finished transactions to the span processors and then closes all
    /// associated resources. Log cores wrapped for this application keep forwarding
    /// records, but no new cores can be wrapped for it.
    ///
    /// # Errors
    ///
    /// See [`ShutdownError`] for possible errors; calling this twice fails with
    /// `AlreadyShutdown` from the SDK.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        self.inner
            .state
            .store(ConnectionState::ShutDown.as_u8(), Ordering::Release);
        self.inner.tracer_provider.shutdown()?;
        tracing::info!(app_name = %self.inner.app_name, "application shut down");
        Ok(())
    }

    /// Called by `ApplicationConfigBuilder::finish()`.
    pub(crate) fn from_config_builder(
        config: ApplicationConfigBuilder,
    ) -> Result<Application, ConfigureError> {
        Self::build(config, None)
    }

    pub(crate) fn build(
        config: ApplicationConfigBuilder,
        env: Option<&HashMap<String, String>>,
    ) -> Result<Application, ConfigureError> {
        let app_name = LOGCONTEXT_APP_NAME.resolve(config.app_name, env)?;
        if app_name.trim().is_empty() {
            return Err(ConfigureError::AppNameRequired);
        }
        let entity_guid = LOGCONTEXT_ENTITY_GUID
            .resolve(config.entity_guid, env)?
            .filter(|guid| !guid.is_empty());
        let hostname = LOGCONTEXT_HOSTNAME.resolve(config.hostname, env)?;
        let enabled = LOGCONTEXT_ENABLED.resolve(config.enabled, env)?;

        let advanced_options = config.advanced.unwrap_or_default();

        let mut tracer_provider_builder = SdkTracerProvider::builder().with_resource(
            Resource::builder()
                .with_service_name(app_name.clone())
                .with_attribute(KeyValue::new("host.name", hostname.clone()))
                .build(),
        );

        if let Some(id_generator) = advanced_options.id_generator {
            tracer_provider_builder = tracer_provider_builder.with_id_generator(id_generator);
        }

        for resource in advanced_options.resources {
            tracer_provider_builder = tracer_provider_builder.with_resource(resource);
        }

        for span_processor in config.additional_span_processors {
            tracer_provider_builder = tracer_provider_builder.with_span_processor(span_processor);
        }

        let tracer_provider = tracer_provider_builder.build();
        let tracer = tracer_provider.tracer(TRACER_NAME);

        let state = if enabled {
            ConnectionState::Connected
        } else {
            ConnectionState::Disabled
        };

        tracing::info!(%app_name, ?state, "configured application");

        Ok(Application {
            inner: Arc::new(ApplicationInner {
                app_name,
                entity_guid,
                hostname,
                tracer_provider,
                tracer,
                state: AtomicU8::new(state.as_u8()),
            }),
        })
    }
}

/// A guard that automatically shuts down the application when dropped.
///
/// Create this guard by calling [`Application::shutdown_guard()`] to ensure clean shutdown
/// when the guard goes out of scope.
#[must_use = "this should be kept alive until the application should be stopped"]
pub struct ShutdownGuard {
    app: Option<Application>,
}

impl ShutdownGuard {
    /// Shut down the application.
    ///
    /// # Errors
    ///
    /// See [`ShutdownError`] for possible errors.
    pub fn shutdown(mut self) -> Result<(), ShutdownError> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<(), ShutdownError> {
        if let Some(app) = self.app.take() {
            if !app.is_shut_down() {
                app.shutdown()?;
            }
        }
        Ok(())
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown_inner() {
            tracing::error!(%error, "failed to shut down application cleanly");
        }
    }
}
