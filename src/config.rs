//! Configuration options for the monitoring application.
//!
//! See [`ApplicationConfigBuilder`] for documentation of all these options.

use std::{collections::HashMap, marker::PhantomData, str::FromStr};

use opentelemetry_sdk::trace::{IdGenerator, SpanProcessor};

use crate::{ConfigureError, application::Application, internal::env::system_hostname};

/// Builder for application configuration, returned from [`logcontext::configure()`][crate::configure].
#[must_use = "call `.finish()` to complete application configuration."]
#[derive(Default)]
pub struct ApplicationConfigBuilder {
    pub(crate) app_name: Option<String>,
    pub(crate) entity_guid: Option<String>,
    pub(crate) hostname: Option<String>,
    pub(crate) enabled: Option<bool>,
    pub(crate) additional_span_processors: Vec<BoxedSpanProcessor>,
    pub(crate) advanced: Option<AdvancedOptions>,
}

impl ApplicationConfigBuilder {
    /// Set the application name, reported as `entity.name` on linked log records.
    ///
    /// Defaults to the value of `LOGCONTEXT_APP_NAME`, then `OTEL_SERVICE_NAME`, then
    /// `"Rust Application"`.
    pub fn with_app_name<T: Into<String>>(mut self, app_name: T) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Set the entity GUID assigned to this application by the monitoring backend.
    ///
    /// Defaults to the value of `LOGCONTEXT_ENTITY_GUID` if set. When unknown, linked
    /// log records carry no `entity.guid` field.
    pub fn with_entity_guid<T: Into<String>>(mut self, entity_guid: T) -> Self {
        self.entity_guid = Some(entity_guid.into());
        self
    }

    /// Set the hostname reported as `hostname` on linked log records.
    ///
    /// Defaults to `LOGCONTEXT_HOSTNAME`, then `HOSTNAME`, then the machine hostname.
    pub fn with_hostname<T: Into<String>>(mut self, hostname: T) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Whether the application records transactions at all.
    ///
    /// A disabled application still provides its identity for background log linkage,
    /// but its transactions carry no trace or span ids.
    ///
    /// Defaults to the value of `LOGCONTEXT_ENABLED` if set, otherwise `true`.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Add a span processor which receives every finished transaction span.
    pub fn with_additional_span_processor<T: SpanProcessor + 'static>(
        mut self,
        span_processor: T,
    ) -> Self {
        self.additional_span_processors
            .push(BoxedSpanProcessor::new(Box::new(span_processor)));
        self
    }

    /// Configure [advanced options](crate::config::AdvancedOptions).
    pub fn with_advanced_options(mut self, advanced: AdvancedOptions) -> Self {
        self.advanced = Some(advanced);
        self
    }

    /// Finish configuring the application and connect it.
    ///
    /// Unlike a global logger, this sets no process-wide state, so several applications
    /// may coexist.
    ///
    /// # Errors
    ///
    /// See [`ConfigureError`] for possible errors.
    pub fn finish(self) -> Result<Application, ConfigureError> {
        Application::from_config_builder(self)
    }
}

/// Options used for fine-grained control over the monitoring SDK.
#[derive(Default)]
pub struct AdvancedOptions {
    pub(crate) id_generator: Option<BoxedIdGenerator>,
    pub(crate) resources: Vec<opentelemetry_sdk::Resource>,
}

impl AdvancedOptions {
    /// Set the ID generator for trace and span IDs.
    #[must_use]
    pub fn with_id_generator<T: IdGenerator + Send + Sync + 'static>(
        mut self,
        generator: T,
    ) -> Self {
        self.id_generator = Some(BoxedIdGenerator::new(Box::new(generator)));
        self
    }

    /// Add a [`Resource`](opentelemetry_sdk::Resource) to the tracer provider backing
    /// the application.
    #[must_use]
    pub fn with_resource(mut self, resource: opentelemetry_sdk::Resource) -> Self {
        self.resources.push(resource);
        self
    }
}

/// Wrapper around a `SpanProcessor` to use in `additional_span_processors`.
#[derive(Debug)]
pub(crate) struct BoxedSpanProcessor(Box<dyn SpanProcessor>);

impl BoxedSpanProcessor {
    pub fn new(processor: Box<dyn SpanProcessor + Send + Sync>) -> Self {
        BoxedSpanProcessor(processor)
    }
}

impl SpanProcessor for BoxedSpanProcessor {
    fn on_start(&self, span: &mut opentelemetry_sdk::trace::Span, cx: &opentelemetry::Context) {
        self.0.on_start(span, cx);
    }

    fn on_end(&self, span: opentelemetry_sdk::trace::SpanData) {
        self.0.on_end(span);
    }

    fn force_flush(&self) -> opentelemetry_sdk::error::OTelSdkResult {
        self.0.force_flush()
    }

    fn shutdown(&self) -> opentelemetry_sdk::error::OTelSdkResult {
        self.0.shutdown()
    }

    fn shutdown_with_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> opentelemetry_sdk::error::OTelSdkResult {
        self.0.shutdown_with_timeout(timeout)
    }

    fn set_resource(&mut self, resource: &opentelemetry_sdk::Resource) {
        self.0.set_resource(resource);
    }
}

/// Wrapper around an `IdGenerator` to use in `id_generator`.
#[derive(Debug)]
pub(crate) struct BoxedIdGenerator(Box<dyn IdGenerator>);

impl BoxedIdGenerator {
    pub fn new(generator: Box<dyn IdGenerator>) -> Self {
        BoxedIdGenerator(generator)
    }
}

impl IdGenerator for BoxedIdGenerator {
    fn new_trace_id(&self) -> opentelemetry::trace::TraceId {
        self.0.new_trace_id()
    }

    fn new_span_id(&self) -> opentelemetry::trace::SpanId {
        self.0.new_span_id()
    }
}

pub(crate) trait ParseConfigValue: Sized {
    fn parse_config_value(parameter: &'static str, s: &str) -> Result<Self, ConfigureError>;
}

impl<T: FromStr> ParseConfigValue for T {
    fn parse_config_value(parameter: &'static str, s: &str) -> Result<Self, ConfigureError> {
        s.trim()
            .parse()
            .map_err(|_| ConfigureError::InvalidConfigurationValue {
                parameter,
                value: s.to_owned(),
            })
    }
}

pub(crate) struct ConfigValue<T> {
    env_vars: &'static [&'static str],
    default_value: fn() -> T,
}

impl<T> ConfigValue<T> {
    const fn new(env_vars: &'static [&'static str], default_value: fn() -> T) -> Self {
        Self {
            env_vars,
            default_value,
        }
    }
}

impl<T: ParseConfigValue> ConfigValue<T> {
    /// Resolves a config value, using the provided value if present, otherwise falling back to the environment variable or the default.
    pub(crate) fn resolve(
        &self,
        value: Option<T>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<T, ConfigureError> {
        if let Some(v) = try_resolve_from_env(value, self.env_vars, env)? {
            return Ok(v);
        }

        Ok((self.default_value)())
    }
}

pub(crate) struct OptionalConfigValue<T> {
    env_vars: &'static [&'static str],
    default_value: PhantomData<Option<T>>,
}

impl<T> OptionalConfigValue<T> {
    const fn new(env_vars: &'static [&'static str]) -> Self {
        Self {
            env_vars,
            default_value: PhantomData,
        }
    }
}

impl<T: ParseConfigValue> OptionalConfigValue<T> {
    /// Resolves an optional config value, using the provided value if present, otherwise falling back to the environment variable or `None`.
    pub(crate) fn resolve(
        &self,
        value: Option<T>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<Option<T>, ConfigureError> {
        try_resolve_from_env(value, self.env_vars, env)
    }
}

fn try_resolve_from_env<T>(
    value: Option<T>,
    env_vars: &'static [&'static str],
    env: Option<&HashMap<String, String>>,
) -> Result<Option<T>, ConfigureError>
where
    T: ParseConfigValue,
{
    if let Some(v) = value {
        return Ok(Some(v));
    }

    for var in env_vars {
        if let Some(s) = crate::internal::env::get_optional_env(var, env)? {
            return T::parse_config_value(var, &s).map(Some);
        }
    }

    Ok(None)
}

pub(crate) static LOGCONTEXT_APP_NAME: ConfigValue<String> =
    ConfigValue::new(&["LOGCONTEXT_APP_NAME", "OTEL_SERVICE_NAME"], || {
        "Rust Application".to_owned()
    });

pub(crate) static LOGCONTEXT_ENTITY_GUID: OptionalConfigValue<String> =
    OptionalConfigValue::new(&["LOGCONTEXT_ENTITY_GUID"]);

pub(crate) static LOGCONTEXT_HOSTNAME: ConfigValue<String> =
    ConfigValue::new(&["LOGCONTEXT_HOSTNAME", "HOSTNAME"], system_hostname);

pub(crate) static LOGCONTEXT_ENABLED: ConfigValue<bool> =
    ConfigValue::new(&["LOGCONTEXT_ENABLED"], || true);
