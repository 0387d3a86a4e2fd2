//! Base `log` cores which encode records and write them out.
//!
//! These are plain sinks with no knowledge of applications or transactions; wrap them with
//! [`wrap_background_core`][crate::wrap_background_core] or
//! [`wrap_transaction_core`][crate::wrap_transaction_core] to add linkage.

use std::{
    collections::HashMap,
    io::{self, IsTerminal, Write},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::Utc;
use log::{LevelFilter, Log, Metadata, Record};

use crate::internal::{
    encoders::{encode_console, encode_json},
    env::get_optional_env,
};

/// How a [`WriterCore`] renders each record.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable console lines.
    Console,
}

/// Whether to show colors in console encoding.
#[derive(Default, Debug, Clone, Copy)]
pub enum ConsoleColors {
    /// Decide based on whether the target is a terminal.
    #[default]
    Auto,
    /// Always show colors.
    Always,
    /// Never show colors.
    Never,
}

/// Output target, either `stdout`, `stderr` or a custom pipe.
#[derive(Default, Clone)]
pub enum Target {
    /// Output will be sent to standard output.
    #[default]
    Stdout,
    /// Output will be sent to standard error.
    Stderr,
    /// Output will be sent to a custom pipe.
    ///
    /// The outer Arc allows inspecting the output from elsewhere, e.g. in tests.
    Pipe(Arc<Mutex<dyn Write + Send + 'static>>),
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Stdout => write!(f, "stdout"),
            Target::Stderr => write!(f, "stderr"),
            Target::Pipe(_) => write!(f, "pipe"),
        }
    }
}

impl Target {
    fn is_terminal(&self) -> bool {
        match self {
            Target::Stdout => io::stdout().is_terminal(),
            Target::Stderr => io::stderr().is_terminal(),
            Target::Pipe(_) => false,
        }
    }
}

/// A `log` core which filters, encodes and writes records to a [`Target`].
///
/// Write errors are dropped, so logging never fails.
#[derive(Debug)]
pub struct WriterCore {
    filter: env_filter::Filter,
    encoding: Encoding,
    target: Target,
    colors: bool,
}

impl WriterCore {
    /// Start building a core; defaults to JSON on stdout at `Info` level.
    pub fn builder() -> WriterCoreBuilder {
        WriterCoreBuilder::default()
    }

    /// The most verbose level this core lets through, for use with
    /// [`log::set_max_level`].
    #[must_use]
    pub fn max_level(&self) -> LevelFilter {
        self.filter.filter()
    }

    /// The configured encoding.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn encode(&self, record: &Record<'_>, buffer: &mut Vec<u8>) -> io::Result<()> {
        let timestamp = Utc::now();
        match self.encoding {
            Encoding::Json => encode_json(record, timestamp, buffer),
            Encoding::Console => encode_console(record, timestamp, self.colors, buffer),
        }
    }

    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        match &self.target {
            Target::Stdout => io::stdout().lock().write_all(bytes),
            Target::Stderr => io::stderr().lock().write_all(bytes),
            Target::Pipe(pipe) => pipe
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(bytes),
        }
    }
}

impl Log for WriterCore {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.filter.matches(record) {
            return;
        }

        let mut buffer = Vec::with_capacity(256);
        if self.encode(record, &mut buffer).is_ok() {
            let _ = self.write_all(&buffer);
        }
    }

    fn flush(&self) {
        let _ = match &self.target {
            Target::Stdout => io::stdout().flush(),
            Target::Stderr => io::stderr().flush(),
            Target::Pipe(pipe) => pipe.lock().unwrap_or_else(PoisonError::into_inner).flush(),
        };
    }
}

/// Builder for [`WriterCore`].
#[must_use = "call `.build()` to create the core."]
pub struct WriterCoreBuilder {
    filter: env_filter::Builder,
    filter_configured: bool,
    encoding: Encoding,
    target: Target,
    colors: ConsoleColors,
}

impl Default for WriterCoreBuilder {
    fn default() -> Self {
        Self {
            filter: env_filter::Builder::new(),
            filter_configured: false,
            encoding: Encoding::default(),
            target: Target::default(),
            colors: ConsoleColors::default(),
        }
    }
}

impl WriterCoreBuilder {
    /// Set the encoding.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the output target.
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Control colors in console encoding.
    pub fn with_colors(mut self, colors: ConsoleColors) -> Self {
        self.colors = colors;
        self
    }

    /// Let through records at `level` and more severe, for every target.
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.filter.filter_level(level);
        self.filter_configured = true;
        self
    }

    /// Parse filter directives in the `env_logger` format, e.g. `info,my_crate=debug`.
    pub fn with_filters(mut self, directives: &str) -> Self {
        self.filter.parse(directives);
        self.filter_configured = true;
        self
    }

    /// Parse filter directives from the environment variable `var` if it is set, such as
    /// `RUST_LOG`.
    pub fn with_filters_from_env(self, var: &str) -> Self {
        self.with_filters_from(var, None)
    }

    fn with_filters_from(self, var: &str, env: Option<&HashMap<String, String>>) -> Self {
        match get_optional_env(var, env) {
            Ok(Some(directives)) => self.with_filters(&directives),
            _ => self,
        }
    }

    /// Build the core. Without any filter configuration, the level is `Info`.
    pub fn build(mut self) -> WriterCore {
        if !self.filter_configured {
            self.filter.filter_level(LevelFilter::Info);
        }
        let colors = match self.colors {
            ConsoleColors::Always => true,
            ConsoleColors::Never => false,
            ConsoleColors::Auto => self.target.is_terminal(),
        };
        WriterCore {
            filter: self.filter.build(),
            encoding: self.encoding,
            target: self.target,
            colors,
        }
    }
}
