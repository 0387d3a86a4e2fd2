//! Wrapping `log` cores so every record carries monitoring linkage.

use std::fmt;

use log::{Log, Metadata, Record, kv::Source};

use crate::{
    application::Application, linking::LinkingMetadata, transaction::Transaction,
};

/// What a [`LinkedCore`] links its records to.
#[derive(Debug, Clone)]
pub enum SinkMode {
    /// Logs emitted outside any transaction, tagged with application identity only.
    Background(Application),
    /// Logs emitted during one transaction, tagged with its trace and span ids.
    Transaction(Transaction),
}

impl SinkMode {
    fn linking_metadata(&self) -> LinkingMetadata<'_> {
        match self {
            SinkMode::Background(app) => app.linking_metadata(),
            SinkMode::Transaction(txn) => {
                if txn.first_use_after_end() {
                    tracing::warn!(
                        transaction = %txn.name(),
                        "logging through a core bound to an ended transaction, trace linkage omitted"
                    );
                }
                txn.linking_metadata()
            }
        }
    }
}

/// A [`Log`] implementation which appends [`LinkingMetadata`] to each record before
/// forwarding it to the wrapped core.
///
/// Returned by [`wrap_background_core`] and [`wrap_transaction_core`]. `enabled` and
/// `flush` are forwarded untouched, and the original key-values keep their order ahead
/// of the appended linkage fields.
pub struct LinkedCore<L> {
    inner: L,
    mode: Option<SinkMode>,
}

impl<L> LinkedCore<L> {
    /// A core which forwards records unchanged.
    pub fn passthrough(inner: L) -> Self {
        LinkedCore { inner, mode: None }
    }

    /// Wrap `inner` with an explicit mode, skipping the checks done by the `wrap_*`
    /// functions.
    pub fn with_mode(inner: L, mode: SinkMode) -> Self {
        LinkedCore {
            inner,
            mode: Some(mode),
        }
    }

    /// The linking mode, or `None` for a pass-through core.
    #[must_use]
    pub fn mode(&self) -> Option<&SinkMode> {
        self.mode.as_ref()
    }

    /// The wrapped core.
    #[must_use]
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Unwrap, returning the original core.
    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: fmt::Debug> fmt::Debug for LinkedCore<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedCore")
            .field("inner", &self.inner)
            .field("mode", &self.mode)
            .finish()
    }
}

impl<L: Log> Log for LinkedCore<L> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        let Some(mode) = &self.mode else {
            self.inner.log(record);
            return;
        };

        if !self.inner.enabled(record.metadata()) {
            return;
        }

        let linking = mode.linking_metadata();
        let key_values: [&dyn Source; 2] = [record.key_values(), &linking];
        self.inner
            .log(&record.to_builder().key_values(&key_values).build());
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Why a core could not be wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WrapErrorKind {
    /// No application was given; there is nothing to link to.
    #[error("nil application: the core was returned unwrapped")]
    NilApplication,
    /// No transaction was given; there is nothing to link to.
    #[error("nil transaction: the core was returned unwrapped")]
    NilTransaction,
    /// The application has been shut down.
    #[error("the application has been shut down")]
    ApplicationShutdown,
    /// The transaction has already ended.
    #[error("the transaction has already ended")]
    TransactionEnded,
}

impl WrapErrorKind {
    /// Whether this is an expected "nothing to wrap" condition rather than a failure.
    #[must_use]
    pub fn is_nil_handle(self) -> bool {
        matches!(
            self,
            WrapErrorKind::NilApplication | WrapErrorKind::NilTransaction
        )
    }
}

/// Error returned by [`wrap_background_core`] and [`wrap_transaction_core`].
///
/// The unwrapped core is handed back either way. For the nil-handle kinds, which callers
/// are expected to tolerate, [`recover`][Self::recover] turns the error into a
/// pass-through [`LinkedCore`]:
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use logcontext::{WrapError, wrap_background_core};
///
/// let base = logcontext::cores::WriterCore::builder().build();
/// let core = wrap_background_core(base, None).or_else(WrapError::recover)?;
/// assert!(core.mode().is_none());
/// # Ok(())
/// # }
/// ```
///
/// For any other kind, [`into_core`][Self::into_core] gives the core back so it can still
/// be used unlinked:
///
/// ```rust
/// use logcontext::{WrapErrorKind, wrap_background_core};
///
/// let app = logcontext::configure().with_app_name("done").finish().unwrap();
/// app.shutdown().unwrap();
///
/// let base = logcontext::cores::WriterCore::builder().build();
/// let err = wrap_background_core(base, Some(&app)).unwrap_err();
/// assert_eq!(err.kind(), WrapErrorKind::ApplicationShutdown);
/// let _unlinked = err.into_core();
/// ```
pub struct WrapError<L> {
    kind: WrapErrorKind,
    core: L,
}

impl<L> WrapError<L> {
    fn new(kind: WrapErrorKind, core: L) -> Self {
        WrapError { kind, core }
    }

    /// What went wrong.
    #[must_use]
    pub fn kind(&self) -> WrapErrorKind {
        self.kind
    }

    /// Whether this is an expected "nothing to wrap" condition rather than a failure.
    #[must_use]
    pub fn is_nil_handle(&self) -> bool {
        self.kind.is_nil_handle()
    }

    /// Take back the core which was not wrapped.
    pub fn into_core(self) -> L {
        self.core
    }

    /// Recover a pass-through core from a nil-handle error; other errors are returned
    /// as-is.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged unless [`is_nil_handle`][Self::is_nil_handle] holds.
    pub fn recover(self) -> Result<LinkedCore<L>, Self> {
        if self.is_nil_handle() {
            Ok(LinkedCore::passthrough(self.core))
        } else {
            Err(self)
        }
    }
}

impl<L> fmt::Debug for WrapError<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapError")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<L> fmt::Display for WrapError<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl<L> std::error::Error for WrapError<L> {}

/// Wrap `base` so that every record carries the identity of `app`.
///
/// # Errors
///
/// - [`WrapErrorKind::NilApplication`] when `app` is `None`; recoverable, see
///   [`WrapError::recover`].
/// - [`WrapErrorKind::ApplicationShutdown`] when `app` has been shut down.
pub fn wrap_background_core<L: Log>(
    base: L,
    app: Option<&Application>,
) -> Result<LinkedCore<L>, WrapError<L>> {
    let Some(app) = app else {
        tracing::debug!("no application given, background core left unwrapped");
        return Err(WrapError::new(WrapErrorKind::NilApplication, base));
    };
    if app.is_shut_down() {
        return Err(WrapError::new(WrapErrorKind::ApplicationShutdown, base));
    }
    Ok(LinkedCore::with_mode(base, SinkMode::Background(app.clone())))
}

/// Wrap `base` so that every record carries the trace and span ids of `txn`, along with
/// the identity of the application which started it.
///
/// The returned core must not outlive the transaction's use: once `txn` has ended,
/// records are forwarded with application identity only.
///
/// # Errors
///
/// - [`WrapErrorKind::NilTransaction`] when `txn` is `None`; recoverable, see
///   [`WrapError::recover`].
/// - [`WrapErrorKind::TransactionEnded`] when `txn` has already ended.
/// - [`WrapErrorKind::ApplicationShutdown`] when the owning application has been shut down.
pub fn wrap_transaction_core<L: Log>(
    base: L,
    txn: Option<&Transaction>,
) -> Result<LinkedCore<L>, WrapError<L>> {
    let Some(txn) = txn else {
        tracing::debug!("no transaction given, transaction core left unwrapped");
        return Err(WrapError::new(WrapErrorKind::NilTransaction, base));
    };
    if txn.is_ended() {
        return Err(WrapError::new(WrapErrorKind::TransactionEnded, base));
    }
    if txn.application().is_shut_down() {
        return Err(WrapError::new(WrapErrorKind::ApplicationShutdown, base));
    }
    Ok(LinkedCore::with_mode(base, SinkMode::Transaction(txn.clone())))
}
