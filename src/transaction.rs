use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use opentelemetry::{
    Key, KeyValue,
    trace::{Span as _, SpanContext, SpanId, Status, TraceId},
};
use opentelemetry_sdk::trace::Span;

use crate::{application::Application, linking::LinkingMetadata};

/// One tracked unit of work, correlated with a trace id and a span id.
///
/// Created by [`Application::start_transaction`]. Clones refer to the same unit of work;
/// ending any clone ends them all. Once ended, the transaction no longer reports trace
/// or span ids.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

struct TransactionInner {
    name: String,
    application: Application,
    span_context: SpanContext,
    span: Mutex<Option<Span>>,
    ended: AtomicBool,
    warned_after_end: AtomicBool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("name", &self.inner.name)
            .field("trace_id", &self.trace_id())
            .field("span_id", &self.span_id())
            .field("ended", &self.is_ended())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn recorded(application: Application, name: String, span: Span) -> Self {
        let span_context = span.span_context().clone();
        Self::new(application, name, span_context, Some(span))
    }

    pub(crate) fn unrecorded(application: Application, name: String) -> Self {
        Self::new(application, name, SpanContext::empty_context(), None)
    }

    fn new(
        application: Application,
        name: String,
        span_context: SpanContext,
        span: Option<Span>,
    ) -> Self {
        Transaction {
            inner: Arc::new(TransactionInner {
                name,
                application,
                span_context,
                span: Mutex::new(span),
                ended: AtomicBool::new(false),
                warned_after_end: AtomicBool::new(false),
            }),
        }
    }

    /// The transaction name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The application which started this transaction.
    #[must_use]
    pub fn application(&self) -> &Application {
        &self.inner.application
    }

    /// Whether [`end`][Self::end] has been called on this transaction (or any clone).
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// The trace id, while the transaction is recorded and not yet ended.
    #[must_use]
    pub fn trace_id(&self) -> Option<TraceId> {
        self.active_context().map(SpanContext::trace_id)
    }

    /// The span id, while the transaction is recorded and not yet ended.
    #[must_use]
    pub fn span_id(&self) -> Option<SpanId> {
        self.active_context().map(SpanContext::span_id)
    }

    fn active_context(&self) -> Option<&SpanContext> {
        let context = &self.inner.span_context;
        (context.is_valid() && !self.is_ended()).then_some(context)
    }

    /// Application identity plus, while active, the transaction's trace and span ids.
    ///
    /// Both ids are read from one snapshot, so a concurrent [`end`][Self::end] yields
    /// either both or neither.
    #[must_use]
    pub fn linking_metadata(&self) -> LinkingMetadata<'_> {
        let mut metadata = self.inner.application.linking_metadata();
        if let Some(context) = self.active_context() {
            metadata.trace_id = Some(context.trace_id());
            metadata.span_id = Some(context.span_id());
        }
        metadata
    }

    /// Set an attribute on the underlying span. Ignored once the transaction has ended.
    pub fn add_attribute<K, V>(&self, key: K, value: V)
    where
        K: Into<Key>,
        V: Into<opentelemetry::Value>,
    {
        self.with_span(|span| span.set_attribute(KeyValue::new(key, value)));
    }

    /// Record an error on the underlying span and mark it failed. Ignored once the
    /// transaction has ended.
    pub fn notice_error(&self, error: &dyn std::error::Error) {
        self.with_span(|span| {
            span.record_error(error);
            span.set_status(Status::error(error.to_string()));
        });
    }

    /// End the transaction.
    ///
    /// Returns `true` if this call ended it, `false` if it had already ended.
    pub fn end(&self) -> bool {
        if self.inner.ended.swap(true, Ordering::AcqRel) {
            return false;
        }

        let span = self
            .inner
            .span
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut span) = span {
            span.end();
        }

        tracing::debug!(transaction = %self.inner.name, "ended transaction");
        true
    }

    /// Returns `true` exactly once, the first time it is called after the transaction ended.
    pub(crate) fn first_use_after_end(&self) -> bool {
        self.is_ended() && !self.inner.warned_after_end.swap(true, Ordering::AcqRel)
    }

    fn with_span(&self, f: impl FnOnce(&mut Span)) {
        if let Some(span) = self
            .inner
            .span
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            f(span);
        }
    }
}
