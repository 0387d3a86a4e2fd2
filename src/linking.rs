//! Linking metadata: the fields which tie a log record to the application and
//! transaction that produced it.

use log::kv::{self, Key, Source, Value, VisitSource};
use opentelemetry::trace::{SpanId, TraceId};

/// Key of the application name field.
pub const ENTITY_NAME_KEY: &str = "entity.name";
/// Key of the entity type field.
pub const ENTITY_TYPE_KEY: &str = "entity.type";
/// Key of the entity GUID field.
pub const ENTITY_GUID_KEY: &str = "entity.guid";
/// Key of the hostname field.
pub const HOSTNAME_KEY: &str = "hostname";
/// Key of the trace id field, only present inside a transaction.
pub const TRACE_ID_KEY: &str = "trace.id";
/// Key of the span id field, only present inside a transaction.
pub const SPAN_ID_KEY: &str = "span.id";

/// Entity type reported for every application.
pub const ENTITY_TYPE_SERVICE: &str = "SERVICE";

/// The linkage fields appended to each record by a [`LinkedCore`][crate::LinkedCore].
///
/// As a [`log::kv::Source`] it visits the present fields in a fixed order: entity name,
/// entity type, entity GUID, hostname, trace id, span id. Trace and span ids are rendered
/// as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkingMetadata<'a> {
    /// The application name.
    pub entity_name: &'a str,
    /// The entity type, always [`ENTITY_TYPE_SERVICE`] for applications.
    pub entity_type: &'a str,
    /// The entity GUID, if the application knows it.
    pub entity_guid: Option<&'a str>,
    /// The host the application runs on.
    pub hostname: &'a str,
    /// Trace id of the active transaction.
    pub trace_id: Option<TraceId>,
    /// Span id of the active transaction.
    pub span_id: Option<SpanId>,
}

impl LinkingMetadata<'_> {
    /// Whether this metadata links to a transaction.
    #[must_use]
    pub fn has_trace(&self) -> bool {
        self.trace_id.is_some()
    }
}

impl Source for LinkingMetadata<'_> {
    fn visit<'kvs>(&'kvs self, visitor: &mut dyn VisitSource<'kvs>) -> Result<(), kv::Error> {
        visitor.visit_pair(Key::from_str(ENTITY_NAME_KEY), Value::from(self.entity_name))?;
        visitor.visit_pair(Key::from_str(ENTITY_TYPE_KEY), Value::from(self.entity_type))?;
        if let Some(entity_guid) = self.entity_guid {
            visitor.visit_pair(Key::from_str(ENTITY_GUID_KEY), Value::from(entity_guid))?;
        }
        visitor.visit_pair(Key::from_str(HOSTNAME_KEY), Value::from(self.hostname))?;
        if let Some(trace_id) = &self.trace_id {
            visitor.visit_pair(Key::from_str(TRACE_ID_KEY), Value::from_display(trace_id))?;
        }
        if let Some(span_id) = &self.span_id {
            visitor.visit_pair(Key::from_str(SPAN_ID_KEY), Value::from_display(span_id))?;
        }
        Ok(())
    }

    fn count(&self) -> usize {
        3 + usize::from(self.entity_guid.is_some())
            + usize::from(self.trace_id.is_some())
            + usize::from(self.span_id.is_some())
    }
}
