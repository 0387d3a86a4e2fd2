#![allow(dead_code)] // used by lib and test suites individually

use std::{
    borrow::Cow,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time,
};

use log::{
    Level, LevelFilter, Log, Metadata, Record,
    kv::{self, Key, Source, Value, VisitSource},
};
use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry_sdk::{
    Resource,
    error::OTelSdkResult,
    trace::{IdGenerator, SpanData, SpanProcessor},
};
use regex::{Captures, Regex};

#[derive(Debug)]
pub struct DeterministicIdGenerator {
    next_trace_id: AtomicU64,
    next_span_id: AtomicU64,
}

impl IdGenerator for DeterministicIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(u128::from(
            self.next_trace_id.fetch_add(1, Ordering::Relaxed),
        ))
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(self.next_span_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl DeterministicIdGenerator {
    pub fn new() -> Self {
        // start at OxF0 because 0 is reserved for invalid IDs,
        // and if we have a couple of bytes used, it's a more interesting check of
        // the hex formatting
        Self {
            next_trace_id: 0xF0.into(),
            next_span_id: 0xF0.into(),
        }
    }
}

/// Span processor keeping every finished span, and the provider's resource, in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingProcessor {
    spans: Arc<Mutex<Vec<SpanData>>>,
    resource: Arc<Mutex<Option<Resource>>>,
}

impl CollectingProcessor {
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap().clone()
    }

    pub fn resource(&self) -> Option<Resource> {
        self.resource.lock().unwrap().clone()
    }
}

impl SpanProcessor for CollectingProcessor {
    fn on_start(&self, _: &mut opentelemetry_sdk::trace::Span, _: &opentelemetry::Context) {}

    fn on_end(&self, span: SpanData) {
        self.spans.lock().unwrap().push(span);
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _: time::Duration) -> OTelSdkResult {
        Ok(())
    }

    fn set_resource(&mut self, resource: &Resource) {
        *self.resource.lock().unwrap() = Some(resource.clone());
    }
}

/// A record as seen by a [`RecordingCore`], with every value rendered to a string.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub line: Option<u32>,
    pub fields: Vec<(String, String)>,
}

impl CapturedRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }
}

/// A `log` core which captures records in memory; clones share the same store.
#[derive(Debug, Clone)]
pub struct RecordingCore {
    records: Arc<Mutex<Vec<CapturedRecord>>>,
    flushes: Arc<AtomicUsize>,
    level: LevelFilter,
}

impl RecordingCore {
    pub fn new() -> Self {
        Self {
            records: Arc::default(),
            flushes: Arc::default(),
            level: LevelFilter::Trace,
        }
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }
}

struct CollectFields(Vec<(String, String)>);

impl<'kvs> VisitSource<'kvs> for CollectFields {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        self.0.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

impl Log for RecordingCore {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut fields = CollectFields(Vec::new());
        record.key_values().visit(&mut fields).unwrap();
        self.records.lock().unwrap().push(CapturedRecord {
            level: record.level(),
            target: record.target().to_owned(),
            message: record.args().to_string(),
            line: record.line(),
            fields: fields.0,
        });
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Log one record with the given fields straight into `core`.
pub fn emit(core: &dyn Log, level: Level, message: &str, fields: &[(&str, Value<'_>)]) {
    core.log(
        &Record::builder()
            .args(format_args!("{message}"))
            .level(level)
            .target("test")
            .key_values(&fields)
            .build(),
    );
}

pub fn remap_timestamps(output: &str) -> Cow<'_, str> {
    // Replace all timestamps in output to make them deterministic
    let mut timestamp = chrono::DateTime::UNIX_EPOCH;
    let re = Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}Z").unwrap();
    re.replace_all(output, |_: &Captures<'_>| {
        let replaced = timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        timestamp += time::Duration::from_micros(1);
        replaced
    })
}
