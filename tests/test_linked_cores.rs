//! End-to-end tests of wrapped cores, driven through the `log` macros.

#![allow(clippy::approx_constant)] // 3.14 is sample data

use std::{
    sync::{Arc, Mutex},
    thread,
};

use log::LevelFilter;
use logcontext::{
    WrapError,
    config::AdvancedOptions,
    cores::{Target, WriterCore},
    linking::{SPAN_ID_KEY, TRACE_ID_KEY},
    wrap_background_core, wrap_transaction_core,
};

#[path = "../src/test_utils.rs"]
mod test_utils;

use test_utils::{CollectingProcessor, DeterministicIdGenerator, RecordingCore, remap_timestamps};

/// The `log` macros consult the global max level before any `logger:` argument.
fn enable_all_levels() {
    log::set_max_level(LevelFilter::Trace);
}

fn application(name: &str, processor: &CollectingProcessor) -> logcontext::Application {
    logcontext::configure()
        .with_app_name(name)
        .with_hostname("host-a")
        .with_entity_guid("MXxBUE18")
        .with_additional_span_processor(processor.clone())
        .with_advanced_options(
            AdvancedOptions::default().with_id_generator(DeterministicIdGenerator::new()),
        )
        .finish()
        .unwrap()
}

#[test]
fn test_background_scenario_through_json_core() {
    enable_all_levels();
    let processor = CollectingProcessor::default();
    let app = application("X", &processor);

    let output = Arc::new(Mutex::new(Vec::<u8>::new()));
    let core = WriterCore::builder()
        .with_target(Target::Pipe(output.clone()))
        .build();
    let core = wrap_background_core(core, Some(&app)).unwrap();

    log::info!(logger: &core, foo = 3.14; "hello");

    let bytes = output.lock().unwrap().clone();
    let record: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(record["message"], "hello");
    assert_eq!(record["level"], "INFO");
    assert_eq!(record["foo"], 3.14);
    assert_eq!(record["entity.name"], "X");
    assert_eq!(record["entity.type"], "SERVICE");
    assert_eq!(record["entity.guid"], "MXxBUE18");
    assert_eq!(record["hostname"], "host-a");
    assert!(record.get(TRACE_ID_KEY).is_none());

    let keys: Vec<&str> = record
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert!(keys.contains(&"timestamp"));
}

#[test]
fn test_transaction_fields_through_macros() {
    enable_all_levels();
    let processor = CollectingProcessor::default();
    let app = application("X", &processor);
    let txn = app.start_transaction("checkout");

    let base = RecordingCore::new();
    let core = wrap_transaction_core(base.clone(), Some(&txn)).unwrap();

    log::info!(
        logger: &core,
        zapstring = "region-test-2",
        zapint = 123;
        "this is a transaction log message with custom fields"
    );
    txn.end();
    app.shutdown().unwrap();

    let records = base.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(
        record.keys(),
        [
            "zapstring",
            "zapint",
            "entity.name",
            "entity.type",
            "entity.guid",
            "hostname",
            "trace.id",
            "span.id"
        ]
    );
    assert_eq!(
        record.field(TRACE_ID_KEY),
        Some("000000000000000000000000000000f0")
    );
    assert_eq!(record.field(SPAN_ID_KEY), Some("00000000000000f0"));

    let spans = processor.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(
        spans[0].span_context.trace_id().to_string(),
        "000000000000000000000000000000f0"
    );
}

#[test]
fn test_one_base_core_shared_by_both_modes() {
    enable_all_levels();
    let processor = CollectingProcessor::default();
    let app = application("X", &processor);
    let base = RecordingCore::new();

    let background = wrap_background_core(base.clone(), Some(&app)).unwrap();
    let txn = app.start_transaction("checkout");
    let in_txn = wrap_transaction_core(base.clone(), Some(&txn)).unwrap();

    log::warn!(logger: &background, "outside");
    log::warn!(logger: &in_txn, "inside");

    let records = base.records();
    assert_eq!(records[0].field(TRACE_ID_KEY), None);
    assert!(records[1].field(TRACE_ID_KEY).is_some());
}

#[test]
fn test_nil_handles_are_tolerated() {
    enable_all_levels();
    let base = RecordingCore::new();

    let background = wrap_background_core(base.clone(), None)
        .or_else(WrapError::recover)
        .unwrap();
    let in_txn = wrap_transaction_core(base.clone(), None)
        .or_else(WrapError::recover)
        .unwrap();

    log::info!(logger: &background, foo = 3.14; "hello");
    log::info!(logger: &in_txn, "world");

    let records = base.records();
    assert_eq!(
        records[0].fields,
        vec![("foo".to_owned(), "3.14".to_owned())]
    );
    assert!(records[1].fields.is_empty());
}

#[test]
fn test_concurrent_end_yields_both_ids_or_neither() {
    enable_all_levels();
    let processor = CollectingProcessor::default();
    let app = application("X", &processor);
    let txn = app.start_transaction("checkout");

    let base = RecordingCore::new();
    let core = Arc::new(wrap_transaction_core(base.clone(), Some(&txn)).unwrap());

    let loggers: Vec<_> = (0..4)
        .map(|i| {
            let core = core.clone();
            thread::spawn(move || {
                for n in 0..50 {
                    log::info!(logger: &*core, thread = i, n = n; "tick");
                }
            })
        })
        .collect();
    txn.end();
    for logger in loggers {
        logger.join().unwrap();
    }

    let records = base.records();
    assert_eq!(records.len(), 200);
    for record in records {
        assert_eq!(
            record.field(TRACE_ID_KEY).is_some(),
            record.field(SPAN_ID_KEY).is_some()
        );
        assert_eq!(record.field("entity.name"), Some("X"));
    }
}

#[test]
fn test_json_lines_before_and_after_end() {
    let processor = CollectingProcessor::default();
    let app = application("X", &processor);
    let txn = app.start_transaction("checkout");

    let output = Arc::new(Mutex::new(Vec::<u8>::new()));
    let core = WriterCore::builder()
        .with_target(Target::Pipe(output.clone()))
        .build();
    log::set_max_level(core.max_level().max(log::max_level()));
    let core = wrap_transaction_core(core, Some(&txn)).unwrap();

    log::warn!(logger: &core, attempt = 1; "linked");
    log::debug!(logger: &core, "below the core's level");
    txn.end();
    log::warn!(logger: &core, attempt = 2; "unlinked");

    let bytes = output.lock().unwrap().clone();
    let written = String::from_utf8(bytes).unwrap();
    assert_eq!(
        remap_timestamps(&written),
        "{\"timestamp\":\"1970-01-01T00:00:00.000000Z\",\"level\":\"WARN\",\
         \"target\":\"test_linked_cores\",\"message\":\"linked\",\"attempt\":1,\
         \"entity.name\":\"X\",\"entity.type\":\"SERVICE\",\"entity.guid\":\"MXxBUE18\",\
         \"hostname\":\"host-a\",\"trace.id\":\"000000000000000000000000000000f0\",\
         \"span.id\":\"00000000000000f0\"}\n\
         {\"timestamp\":\"1970-01-01T00:00:00.000001Z\",\"level\":\"WARN\",\
         \"target\":\"test_linked_cores\",\"message\":\"unlinked\",\"attempt\":2,\
         \"entity.name\":\"X\",\"entity.type\":\"SERVICE\",\"entity.guid\":\"MXxBUE18\",\
         \"hostname\":\"host-a\"}\n"
    );
}
