//! Wraps one JSON core twice, once for background logs and once for a transaction, and
//! logs a few structured records through each.
//!
//! Records go to stdout as JSON lines; the SDK's own diagnostics go to stderr, filtered
//! by `RUST_LOG`.

#![allow(clippy::approx_constant)] // 3.14 is sample data

use std::{sync::Arc, time::Duration};

use logcontext::{
    ConnectError, WrapError,
    cores::{Encoding, Target, WriterCore},
    wrap_background_core, wrap_transaction_core,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logcontext=debug")),
        )
        .init();

    let app = logcontext::configure()
        .with_app_name("logcontext example")
        .finish()?;

    match app.wait_for_connection(Duration::from_secs(5)) {
        Ok(()) | Err(ConnectError::Disabled) => {}
        Err(error) => return Err(error.into()),
    }

    let core = Arc::new(
        WriterCore::builder()
            .with_encoding(Encoding::Json)
            .with_target(Target::Stdout)
            .build(),
    );
    log::set_max_level(core.max_level());

    let background_core =
        wrap_background_core(core.clone(), Some(&app)).or_else(WrapError::recover)?;
    log::info!(
        logger: &background_core,
        foo = 3.14;
        "this is a background log message with fields test"
    );

    let txn = app.start_transaction("logcontext example transaction");
    let txn_core = wrap_transaction_core(core, Some(&txn)).or_else(WrapError::recover)?;
    log::info!(
        logger: &txn_core,
        zapstring = "region-test-2",
        zapint = 123,
        zapduration:? = Duration::from_millis(200),
        zapbool = true,
        zapobject:serde = serde_json::json!({"foo": "bar"}),
        zapmap:serde = serde_json::json!({"pi": 3.14, "duration": "2s"});
        "this is a transaction log message with custom fields"
    );

    let err = std::io::Error::other("OW! an error occurred");
    txn.notice_error(&err);
    log::error!(logger: &txn_core, error:err = err; "this is an error log message");

    txn.end();

    app.shutdown()?;
    Ok(())
}
