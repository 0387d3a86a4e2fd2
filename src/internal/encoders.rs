use std::{
    io::{self, Write},
    sync::LazyLock,
};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{
    Level, Record,
    kv::{self, Key, Source, Value, VisitSource},
};
use nu_ansi_term::{Color, Style};
use serde::ser::{SerializeMap, Serializer as _};

static DIMMED: LazyLock<Style> = LazyLock::new(|| Style::new().dimmed());
static DIMMED_AND_ITALIC: LazyLock<Style> = LazyLock::new(|| DIMMED.italic());
static BOLD: LazyLock<Style> = LazyLock::new(|| Style::new().bold());
static ITALIC: LazyLock<Style> = LazyLock::new(|| Style::new().italic());

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode `record` as one JSON object followed by a newline.
///
/// Fixed keys come first (`timestamp`, `level`, `target`, `message`), then the
/// record's key-values in the order they were visited.
pub(crate) fn encode_json<W: Write>(
    record: &Record<'_>,
    timestamp: DateTime<Utc>,
    w: &mut W,
) -> io::Result<()> {
    let mut serializer = serde_json::Serializer::new(&mut *w);
    let mut map = serializer.serialize_map(None)?;
    map.serialize_entry("timestamp", &format_timestamp(timestamp))?;
    map.serialize_entry("level", record.level().as_str())?;
    map.serialize_entry("target", record.target())?;
    map.serialize_entry("message", &record.args().to_string())?;

    let mut fields = JsonFields {
        map: &mut map,
        error: None,
    };
    if record.key_values().visit(&mut fields).is_err() {
        if let Some(error) = fields.error {
            return Err(error.into());
        }
    }

    map.end()?;
    writeln!(w)
}

struct JsonFields<'a, M> {
    map: &'a mut M,
    error: Option<serde_json::Error>,
}

impl<'kvs, M> VisitSource<'kvs> for JsonFields<'_, M>
where
    M: SerializeMap<Error = serde_json::Error>,
{
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        self.map
            .serialize_entry(key.as_str(), &value)
            .map_err(|error| {
                self.error = Some(error);
                kv::Error::msg("failed to serialize field")
            })
    }
}

/// Encode `record` as a single human-readable line.
pub(crate) fn encode_console<W: Write>(
    record: &Record<'_>,
    timestamp: DateTime<Utc>,
    colors: bool,
    w: &mut W,
) -> io::Result<()> {
    let style = |style: Style| if colors { style } else { Style::new() };

    write!(w, "{}", style(*DIMMED).paint(format_timestamp(timestamp)))?;
    write!(w, "{}", style(level_color(record.level()).normal()).paint(level_text(record.level())))?;
    write!(w, " {}", style(*DIMMED_AND_ITALIC).paint(record.target()))?;
    write!(w, " {}", style(*BOLD).paint(record.args().to_string()))?;

    let mut fields = ConsoleFields(Vec::with_capacity(record.key_values().count()));
    // the visitor never fails
    let _ = record.key_values().visit(&mut fields);
    for (idx, (key, value)) in fields.0.iter().enumerate() {
        write!(w, " {}={value}", style(*ITALIC).paint(key.as_str()))?;
        if idx < fields.0.len() - 1 {
            write!(w, ",")?;
        }
    }

    writeln!(w)
}

struct ConsoleFields(Vec<(String, String)>);

impl<'kvs> VisitSource<'kvs> for ConsoleFields {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        self.0.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

fn level_text(level: Level) -> &'static str {
    match level {
        Level::Trace => " TRACE",
        Level::Debug => " DEBUG",
        Level::Info => "  INFO",
        Level::Warn => "  WARN",
        Level::Error => " ERROR",
    }
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Trace => Color::Purple,
        Level::Debug => Color::Blue,
        Level::Info => Color::Green,
        Level::Warn => Color::Yellow,
        Level::Error => Color::Red,
    }
}
