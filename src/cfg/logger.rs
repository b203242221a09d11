// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Structured JSON logging (C13), configured from `LogConfig`. One JSON
//! object per line: timestamp, level, and the event's fields flattened,
//! plus whichever of {target, module path, line number} the config asks
//! for. Fields set on an enclosing `tracing::info_span!` are merged into
//! every event emitted inside that span, so every log line produced while
//! exchanging one ComID/HSN/TSN carries them without repeating them at each
//! call site.

use std::fmt::Debug;
use std::io;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{span, Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cfg::config::{LogConfig, LogSink};

#[derive(Default, Debug)]
struct SpanFields(serde_json::Map<String, serde_json::Value>);

/// Captures the fields recorded on `tracing::info_span!(...)` calls so
/// `JsonFormatter` can fold them into every event emitted inside that span.
struct CaptureSpanFieldsLayer;

impl<S> Layer<S> for CaptureSpanFieldsLayer
where S: Subscriber + for<'a> LookupSpan<'a>
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut map = serde_json::Map::with_capacity(8);
        attrs.record(&mut JsonVisitor { fields: &mut map });
        span.extensions_mut().insert(SpanFields(map));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            values.record(&mut JsonVisitor { fields: &mut fields.0 });
        }
    }
}

struct JsonVisitor<'a> {
    fields: &'a mut serde_json::Map<String, serde_json::Value>,
}

impl tracing::field::Visit for JsonVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn Debug) {
        self.fields.insert(field.name().to_string(), json!(format!("{value:?}")));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields.insert(field.name().to_string(), json!(value));
    }
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    fields: serde_json::Map<String, serde_json::Value>,
}

struct JsonFormatter {
    config: LogConfig,
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let mut fields = serde_json::Map::new();
        event.record(&mut JsonVisitor { fields: &mut fields });

        if let Some(scope) = ctx.event_scope() {
            let mut span_names = Vec::with_capacity(8);
            for span in scope.from_root() {
                span_names.push(span.name().to_string());
                if let Some(captured) = span.extensions().get::<SpanFields>() {
                    for (key, value) in &captured.0 {
                        fields.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
            fields.insert("span_names".to_string(), json!(span_names));
        }

        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level: event.metadata().level().to_string(),
            target: self.config.show_target.then(|| event.metadata().target().to_string()),
            module_path: self.config.show_module.then(|| event.metadata().module_path().unwrap_or("").to_string()),
            line: self.config.show_line.then(|| event.metadata().line()).flatten(),
            fields,
        };

        writeln!(writer, "{}", serde_json::to_string(&entry).map_err(|_| std::fmt::Error)?)
    }
}

/// Initializes the global `tracing` subscriber. Returns the
/// `tracing_appender` guard; the caller must keep it alive for the process
/// lifetime or buffered log lines are dropped on exit.
pub fn init_logger(config: &LogConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (non_blocking, guard) = match (config.sink, &config.file_path) {
        (LogSink::Stdout, _) => tracing_appender::non_blocking(io::stdout()),
        (LogSink::Stderr, None) => tracing_appender::non_blocking(io::stderr()),
        (LogSink::Stderr, Some(path)) => {
            let path = std::path::Path::new(path);
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("sedlib.log"));
            let appender = tracing_appender::rolling::never(directory, file_name);
            tracing_appender::non_blocking(appender)
        },
    };

    let json_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .event_format(JsonFormatter { config: config.clone() });

    let subscriber = tracing_subscriber::registry().with(filter).with(CaptureSpanFieldsLayer).with(json_layer);

    // A second `init_logger` call within the same process (e.g. across test
    // modules) is expected and ignored, matching the corpus's logger setup.
    let _ = subscriber.try_init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logger_does_not_panic_on_default_config() {
        let config = LogConfig::default();
        let _guard = init_logger(&config);
    }
}
