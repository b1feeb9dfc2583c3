//! provides logging helpers

use std::collections::BTreeMap;
use std::fmt::{self};
use std::path::Path;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use anyhow::Result;
use tracing::field::Field;
use tracing::field::Visit;
use tracing::Event;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::FilterExt;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::fmt::FormatFields;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::registry::LookupSpan;

const METRICS_TARGET_PREFIX: &str = "metrics.";

/// Writes `metrics.*` events as InfluxDB line protocol
struct InfluxDBFormatter;

#[derive(Default)]
struct FieldVisitor {
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    fn insert(&mut self, name: &str, value: String) {
        match name.strip_prefix("tag_") {
            Some(tag) => {
                self.tags.insert(tag.to_string(), escape_tag(&value));
            }
            None => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name().starts_with("tag_") {
            self.insert(field.name(), value.to_string());
        } else {
            self.insert(field.name(), format!("\"{}\"", escape_field_str(value)));
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field.name(), format!("{value}u"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field.name(), format!("{value}i"));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field.name(), format!("{:?}", value));
    }
}

/// Quoted string field values need backslashes and double quotes escaped.
fn escape_field_str(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Tag values cannot contain unescaped commas, spaces or equals signs.
fn escape_tag(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

impl<S, N> FormatEvent<S, N> for InfluxDBFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let target = event.metadata().target();
        let measurement = target.strip_prefix(METRICS_TARGET_PREFIX).unwrap_or(target);
        write!(writer, "{}", measurement)?;

        for (key, value) in visitor.tags.iter() {
            write!(writer, ",{}={}", key, value)?;
        }

        write!(writer, " ")?;
        let mut first = true;
        for (key, value) in visitor.fields.iter() {
            if !first {
                write!(writer, ",")?;
            }
            write!(writer, "{}={}", key, value)?;
            first = false;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        writeln!(writer, " {}", timestamp)
    }
}

fn is_metrics_target(target: &str) -> bool {
    target.starts_with(METRICS_TARGET_PREFIX)
}

/// initiate the global tracing subscriber
///
/// Diagnostics go to stderr. Snapshot metrics are only recorded when a
/// metrics file is given; the returned guard flushes it on drop.
pub(crate) fn init(metrics_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let fmt_layer = utils::logging::get_fmt_layer().with_filter(
        env_filter.and(filter::filter_fn(|metadata| {
            !is_metrics_target(metadata.target())
        })),
    );

    let (metrics_layer, guard) = match metrics_file {
        Some(metrics_file) => {
            let (writer, guard) = metrics_writer(metrics_file)?;
            let metrics_layer = layer()
                .event_format(InfluxDBFormatter)
                .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter::filter_fn(|metadata| {
                    is_metrics_target(metadata.target())
                }));
            (Some(metrics_layer), Some(guard))
        }
        None => (None, None),
    };

    registry()
        .with(fmt_layer)
        .with(metrics_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}

fn metrics_writer(
    metrics_file: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = match metrics_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = metrics_file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid metrics file name: {}", metrics_file.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(3)
        .build(dir)
        .context("failed to create rolling file appender")?;

    Ok(tracing_appender::non_blocking(appender))
}
