use std::fmt;
use std::sync::OnceLock;

use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "json2pdf";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the process-wide subscriber. The first call wins; later calls are no-ops.
///
/// `RUST_LOG` takes precedence; otherwise the crate logs at `info`, or `debug`
/// when `debug` is set.
pub fn init(debug: bool) {
    init_once(&TRACING_INIT, || {
        let level = if debug { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), level)));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .event_format(LogLineFormat)
            .try_init();
    });
}

/// Runs `install` at most once per `cell`, even when callers race.
fn init_once(cell: &OnceLock<()>, install: impl FnOnce()) {
    cell.get_or_init(install);
}

/// `[2024-05-01 12:00:00.000] [json2pdf] [unit] [info] unit succeeded unit=cv ...`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLineFormat;

impl<S, N> FormatEvent<S, N> for LogLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "[{}] [{}] [{}] [{}] ",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            APP_NAME,
            logger_name(meta.target()),
            level_name(meta.level()),
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Last path segment of the event target, e.g. `json2pdf::dispatch::unit` becomes `unit`.
fn logger_name(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warning",
        Level::ERROR => "error",
    }
}
