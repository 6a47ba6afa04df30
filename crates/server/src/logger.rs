//! Logger initialization for the server

use jiff::{Zoned, tz::TimeZone};
use logforth::{
    append::{FastraceEvent, Stderr},
    filter::EnvFilter,
    layout::Layout,
};
use std::{fmt::Write, io::IsTerminal, str::FromStr, sync::Once};

static INIT: Once = Once::new();

/// Custom layout that formats timestamps in UTC
#[derive(Debug)]
struct UtcLayout {
    no_color: bool,
}

impl UtcLayout {
    fn new() -> Self {
        Self { no_color: false }
    }

    fn no_color(mut self) -> Self {
        self.no_color = true;
        self
    }
}

impl Layout for UtcLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();

        // Get current time in UTC
        let now = Zoned::now().with_time_zone(TimeZone::UTC);

        // Format timestamp with Z suffix to indicate UTC
        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        // Add log level with colors
        let level_str = if self.no_color {
            format!("{:>5}", record.level())
        } else {
            match record.level() {
                log::Level::Error => format!("\x1b[31m{:>5}\x1b[0m", record.level()),
                log::Level::Warn => format!("\x1b[33m{:>5}\x1b[0m", record.level()),
                log::Level::Info => format!("\x1b[32m{:>5}\x1b[0m", record.level()),
                log::Level::Debug => format!("\x1b[34m{:>5}\x1b[0m", record.level()),
                log::Level::Trace => format!("\x1b[35m{:>5}\x1b[0m", record.level()),
            }
        };

        write!(output, "{}  ", level_str)?;

        // Add the message
        write!(output, "{}", record.args())?;

        Ok(output.into_bytes())
    }
}

/// Initialize the logger.
/// The log_filter should be a string like "info" or "server=debug,moderation=debug"
pub fn init(log_filter: &str) {
    let log_filter = log_filter.to_owned();
    INIT.call_once(move || apply_logger(log_filter));
}

fn apply_logger(log_filter: String) {
    let mut builder = logforth::builder();

    let filter_for_fastrace = log_filter.clone();
    builder = builder.dispatch(move |d| {
        let filter = EnvFilter::from_str(&filter_for_fastrace)
            .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter should be valid"));

        d.filter(filter).append(FastraceEvent::default())
    });

    let filter_for_stderr = log_filter.clone();
    builder = builder.dispatch(move |d| {
        let filter = EnvFilter::from_str(&filter_for_stderr)
            .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter should be valid"));

        let layout = if std::io::stderr().is_terminal() {
            UtcLayout::new()
        } else {
            UtcLayout::new().no_color()
        };

        d.filter(filter).append(Stderr::default().with_layout(layout))
    });

    builder.apply();
}
