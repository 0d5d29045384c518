//! Log sinks: stdout for the service manager plus a daily rolling file.
//!
//! Files are named `upload.YYYY-MM-DD.log` in the configured directory and
//! the oldest are deleted once more than `MaxFiles` exist. `RUST_LOG`
//! overrides the configured level.

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crosscheck_core::config::LoggingSettings;

use crate::error::AgentError;

const FILE_PREFIX: &str = "upload";
const FILE_SUFFIX: &str = "log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the lifetime of the process.
///
/// # Errors
///
/// Returns [`AgentError`] if the log directory or file cannot be created,
/// or a subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> Result<WorkerGuard, AgentError> {
    std::fs::create_dir_all(&settings.directory)?;

    let builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix(FILE_SUFFIX);
    let builder = if settings.max_files > 0 {
        builder.max_log_files(settings.max_files)
    } else {
        builder
    };
    let appender = builder.build(&settings.directory)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter(&settings.level))
        .with(sink_layer(std::io::stdout, settings.json, true))
        .with(sink_layer(file_writer, settings.json, false))
        .try_init()?;

    Ok(guard)
}

/// Stdout-only subscriber for failures that happen before settings load.
pub fn init_fallback() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_target(true)
        .try_init();
}

/// One output sink. Every sink records the event target; only a terminal
/// gets ANSI colors.
fn sink_layer<S, W>(writer: W, json: bool, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn emit_through(&self, json: bool) -> String {
            let writer = self.clone();
            let subscriber = tracing_subscriber::registry()
                .with(sink_layer(move || writer.clone(), json, false));
            tracing::subscriber::with_default(subscriber, || {
                tracing::info!(target: "crosscheck_agent::cycle", row_id = 7, "Row delivered");
            });
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn json_file_sink_records_target() {
        let out = Capture::default().emit_through(true);
        assert!(out.contains("\"target\":\"crosscheck_agent::cycle\""), "{out}");
        assert!(out.contains("\"row_id\":7"), "{out}");
        assert!(!out.contains('\u{1b}'));
    }

    #[test]
    fn text_file_sink_records_target_without_colors() {
        let out = Capture::default().emit_through(false);
        assert!(out.contains("crosscheck_agent::cycle:"), "{out}");
        assert!(out.contains("row_id=7"), "{out}");
        assert!(!out.contains('\u{1b}'));
    }
}
