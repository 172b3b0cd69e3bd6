//! Tracing setup for the CLI.
//!
//! Protocol traffic is logged by `viewserver_ipc` at `debug`. `-v` turns that
//! on for the workspace crates only, so dependencies stay quiet. `RUST_LOG`
//! overrides both.

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const LOG_FILE_ENV: &str = "VIEWSERVER_LOG";
const WORKSPACE_TARGETS: [&str; 3] = ["viewserver", "viewserver_ipc", "viewserver_core"];

/// Keeps the non-blocking file writer flushing until dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    _guard: Option<WorkerGuard>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    /// An unset or empty `VIEWSERVER_LOG` means stderr.
    fn from_env_value(value: Option<OsString>) -> Self {
        match value {
            Some(path) if !path.is_empty() => LogTarget::File(PathBuf::from(path)),
            _ => LogTarget::Stderr,
        }
    }
}

/// `warn` everywhere; `debug` for the workspace crates when verbose.
fn default_directives(verbose: bool) -> String {
    if !verbose {
        return "warn".to_string();
    }
    let mut directives = vec!["warn".to_string()];
    directives.extend(WORKSPACE_TARGETS.iter().map(|t| format!("{}=debug", t)));
    directives.join(",")
}

pub fn init_tracing(verbose: bool) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let target = LogTarget::from_env_value(std::env::var_os(LOG_FILE_ENV));
    let (writer, guard, ansi) = match &target {
        LogTarget::File(path) => {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    let (non_blocking, guard) = tracing_appender::non_blocking(file);
                    (BoxMakeWriter::new(non_blocking), Some(guard), false)
                }
                Err(err) => {
                    eprintln!(
                        "Warning: failed to open log file {}: {}",
                        path.display(),
                        err
                    );
                    stderr_writer()
                }
            }
        }
        LogTarget::Stderr => stderr_writer(),
    };

    // Thread names identify the per-device `autolist-<serial>` listeners.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(verbose)
        .with_thread_names(true)
        .with_ansi(ansi)
        .with_writer(writer);

    if subscriber.try_init().is_err() {
        return TelemetryGuard { _guard: None };
    }
    TelemetryGuard { _guard: guard }
}

fn stderr_writer() -> (BoxMakeWriter, Option<WorkerGuard>, bool) {
    (
        BoxMakeWriter::new(std::io::stderr),
        None,
        std::io::stderr().is_terminal(),
    )
}
