// stepviz - Step-by-step Program State Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Logging setup for stepviz components.
//!
//! Everything logs through `tracing`. A process installs one subscriber:
//! [`init_logging`] for long-running components (pretty console output,
//! optionally mirrored to a daily-rotated file), or [`init_simple_logging`]
//! for tools and tests. Verbosity follows `RUST_LOG`.

use std::{env, fs, path::PathBuf, sync::Once};

use eyre::{Result, WrapErr};
use tracing::Level;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::env::STEPVIZ_LOG_DIR;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where the logs of a component go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Console only
    #[default]
    Console,
    /// Console, plus a daily-rotated file under the log directory
    ConsoleAndFile,
}

impl From<bool> for LogOutput {
    fn from(enable_file_logging: bool) -> Self {
        if enable_file_logging {
            Self::ConsoleAndFile
        } else {
            Self::Console
        }
    }
}

/// Initialize logging for a stepviz component
///
/// Fails if the process already installed a subscriber.
///
/// # Examples
/// ```rust,no_run
/// use stepviz_common::logging;
///
/// fn main() -> eyre::Result<()> {
///     logging::init_logging("stepviz-tracer", true)?;
///     tracing::info!("Tracer started");
///     Ok(())
/// }
/// ```
pub fn init_logging(component_name: &str, output: impl Into<LogOutput>) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = vec![fmt::layer()
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .pretty()
        .with_filter(filter(Level::INFO)?)
        .boxed()];

    let log_dir = match output.into() {
        LogOutput::Console => None,
        LogOutput::ConsoleAndFile => {
            let log_dir = create_log_directory(component_name)?;
            let appender = rolling::daily(&log_dir, format!("{component_name}.log"));
            let (writer, guard) = non_blocking(appender);
            // the background writer must live as long as the process
            std::mem::forget(guard);

            layers.push(
                fmt::layer()
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(LocalTime::rfc_3339())
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(filter(Level::INFO)?)
                    .boxed(),
            );
            Some(log_dir)
        }
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("failed to install the tracing subscriber")?;

    match log_dir {
        Some(dir) => tracing::info!(
            component = component_name,
            log_dir = %dir.display(),
            "Logging to console and file"
        ),
        None => tracing::info!(component = component_name, "Logging to console"),
    }
    tracing::debug!(
        rust_log = %env::var("RUST_LOG").unwrap_or_default(),
        pid = std::process::id(),
        "Logging initialized"
    );
    Ok(())
}

/// `RUST_LOG`, or `fallback` for everything when it is unset or invalid
fn filter(fallback: Level) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback.as_str()))
        .wrap_err("invalid log filter")
}

/// `<root>/<component>`, where the root is [`STEPVIZ_LOG_DIR`] or
/// `<temp>/stepviz-logs`
fn create_log_directory(component_name: &str) -> Result<PathBuf> {
    let root = env::var_os(STEPVIZ_LOG_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("stepviz-logs"));
    let log_dir = root.join(component_name);
    fs::create_dir_all(&log_dir)
        .wrap_err_with(|| format!("cannot create log directory {}", log_dir.display()))?;
    Ok(log_dir)
}

/// Compact console-only logging at `level` unless `RUST_LOG` says otherwise
pub fn init_simple_logging(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level)?)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| eyre::eyre!("failed to install the tracing subscriber: {e}"))
}

static TEST_LOGGING_INIT: Once = Once::new();

/// Install test logging once per process; later calls are no-ops
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        let _ = init_simple_logging(default_level.unwrap_or(Level::INFO));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing::{debug, info, warn};

    #[test]
    fn test_output_from_flag() {
        assert_eq!(LogOutput::from(true), LogOutput::ConsoleAndFile);
        assert_eq!(LogOutput::from(false), LogOutput::Console);
        assert_eq!(LogOutput::default(), LogOutput::Console);
    }

    #[test]
    #[serial]
    fn test_log_directory_honors_override() {
        let root = tempfile::tempdir().unwrap();
        env::set_var(STEPVIZ_LOG_DIR, root.path());

        let log_dir = create_log_directory("stepviz-engine").unwrap();
        env::remove_var(STEPVIZ_LOG_DIR);

        assert!(log_dir.is_dir());
        assert_eq!(log_dir, root.path().join("stepviz-engine"));
    }

    #[test]
    #[serial]
    fn test_log_directory_defaults_to_temp() {
        env::remove_var(STEPVIZ_LOG_DIR);

        let log_dir = create_log_directory("stepviz-test").unwrap();
        assert!(log_dir.starts_with(env::temp_dir().join("stepviz-logs")));
    }

    #[test]
    fn test_second_subscriber_is_rejected() {
        ensure_test_logging(None);

        assert!(init_logging("stepviz-test", LogOutput::Console).is_err());
        assert!(init_simple_logging(Level::DEBUG).is_err());

        info!("still logging");
        warn!("still logging");
        debug!("still logging");
    }
}
