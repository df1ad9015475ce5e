//! Process-wide `tracing` setup.
//!
//! | Variable | Effect |
//! |---|---|
//! | `DRAFTFLOW_OBSERVABILITY_ENABLED` | `0`/`false`/`no`/`off` skips installation |
//! | `DRAFTFLOW_LOG_LEVEL` | filter directive (`debug`, `draftflow=trace`, ...) |
//! | `RUST_LOG` | fallback filter when the above is unset or invalid |
//! | `DRAFTFLOW_JSON_LOG_PATH` | write JSONL to this file instead of stderr |

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const DEFAULT_FILTER: &str = "warn,draftflow=info";
const DEFAULT_LOG_FILE: &str = "draftflow.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, PartialEq, Eq)]
enum LogSink {
    /// Compact lines on stderr, away from generated content on stdout.
    Console,
    JsonFile { dir: PathBuf, file_name: String },
}

impl LogSink {
    /// A bare file name lands in the working directory. A path without a
    /// file name component gets the default file inside it.
    fn json_file(path: &Path) -> Self {
        match path.file_name() {
            Some(file_name) => LogSink::JsonFile {
                dir: path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or(Path::new("."))
                    .to_path_buf(),
                file_name: file_name.to_string_lossy().into_owned(),
            },
            None => LogSink::JsonFile {
                dir: path.to_path_buf(),
                file_name: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct LogSettings {
    directive: Option<String>,
    sink: LogSink,
}

impl LogSettings {
    /// `None` when logging is switched off.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let enabled = lookup("DRAFTFLOW_OBSERVABILITY_ENABLED")
            .and_then(|value| parse_switch(&value))
            .unwrap_or(true);
        if !enabled {
            return None;
        }
        Some(Self {
            directive: lookup("DRAFTFLOW_LOG_LEVEL").filter(|d| !d.trim().is_empty()),
            sink: lookup("DRAFTFLOW_JSON_LOG_PATH")
                .map_or(LogSink::Console, |path| LogSink::json_file(Path::new(&path))),
        })
    }

    fn filter(&self) -> EnvFilter {
        self.directive
            .as_deref()
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Installs the global subscriber once per process. Later calls, and calls
/// after another subscriber was installed, do nothing.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if let Some(settings) = LogSettings::from_lookup(|key| std::env::var(key).ok()) {
            install(&settings);
        }
    });
}

fn install(settings: &LogSettings) {
    let (console, json) = match &settings.sink {
        LogSink::Console => (
            Some(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogSink::JsonFile { dir, file_name } => {
            let _ = std::fs::create_dir_all(dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            (
                None,
                Some(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(false)
                        .with_writer(writer),
                ),
            )
        }
    };
    let _ = tracing_subscriber::registry()
        .with(settings.filter())
        .with(console)
        .with(json)
        .try_init();
}
