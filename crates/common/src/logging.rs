//! Provides utilities to initialize logging for the dispute agents.
use std::env;

use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Environment variable name for the service label, which is appended to the
/// whoami string.
pub const SVC_LABEL_ENVVAR: &str = "DISPUTE_SVC_LABEL";

/// Environment variable that toggles printing the source file of each event.
pub const LOG_FILE_ENVVAR: &str = "LOG_FILE";

/// Environment variable that toggles printing the source line of each event.
pub const LOG_LINE_NUM_ENVVAR: &str = "LOG_LINE_NUM";

/// Configuration for the logger.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// The whoami string, which is used to identify the agent in logs.
    whoami: String,

    /// Whether ANSI colors are emitted on stdout.
    ansi: bool,
}

impl LoggerConfig {
    /// Creates a new instance with whoami set and colored output.
    pub const fn new(whoami: String) -> Self {
        Self { whoami, ansi: true }
    }

    /// Creates a new instance with the whoami string derived from the provided base name.
    pub fn with_base_name(s: &str) -> Self {
        Self::new(get_whoami_string(s))
    }

    /// Disables ANSI colors, useful when stdout is redirected to a file.
    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }

    /// The whoami string this config will announce.
    pub fn whoami(&self) -> &str {
        &self.whoami
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::with_base_name("dispute-agent")
    }
}

/// Initializes the logging subsystem with the provided config.
///
/// Filtering is controlled through `RUST_LOG`. Calling this more than once is harmless: only the
/// first subscriber is installed.
pub fn init(config: LoggerConfig) {
    let filt = tracing_subscriber::EnvFilter::from_default_env();

    let log_file = env_flag(LOG_FILE_ENVVAR);
    let log_line_num = env_flag(LOG_LINE_NUM_ENVVAR);

    let stdout_sub = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(config.ansi)
        .event_format(
            tracing_subscriber::fmt::format()
                .with_file(log_file)
                .with_line_number(log_line_num),
        )
        .with_filter(filt);

    if tracing_subscriber::registry()
        .with(stdout_sub)
        .try_init()
        .is_err()
    {
        debug!("global subscriber already installed");
        return;
    }

    info!(whoami = %config.whoami, "logging started");
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|v| v == "1")
}

/// Gets the service label from the standard envvar, which should be included
/// in the whoami string.
pub fn get_service_label_from_env() -> Option<String> {
    env::var(SVC_LABEL_ENVVAR).ok()
}

/// Computes a standard whoami string.
pub fn get_whoami_string(base: &str) -> String {
    match get_service_label_from_env() {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}
