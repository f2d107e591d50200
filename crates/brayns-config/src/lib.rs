//! Shared configuration for the Brayns network daemon.
//!
//! Settings resolve from command-line flags first, then `BRAYNS_*`
//! environment variables, then the built-in defaults. The
//! daemon consumes the resolved [`Config`] to bind its socket, size frame
//! buffers and configure structured logging.

use std::ffi::OsString;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

mod defaults;
mod logging;
mod socket;

pub use defaults::{
    DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES, DEFAULT_TCP_PORT,
    default_log_filter, default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "braynsd", version, about = "Brayns JSON-RPC dispatch daemon")]
pub struct Config {
    /// Socket the daemon listens on (`unix:///path` or `tcp://host:port`).
    #[arg(
        long,
        env = "BRAYNS_DAEMON_SOCKET",
        default_value_t = default_socket_endpoint()
    )]
    pub daemon_socket: SocketEndpoint,

    /// Tracing filter expression (for example `info,braynsd::dispatch=debug`).
    #[arg(long, env = "BRAYNS_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Log output format.
    #[arg(long, env = "BRAYNS_LOG_FORMAT", default_value_t = default_log_format())]
    pub log_format: LogFormat,

    /// Largest frame, in bytes, accepted from a client.
    #[arg(long, env = "BRAYNS_MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: u32,

    /// How long the idle loop blocks waiting for traffic, in milliseconds.
    #[arg(long, env = "BRAYNS_IDLE_TIMEOUT_MS", default_value_t = DEFAULT_IDLE_TIMEOUT_MS)]
    pub idle_timeout_ms: u64,
}

impl Config {
    /// Loads the configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an argument fails to parse or a resolved
    /// value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads the configuration from an explicit argument list.
    ///
    /// The first item is treated as the binary name, mirroring
    /// [`std::env::args_os`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an argument fails to parse or a resolved
    /// value is out of range.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints clap cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero frame limit or an
    /// empty log filter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::invalid("max_frame_bytes", "must be positive"));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::invalid("log_filter", "must not be empty"));
        }
        Ok(())
    }

    /// Socket endpoint the daemon binds.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Largest accepted frame size in bytes.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        usize::try_from(self.max_frame_bytes).unwrap_or(usize::MAX)
    }

    /// Idle wait budget for the dispatch loop.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

/// Errors raised while resolving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line or environment input failed to parse.
    #[error(transparent)]
    Arguments(#[from] clap::Error),
    /// A value parsed but violates a constraint.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending setting.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidValue { field, reason }
    }
}
