//! Daemon lifecycle: bind, serve until a shutdown signal, tear down.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use brayns_config::{Config, SocketEndpoint, SocketPreparationError};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use thiserror::Error;
use tracing::info;

use crate::dispatch::TaskDispatcher;
use crate::monitor::NetworkMonitor;
use crate::service::NetworkService;
use crate::telemetry::{self, TelemetryError};
use crate::transport::{ListenerError, ListenerHandle, MonitorConnectionHandler, SocketListener};

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Errors that stop the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Telemetry could not be configured.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The socket directory could not be prepared.
    #[error(transparent)]
    Socket(#[from] SocketPreparationError),
    /// The listener failed to bind, start or stop.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Source of the "stop serving" decision, checked once per loop iteration.
pub trait ShutdownSignal: Send + Sync {
    /// Whether the daemon should stop.
    fn is_requested(&self) -> bool;
}

impl ShutdownSignal for AtomicBool {
    fn is_requested(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// Shutdown signal raised by SIGTERM, SIGINT, SIGQUIT or SIGHUP.
#[derive(Debug, Clone)]
pub struct SystemShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl SystemShutdownSignal {
    /// Registers the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Signals`] when registration fails.
    pub fn install() -> Result<Self, DaemonError> {
        let flag = Arc::new(AtomicBool::new(false));
        for signal in [SIGTERM, SIGINT, SIGQUIT, SIGHUP] {
            signal_hook::flag::register(signal, Arc::clone(&flag))
                .map_err(|source| DaemonError::Signals { source })?;
        }
        Ok(Self { flag })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A bound daemon: listener accepting, service ready to run.
#[derive(Debug)]
pub struct Daemon {
    endpoint: SocketEndpoint,
    local_addr: Option<SocketAddr>,
    listener: ListenerHandle,
    service: NetworkService,
    idle_timeout: Duration,
}

impl Daemon {
    /// Prepares the socket, binds it and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError`] when the socket cannot be prepared or bound.
    pub fn bind(config: &Config, dispatcher: TaskDispatcher) -> Result<Self, DaemonError> {
        let endpoint = config.daemon_socket().clone();
        endpoint.prepare_filesystem()?;

        let monitor = Arc::new(NetworkMonitor::new());
        let listener = SocketListener::bind(&endpoint)?;
        let local_addr = listener.local_addr();
        let handler =
            MonitorConnectionHandler::new(Arc::clone(&monitor), config.max_frame_bytes());
        let listener = listener.start(Arc::new(handler))?;

        info!(
            target: DAEMON_TARGET,
            endpoint = %endpoint,
            methods = dispatcher.registry().len(),
            "daemon listening"
        );
        Ok(Self {
            endpoint,
            local_addr,
            listener,
            service: NetworkService::new(monitor, dispatcher),
            idle_timeout: config.idle_timeout(),
        })
    }

    /// Endpoint being served.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Bound TCP address; `None` for Unix sockets.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Serves requests until `shutdown` is requested, then stops the
    /// listener and discards outstanding work.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Listener`] when the accept thread panicked.
    pub fn run_until(mut self, shutdown: &dyn ShutdownSignal) -> Result<(), DaemonError> {
        while !shutdown.is_requested() {
            self.service.wait_timeout(self.idle_timeout);
        }
        info!(target: DAEMON_TARGET, endpoint = %self.endpoint, "shutdown requested");
        self.listener.shutdown();
        self.service.shutdown();
        self.listener.join()?;
        Ok(())
    }
}

/// Runs the daemon for `config` with the given dispatcher until a
/// termination signal arrives.
///
/// # Errors
///
/// Returns [`DaemonError`] for telemetry, signal, socket or listener
/// failures.
pub fn run_daemon(config: &Config, dispatcher: TaskDispatcher) -> Result<(), DaemonError> {
    telemetry::initialise(config)?;
    let shutdown = SystemShutdownSignal::install()?;
    Daemon::bind(config, dispatcher)?.run_until(&shutdown)
}
