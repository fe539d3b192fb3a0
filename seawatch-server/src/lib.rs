//! # SeaWatch Server
//!
//! Native service around [`seawatch_core`]: reads the telemetry stream,
//! tracks AIS targets, computes collision risk and raises alerts.
//!
//! ## Architecture
//!
//! The server is built on top of [`seawatch_core`] for the platform-independent
//! logic, with [`tokio`] providing the async runtime.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    seawatch-server                      │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────┐ │
//! │  │ Ingest      │  │ Alarms      │  │ Output           │ │
//! │  │ (poll loop) │  │ (sweep)     │  │ (JSON lines)     │ │
//! │  └──────┬──────┘  └──────┬──────┘  └────────▲─────────┘ │
//! │         │                │                  │           │
//! │         ▼                ▼                  │           │
//! │  ┌─────────────────────────────────────┐    │           │
//! │  │        Session (Arc<RwLock>)        │    │           │
//! │  │  - WatchEngine (targets, alerts)    │────┘           │
//! │  │  - EventHub (broadcast)             │                │
//! │  └─────────────────────────────────────┘                │
//! │         │                                               │
//! │         ▼                                               │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │              TokioIoProvider                        ││
//! │  │  - Implements seawatch_core::IoProvider             ││
//! │  └─────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`Session`] - Main application state container and control surface
//! - [`ingest::IngestService`] - Drives the core `IngestionClient`
//! - [`alarms::AlarmService`] - Periodic alarm sweep
//! - [`hub::EventHub`] - Event fan-out
//! - [`tokio_io::TokioIoProvider`] - Tokio-based I/O for seawatch-core
//!
//! ## Example: Starting the Server
//!
//! ```rust,no_run
//! use clap::Parser;
//! use seawatch_server::{config, Cli, Session};
//! use tokio_graceful_shutdown::Toplevel;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let args = Cli::parse_from(["seawatch-server", "--host", "192.168.1.20"]);
//!     let watch_config = config::load_config(&args).unwrap();
//!
//!     Toplevel::new(|s| async move {
//!         let _session = Session::new(&s, args, watch_config);
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-c, --config` - Configuration file
//! - `-H, --host` / `-p, --port` - Telemetry source
//! - `-v` - Increase verbosity (use multiple times)
//! - `--output` - Write every event to stdout as a JSON line

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use clap::Parser;
use seawatch_core::collision::{CpaResult, VesselState};
use seawatch_core::{
    AlertId, AlertRecord, AlertRequest, WatchConfig, WatchEngine, WatchEvent,
};
use seawatch_core::alerts::AlertCounts;
use tokio::sync::mpsc;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};

pub mod alarms;
pub mod config;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod output;
pub mod tokio_io;

pub use error::WatchError;
use hub::EventHub;
use ingest::{IngestCommand, IngestService};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Queued control commands for the ingestion loop
const COMMAND_QUEUE: usize = 16;

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Telemetry source host
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Telemetry source TCP port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Minimum safe depth in meters
    #[arg(long)]
    pub min_depth: Option<f64>,

    /// CPA alarm threshold in nautical miles
    #[arg(long)]
    pub cpa_threshold: Option<f64>,

    /// TCPA alarm threshold in minutes
    #[arg(long)]
    pub tcpa_threshold: Option<f64>,

    /// Start with the alert system disabled
    #[arg(long, default_value_t = false)]
    pub no_alarms: bool,

    /// Do not connect at startup
    #[arg(long, default_value_t = false)]
    pub no_connect: bool,

    /// Write every event to stdout as a JSON line
    #[arg(long, default_value_t = false)]
    pub output: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long, default_value_t = false)]
    pub print_config: bool,
}

pub struct SessionInner {
    pub args: Cli,
    pub engine: WatchEngine,
}

/// Shared state of a running server.
///
/// Cloning is cheap; all clones refer to the same engine, hub and
/// ingestion loop.
#[derive(Clone)]
pub struct Session {
    pub inner: Arc<RwLock<SessionInner>>,
    hub: EventHub,
    tx_command: mpsc::Sender<IngestCommand>,
}

impl Session {
    pub fn read(&self) -> RwLockReadGuard<'_, SessionInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, SessionInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn new_fake() -> (Self, mpsc::Receiver<IngestCommand>) {
        // This does not actually start anything - only use for testing
        Self::new_base(Cli::parse_from(["seawatch"]), WatchConfig::default())
    }

    fn new_base(args: Cli, config: WatchConfig) -> (Self, mpsc::Receiver<IngestCommand>) {
        let (tx_command, rx_command) = mpsc::channel(COMMAND_QUEUE);
        let session = Session {
            inner: Arc::new(RwLock::new(SessionInner {
                args,
                engine: WatchEngine::new(config),
            })),
            hub: EventHub::default(),
            tx_command,
        };
        (session, rx_command)
    }

    /// Create the session and start its subsystems.
    pub fn new(subsystem: &SubsystemHandle, args: Cli, config: WatchConfig) -> Self {
        let output = args.output;
        let (session, rx_command) = Self::new_base(args, config);

        if output {
            let printer = output::EventPrinter::new(session.hub.subscribe());
            subsystem.start(SubsystemBuilder::new("Output", |subsys| printer.run(subsys)));
        }

        let ingest = IngestService::new(session.clone(), rx_command);
        subsystem.start(SubsystemBuilder::new("Ingest", |subsys| ingest.run(subsys)));

        let alarms = alarms::AlarmService::new(session.clone());
        subsystem.start(SubsystemBuilder::new("Alarms", |subsys| alarms.run(subsys)));

        session
    }

    pub fn args(&self) -> Cli {
        self.read().args.clone()
    }

    pub fn config(&self) -> WatchConfig {
        self.read().engine.config().clone()
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Wall-clock time used for every engine call.
    pub fn now_ms() -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    fn publish(&self, events: Vec<WatchEvent>) {
        for event in events {
            self.hub.publish(event);
        }
    }

    /// Run `f` on the engine, then publish whatever alert events it queued.
    fn with_engine<T>(&self, f: impl FnOnce(&mut WatchEngine) -> T) -> T {
        let (result, events) = {
            let mut inner = self.write();
            let result = f(&mut inner.engine);
            (result, inner.engine.take_alert_events())
        };
        self.publish(events);
        result
    }

    // -------------------------------------------------------------------------
    // Engine feed
    // -------------------------------------------------------------------------

    pub(crate) fn apply_ingest(&self, event: seawatch_core::IngestEvent) {
        let events = self.write().engine.apply(event, Self::now_ms());
        self.publish(events);
    }

    pub(crate) fn sweep(&self) {
        let events = self.write().engine.sweep(Self::now_ms());
        self.publish(events);
    }

    // -------------------------------------------------------------------------
    // Control surface
    // -------------------------------------------------------------------------

    pub async fn connect(&self, host: &str, port: u16) -> Result<(), WatchError> {
        self.send(IngestCommand::Connect {
            host: host.to_string(),
            port,
        })
        .await
    }

    pub async fn disconnect(&self) -> Result<(), WatchError> {
        self.send(IngestCommand::Disconnect).await
    }

    /// Hold the reconnect countdown while a settings dialog is open.
    pub async fn set_dialog_open(&self, open: bool) -> Result<(), WatchError> {
        self.send(IngestCommand::SetDialogOpen(open)).await
    }

    async fn send(&self, command: IngestCommand) -> Result<(), WatchError> {
        self.tx_command
            .send(command)
            .await
            .map_err(|_| WatchError::ChannelClosed)
    }

    pub fn trigger_alert(&self, request: AlertRequest) -> Option<AlertId> {
        self.with_engine(|engine| engine.trigger_alert(request, Self::now_ms()))
    }

    pub fn acknowledge_alert(&self, id: AlertId) -> bool {
        self.with_engine(|engine| engine.acknowledge_alert(id, Self::now_ms()))
    }

    pub fn resolve_alert(&self, id: AlertId) -> bool {
        self.with_engine(|engine| engine.resolve_alert(id, Self::now_ms()))
    }

    pub fn silence_alert(&self, id: AlertId) -> bool {
        self.with_engine(|engine| engine.silence_alert(id, Self::now_ms()))
    }

    pub fn clear_all_alerts(&self) -> usize {
        self.with_engine(|engine| engine.clear_all_alerts(Self::now_ms()))
    }

    pub fn set_alerts_enabled(&self, enabled: bool) {
        self.with_engine(|engine| engine.alerts_mut().set_enabled(enabled))
    }

    pub fn active_alerts(&self) -> Vec<AlertRecord> {
        self.read().engine.active_alerts()
    }

    pub fn alert_counts(&self) -> AlertCounts {
        self.read().engine.alert_counts()
    }

    pub fn is_connected(&self) -> bool {
        self.read().engine.is_connected()
    }

    pub fn evaluate(own: &VesselState, target: &VesselState) -> CpaResult {
        WatchEngine::evaluate(own, target)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session {{ }}")
    }
}
