//! # SeaWatch Core
//!
//! Platform-independent situational-awareness logic for a small vessel:
//! telemetry ingestion, collision risk and operator alerts.
//!
//! This crate contains pure state machines and calculations with **zero I/O
//! dependencies**. Nothing in here spawns tasks, opens sockets or reads the
//! clock; the caller supplies an [`IoProvider`] and the current time.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  seawatch-core (platform-independent, no tokio/async deps)    │
//! │  ├── connection/  (state machine, backoff, epoch timers)      │
//! │  ├── framing/     (brace-depth JSON framer)                   │
//! │  ├── telemetry/   (own ship fields, AIS roster)               │
//! │  ├── ingest/      (IngestionClient over IoProvider)           │
//! │  ├── collision/   (CPA / TCPA, risk levels)                   │
//! │  ├── alerts/      (alert lifecycle, condition sweep)          │
//! │  └── engine/      (WatchEngine wiring it together)            │
//! └───────────────────────────────────────────────────────────────┘
//!                              ▲
//!                 ┌────────────┴────────────┐
//!                 │  seawatch-server        │
//!                 │  (TokioIoProvider)      │
//!                 └─────────────────────────┘
//! ```
//!
//! Data flows one way: ingestion → vessel state → CPA → alerts.
//!
//! ## Key Modules
//!
//! - [`ingest`] - Telemetry client driven by [`IoProvider`]
//! - [`connection`] - Connection state machine with backoff logic
//! - [`framing`] - Splits a byte stream into JSON objects
//! - [`telemetry`] - Field extraction and the AIS target roster
//! - [`collision`] - Closest point of approach
//! - [`alerts`] - Alert lifecycle manager
//! - [`engine`] - [`WatchEngine`] context object
//!
//! ## Example: Closest Point of Approach
//!
//! ```rust
//! use seawatch_core::collision::{evaluate, CpaStatus, VesselState};
//!
//! // Head-on at the equator, 6 NM apart, 10 kn each
//! let own = VesselState::new(0.0, 0.0, 90.0, 10.0);
//! let target = VesselState::new(0.0, 0.1, 270.0, 10.0);
//! let result = evaluate(&own, &target);
//! assert_eq!(result.status, CpaStatus::Valid);
//! assert!(result.cpa < 0.01);
//! ```
//!
//! ## Example: Using Connection State Machine
//!
//! ```rust
//! use seawatch_core::{ConnectionManager, ConnectionState, WatchConfig};
//!
//! let config = WatchConfig::default();
//! let mut conn = ConnectionManager::new(&config.connection);
//! assert_eq!(conn.state(), ConnectionState::Disconnected);
//!
//! conn.start_connecting(0);
//! assert!(conn.state().is_connecting());
//!
//! conn.connected(100);
//! assert!(conn.data_received(150));
//! assert_eq!(conn.state(), ConnectionState::Active);
//! ```

pub mod alerts;
pub mod collision;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod framing;
pub mod ingest;
pub mod io;
pub mod telemetry;

// Re-export commonly used types
pub use alerts::{
    AlertEvent, AlertId, AlertManager, AlertPriority, AlertRecord, AlertRequest, AlertState,
    AlertType,
};
pub use collision::{CpaResult, CpaStatus, RiskLevel, VesselState};
pub use config::{AlarmConfig, ConnectionConfig, GracePolicy, WatchConfig};
pub use connection::{ConnectionAction, ConnectionManager, ConnectionState};
pub use engine::{WatchEngine, WatchEvent};
pub use error::{ConfigError, ParseError};
pub use framing::{Frame, StreamBuffer};
pub use ingest::{IngestEvent, IngestionClient};
pub use io::{ConnectStatus, IoError, IoProvider, TcpRead, TcpSocketHandle};
pub use telemetry::{OwnShipUpdate, TargetReport, TelemetryDecoder};
