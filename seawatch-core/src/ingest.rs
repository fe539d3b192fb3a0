//! Telemetry ingestion client using IoProvider
//!
//! Ties the connection state machine, the framer and the telemetry decoder to
//! one TCP stream. The client is poll-based like the rest of the core: the
//! shell calls [`IngestionClient::poll`] on a short interval and handles the
//! returned [`IngestEvent`]s.
//!
//! ```rust,ignore
//! use seawatch_core::ingest::{IngestEvent, IngestionClient};
//! use seawatch_core::IoProvider;
//!
//! fn main_loop<I: IoProvider>(io: &mut I, client: &mut IngestionClient) {
//!     client.connect(io, "192.168.1.20", 5000);
//!     loop {
//!         for event in client.poll(io) {
//!             match event {
//!                 IngestEvent::OwnShipUpdated(update) => { /* ... */ }
//!                 IngestEvent::ReconnectStatus(text) => { /* show to operator */ }
//!                 _ => {}
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! # Sessions
//!
//! Every connect attempt gets a fresh [`StreamSession`] holding the socket and
//! the stream buffer, stamped with the connection epoch. Teardown closes the
//! socket and drops the session; nothing carries over to the next one.

use serde::Serialize;

use crate::config::ConnectionConfig;
use crate::connection::{ConnectionAction, ConnectionManager, ConnectionState};
use crate::framing::{Frame, FramingStats, StreamBuffer};
use crate::io::{ConnectStatus, IoProvider, TcpRead, TcpSocketHandle};
use crate::telemetry::{OwnShipUpdate, TargetReport, TelemetryDecoder};

/// Size of one socket read
const RECV_BUFFER_SIZE: usize = 8192;
/// Reads per poll before yielding back to the shell
const MAX_READS_PER_POLL: usize = 32;

/// Events emitted by [`IngestionClient::poll`] and the control calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum IngestEvent {
    /// Link came up (first payload) or went down
    ConnectivityChanged(bool),
    OwnShipUpdated(OwnShipUpdate),
    TargetUpdated(TargetReport),
    /// Target id dropped from the roster
    TargetLost(String),
    /// Operator status line
    ReconnectStatus(String),
}

/// Ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    pub sessions: u64,
    pub bytes_received: u64,
    pub messages_decoded: u64,
    pub messages_rejected: u64,
    pub fields_skipped: u64,
    pub framing: FramingStats,
}

/// One connection attempt and its buffered bytes.
#[derive(Debug)]
pub struct StreamSession {
    pub epoch: u64,
    pub socket: TcpSocketHandle,
    pub host: String,
    pub port: u16,
    pub buffer: StreamBuffer,
}

/// Telemetry stream client.
#[derive(Debug)]
pub struct IngestionClient {
    config: ConnectionConfig,
    conn: ConnectionManager,
    session: Option<StreamSession>,
    /// Endpoint used for reconnects
    endpoint: Option<(String, u16)>,
    decoder: TelemetryDecoder,
    /// Last connectivity value reported
    link_up: bool,
    recv_buf: Vec<u8>,
    stats: IngestStats,
}

impl IngestionClient {
    pub fn new(config: ConnectionConfig) -> Self {
        let conn = ConnectionManager::new(&config);
        Self::with_manager(config, conn)
    }

    /// Same as [`new`](Self::new) with a fixed jitter seed.
    pub fn with_seed(config: ConnectionConfig, seed: u64) -> Self {
        let conn = ConnectionManager::with_seed(&config, seed);
        Self::with_manager(config, conn)
    }

    fn with_manager(config: ConnectionConfig, conn: ConnectionManager) -> Self {
        IngestionClient {
            config,
            conn,
            session: None,
            endpoint: None,
            decoder: TelemetryDecoder::new(),
            link_up: false,
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
            stats: IngestStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    pub fn endpoint(&self) -> Option<(&str, u16)> {
        self.endpoint.as_ref().map(|(h, p)| (h.as_str(), *p))
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    pub fn stats(&self) -> IngestStats {
        let mut stats = self.stats;
        if let Some(session) = &self.session {
            stats.framing = add_framing(stats.framing, session.buffer.stats());
        }
        stats
    }

    // -------------------------------------------------------------------------
    // Control
    // -------------------------------------------------------------------------

    /// Connect to `host:port`, replacing any current session.
    pub fn connect<I: IoProvider>(&mut self, io: &mut I, host: &str, port: u16) -> Vec<IngestEvent> {
        let mut events = Vec::new();
        if self.conn.state() == ConnectionState::ShuttingDown {
            return events;
        }
        self.teardown(io, &mut events);
        self.endpoint = Some((host.to_string(), port));
        self.open_session(io, &mut events);
        events
    }

    /// Operator disconnect. No reconnect is scheduled.
    pub fn disconnect<I: IoProvider>(&mut self, io: &mut I) -> Vec<IngestEvent> {
        let mut events = Vec::new();
        self.teardown(io, &mut events);
        self.conn.disconnect(io.current_time_ms());
        if let Some((host, port)) = &self.endpoint {
            io.info(&format!("Disconnected from {}:{}", host, port));
        }
        events.push(IngestEvent::ReconnectStatus("Disconnected".to_string()));
        events
    }

    /// Stop for good.
    pub fn shutdown<I: IoProvider>(&mut self, io: &mut I) -> Vec<IngestEvent> {
        let mut events = Vec::new();
        self.teardown(io, &mut events);
        self.conn.shutdown(io.current_time_ms());
        events
    }

    /// Hold the reconnect countdown while a configuration dialog is open.
    pub fn set_dialog_open<I: IoProvider>(&mut self, io: &mut I, open: bool) {
        self.conn.set_dialog_open(open, io.current_time_ms());
    }

    // -------------------------------------------------------------------------
    // Poll
    // -------------------------------------------------------------------------

    /// Advance the client: connect progress, reads, staleness and timers.
    pub fn poll<I: IoProvider>(&mut self, io: &mut I) -> Vec<IngestEvent> {
        let mut events = Vec::new();

        match self.conn.state() {
            ConnectionState::Connecting => self.poll_connecting(io, &mut events),
            ConnectionState::Connected | ConnectionState::Active => {
                self.poll_reading(io, &mut events)
            }
            _ => {}
        }

        let now = io.current_time_ms();
        if let Some(session) = self.session.as_mut() {
            if let Some(Frame::Discarded { reason, bytes }) = session.buffer.check_staleness(now) {
                io.warn(&format!("Discarded {} buffered bytes: {}", bytes, reason));
            }
        }

        for action in self.conn.poll_timers(now) {
            match action {
                ConnectionAction::Reconnect => self.open_session(io, &mut events),
                ConnectionAction::DataTimeout { watchdog } => {
                    let reason = if watchdog {
                        format!("No data for {} s", self.config.no_data_watchdog_ms / 1000)
                    } else {
                        "No data received after connect".to_string()
                    };
                    self.fail_session(io, &reason, &mut events);
                }
                ConnectionAction::Countdown { seconds_left, held } => {
                    events.push(IngestEvent::ReconnectStatus(
                        self.countdown_text(seconds_left, held),
                    ));
                }
            }
        }

        events
    }

    fn poll_connecting<I: IoProvider>(&mut self, io: &mut I, events: &mut Vec<IngestEvent>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.epoch != self.conn.epoch() {
            // Belongs to a session that was already replaced
            io.tcp_close(session.socket);
            self.session = None;
            return;
        }

        match io.tcp_connect_status(&session.socket) {
            ConnectStatus::Pending => {}
            ConnectStatus::Connected => {
                let text = format!(
                    "Connected to {}:{}, waiting for data",
                    session.host, session.port
                );
                io.info(&text);
                self.conn.connected(io.current_time_ms());
                events.push(IngestEvent::ReconnectStatus(text));
            }
            ConnectStatus::Failed(e) => {
                let reason = format!("Connect failed: {}", e);
                self.fail_session(io, &reason, events);
            }
        }
    }

    fn poll_reading<I: IoProvider>(&mut self, io: &mut I, events: &mut Vec<IngestEvent>) {
        for _ in 0..MAX_READS_PER_POLL {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            let socket = session.socket;

            match io.tcp_recv_raw(&socket, &mut self.recv_buf) {
                TcpRead::Data(0) | TcpRead::Closed => {
                    self.fail_session(io, "Connection closed by peer", events);
                    return;
                }
                TcpRead::Data(len) => {
                    let now = io.current_time_ms();
                    self.stats.bytes_received += len as u64;
                    if self.conn.data_received(now) {
                        self.link_up = true;
                        events.push(IngestEvent::ConnectivityChanged(true));
                        if let Some(session) = &self.session {
                            let text = format!("Receiving data from {}:{}", session.host, session.port);
                            io.info(&text);
                            events.push(IngestEvent::ReconnectStatus(text));
                        }
                    }

                    let frames = match self.session.as_mut() {
                        Some(session) => session.buffer.push(&self.recv_buf[..len], now),
                        None => return,
                    };
                    self.handle_frames(io, frames, now, events);
                }
                TcpRead::WouldBlock => return,
                TcpRead::Failed(e) => {
                    self.fail_session(io, &format!("Read failed: {}", e), events);
                    return;
                }
            }
        }
    }

    fn handle_frames<I: IoProvider>(
        &mut self,
        io: &mut I,
        frames: Vec<Frame>,
        now: u64,
        events: &mut Vec<IngestEvent>,
    ) {
        for frame in frames {
            match frame {
                Frame::Message(bytes) => match self.decoder.decode(&bytes, now) {
                    Ok(decoded) => {
                        self.stats.messages_decoded += 1;
                        self.stats.fields_skipped += decoded.skipped.len() as u64;
                        for e in &decoded.skipped {
                            io.debug(&format!("Skipped field: {}", e));
                        }
                        if let Some(own) = decoded.own_ship {
                            events.push(IngestEvent::OwnShipUpdated(own));
                        }
                        events.extend(decoded.targets.into_iter().map(IngestEvent::TargetUpdated));
                        events.extend(decoded.lost.into_iter().map(IngestEvent::TargetLost));
                    }
                    Err(e) => {
                        self.stats.messages_rejected += 1;
                        io.debug(&format!("Rejected message: {}", e));
                    }
                },
                Frame::Discarded { reason, bytes } => {
                    io.warn(&format!("Discarded {} buffered bytes: {}", bytes, reason));
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Session management
    // -------------------------------------------------------------------------

    fn open_session<I: IoProvider>(&mut self, io: &mut I, events: &mut Vec<IngestEvent>) {
        let Some((host, port)) = self.endpoint.clone() else {
            return;
        };
        let now = io.current_time_ms();
        let Some(epoch) = self.conn.start_connecting(now) else {
            return;
        };
        self.decoder.reset();

        let socket = match io.tcp_create() {
            Ok(socket) => socket,
            Err(e) => {
                self.fail_session(io, &format!("Cannot create socket: {}", e), events);
                return;
            }
        };
        self.stats.sessions += 1;
        self.session = Some(StreamSession {
            epoch,
            socket,
            host: host.clone(),
            port,
            buffer: StreamBuffer::new(self.config.stale_buffer_ms, self.config.max_buffer_bytes),
        });

        match io.tcp_connect(&socket, &host, port) {
            Ok(()) => {
                let text = format!("Connecting to {}:{}", host, port);
                io.debug(&text);
                events.push(IngestEvent::ReconnectStatus(text));
            }
            Err(e) => self.fail_session(io, &format!("Connect failed: {}", e), events),
        }
    }

    /// Close the socket and drop the session.
    fn teardown<I: IoProvider>(&mut self, io: &mut I, events: &mut Vec<IngestEvent>) {
        if let Some(session) = self.session.take() {
            io.tcp_close(session.socket);
            self.stats.framing = add_framing(self.stats.framing, session.buffer.stats());
        }
        if self.link_up {
            self.link_up = false;
            events.push(IngestEvent::ConnectivityChanged(false));
        }
    }

    /// Tear down after a failure and schedule the next attempt.
    fn fail_session<I: IoProvider>(&mut self, io: &mut I, reason: &str, events: &mut Vec<IngestEvent>) {
        self.teardown(io, events);
        let now = io.current_time_ms();
        let Some(delay) = self.conn.connection_lost(now) else {
            return;
        };
        let text = format!(
            "{}; reconnecting in {} s (attempt {})",
            reason,
            delay.div_ceil(1000).max(1),
            self.conn.reconnect_attempt()
        );
        io.info(&text);
        events.push(IngestEvent::ReconnectStatus(text));
    }

    fn countdown_text(&self, seconds_left: u64, held: bool) -> String {
        let target = match &self.endpoint {
            Some((host, port)) => format!("{}:{}", host, port),
            None => "source".to_string(),
        };
        if held {
            format!("Reconnecting to {} in {} s (paused)", target, seconds_left)
        } else {
            format!("Reconnecting to {} in {} s", target, seconds_left)
        }
    }
}

fn add_framing(a: FramingStats, b: FramingStats) -> FramingStats {
    FramingStats {
        messages: a.messages + b.messages,
        discards: a.discards + b.discards,
        bytes_discarded: a.bytes_discarded + b.bytes_discarded,
    }
}
