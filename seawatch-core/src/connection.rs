//! Connection state machine for the telemetry link.
//!
//! This module provides platform-independent connection state management. It
//! owns every timer of the link (initial-data timeout, no-data watchdog,
//! reconnect countdown) but performs no I/O itself: the ingestion client asks
//! it what to do and reports back what happened.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ConnectionManager (this module)                            │
//! │  - Pure state transitions, no I/O                           │
//! │  - Epoch-stamped timers                                     │
//! │  - Exponential backoff with jitter                          │
//! └─────────────────────────────────────────────────────────────┘
//!                    │ ConnectionAction
//!                    ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  IngestionClient (ingest.rs)                                │
//! │  - Owns the socket and StreamBuffer                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Timers
//!
//! Every timer is a `(epoch, deadline)` pair. Tearing a session down bumps the
//! epoch, so a timer armed for an earlier session can never act on the
//! current one even if it was not cleared.
//!
//! # Usage
//!
//! ```rust,ignore
//! use seawatch_core::connection::{ConnectionAction, ConnectionManager};
//!
//! let mut conn = ConnectionManager::new(&config.connection);
//!
//! conn.start_connecting(now);
//! // ... I/O layer reports the transport is up ...
//! conn.connected(now);
//! // ... I/O layer receives data ...
//! conn.data_received(now);
//!
//! for action in conn.poll_timers(now) {
//!     match action {
//!         ConnectionAction::Reconnect => { /* open a new session */ }
//!         ConnectionAction::DataTimeout { .. } => { /* tear down */ }
//!         ConnectionAction::Countdown { .. } => { /* show status text */ }
//!     }
//! }
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{ConnectionConfig, GracePolicy};

/// Period of the reconnect countdown tick.
pub const COUNTDOWN_TICK_MS: u64 = 1000;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of the telemetry link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected, no reconnect scheduled
    Disconnected,
    /// TCP connect in progress
    Connecting,
    /// Transport is up but no payload has arrived yet
    Connected,
    /// Payload is flowing
    Active,
    /// Waiting for the reconnect countdown to expire
    Reconnecting,
    /// Shutting down, no more connection attempts
    ShuttingDown,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl ConnectionState {
    /// Check if connection attempt is in progress
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// Check if the transport is up
    pub fn is_established(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Active)
    }

    /// Check if a socket belongs to this state
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Active
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Active => write!(f, "Active"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::ShuttingDown => write!(f, "Shutting Down"),
        }
    }
}

// =============================================================================
// Timers and backoff
// =============================================================================

/// A deadline that only counts for the session it was armed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub epoch: u64,
    pub deadline_ms: u64,
}

impl Timer {
    fn new(epoch: u64, deadline_ms: u64) -> Self {
        Timer { epoch, deadline_ms }
    }

    /// True when the timer belongs to `epoch` and its deadline has passed.
    pub fn is_due(&self, epoch: u64, now_ms: u64) -> bool {
        self.epoch == epoch && now_ms >= self.deadline_ms
    }
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter_ms: u64,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        ReconnectPolicy {
            base_ms: config.base_reconnect_delay_ms,
            max_ms: config.max_reconnect_delay_ms,
            jitter_ms: config.jitter_ms,
        }
    }

    /// Deterministic part of the delay: `min(base * 2^attempt, max)`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.max_ms)
    }

    /// Backoff plus a uniform random extra in `[0, jitter]`.
    pub fn delay_ms<R: Rng>(&self, attempt: u32, rng: &mut R) -> u64 {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=self.jitter_ms)
        };
        self.backoff_ms(attempt).saturating_add(jitter)
    }
}

/// Something the owner of the socket has to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Countdown expired; open a new session
    Reconnect,
    /// Silence timer fired; tear the session down and call
    /// [`ConnectionManager::connection_lost`]
    DataTimeout { watchdog: bool },
    /// Countdown status; `held` while the configuration dialog keeps it at
    /// the last second
    Countdown { seconds_left: u64, held: bool },
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Manages connection state, timers and retry logic.
///
/// This is a pure state machine with no I/O - the actual connection
/// operations are performed by [`IngestionClient`](crate::ingest::IngestionClient).
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    /// Current connection state
    state: ConnectionState,
    /// Session generation, bumped on every teardown
    epoch: u64,
    /// Consecutive reconnects without a successful data cycle
    reconnect_attempt: u32,
    /// Timestamp of last state change
    last_state_change_ms: u64,
    /// Timestamp of last payload
    last_data_ms: u64,
    /// Whether we've received any data on this session
    has_received_data: bool,
    /// Whether any session ever reached the transport-up state
    had_transport: bool,
    /// Initial-data timer or no-data watchdog, whichever is armed
    data_timer: Option<Timer>,
    /// True while `data_timer` is the watchdog
    watchdog_armed: bool,
    reconnect_timer: Option<Timer>,
    tick_timer: Option<Timer>,
    dialog_open: bool,
    countdown_held: bool,
    policy: ReconnectPolicy,
    initial_data_timeout_ms: u64,
    watchdog_ms: u64,
    grace: GracePolicy,
    rng: StdRng,
}

impl ConnectionManager {
    /// Create a new connection manager in disconnected state.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Same as [`new`](Self::new) with a fixed jitter seed.
    pub fn with_seed(config: &ConnectionConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &ConnectionConfig, rng: StdRng) -> Self {
        ConnectionManager {
            state: ConnectionState::Disconnected,
            epoch: 0,
            reconnect_attempt: 0,
            last_state_change_ms: 0,
            last_data_ms: 0,
            has_received_data: false,
            had_transport: false,
            data_timer: None,
            watchdog_armed: false,
            reconnect_timer: None,
            tick_timer: None,
            dialog_open: false,
            countdown_held: false,
            policy: ReconnectPolicy::from_config(config),
            initial_data_timeout_ms: config.initial_data_timeout_ms,
            watchdog_ms: config.no_data_watchdog_ms,
            grace: config.post_reconnect_grace,
            rng,
        }
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current session generation.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Get number of reconnects since the last successful data cycle.
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// Check if we've received data on this session.
    pub fn has_received_data(&self) -> bool {
        self.has_received_data
    }

    pub fn is_dialog_open(&self) -> bool {
        self.dialog_open
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Reconnect deadline, if a countdown is running.
    pub fn reconnect_deadline_ms(&self) -> Option<u64> {
        self.reconnect_timer.map(|t| t.deadline_ms)
    }

    /// Calculate time since last state change.
    pub fn time_in_state_ms(&self, current_time_ms: u64) -> u64 {
        current_time_ms.saturating_sub(self.last_state_change_ms)
    }

    /// Calculate time since last data received.
    pub fn time_since_data_ms(&self, current_time_ms: u64) -> u64 {
        if self.last_data_ms == 0 {
            u64::MAX // Never received data
        } else {
            current_time_ms.saturating_sub(self.last_data_ms)
        }
    }

    // -------------------------------------------------------------------------
    // State Transitions
    // -------------------------------------------------------------------------

    /// Begin a fresh session.
    ///
    /// Invalidates everything armed for the previous session and returns the
    /// new epoch, or `None` once shut down.
    pub fn start_connecting(&mut self, current_time_ms: u64) -> Option<u64> {
        if self.state == ConnectionState::ShuttingDown {
            return None;
        }
        self.invalidate();
        self.has_received_data = false;
        self.set_state(ConnectionState::Connecting, current_time_ms);
        Some(self.epoch)
    }

    /// Transport connect succeeded; arm the initial-data timer.
    pub fn connected(&mut self, current_time_ms: u64) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        let timeout = match self.grace {
            GracePolicy::Watchdog if self.had_transport => self.watchdog_ms,
            _ => self.initial_data_timeout_ms,
        };
        self.had_transport = true;
        self.data_timer = Some(Timer::new(self.epoch, current_time_ms + timeout));
        self.watchdog_armed = false;
        self.set_state(ConnectionState::Connected, current_time_ms);
    }

    /// Record that payload was received.
    ///
    /// Returns true for the first payload of the session, which is when the
    /// link counts as established and the attempt counter is cleared.
    pub fn data_received(&mut self, current_time_ms: u64) -> bool {
        if !self.state.is_established() {
            return false;
        }
        self.last_data_ms = current_time_ms;
        self.data_timer = Some(Timer::new(self.epoch, current_time_ms + self.watchdog_ms));
        self.watchdog_armed = true;

        if self.state == ConnectionState::Connected {
            self.set_state(ConnectionState::Active, current_time_ms);
            self.has_received_data = true;
            self.reconnect_attempt = 0;
            return true;
        }
        false
    }

    /// The session is gone (refused, closed, reset or timed out).
    ///
    /// Schedules the next attempt and returns its delay in milliseconds.
    pub fn connection_lost(&mut self, current_time_ms: u64) -> Option<u64> {
        if matches!(
            self.state,
            ConnectionState::ShuttingDown | ConnectionState::Reconnecting
        ) {
            return None;
        }
        self.invalidate();
        let delay = self.policy.delay_ms(self.reconnect_attempt, &mut self.rng);
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.reconnect_timer = Some(Timer::new(self.epoch, current_time_ms + delay));
        self.tick_timer = Some(Timer::new(self.epoch, current_time_ms + COUNTDOWN_TICK_MS));
        self.set_state(ConnectionState::Reconnecting, current_time_ms);
        Some(delay)
    }

    /// Operator requested disconnect. No reconnect is scheduled.
    pub fn disconnect(&mut self, current_time_ms: u64) {
        if self.state == ConnectionState::ShuttingDown {
            return;
        }
        self.invalidate();
        self.reconnect_attempt = 0;
        self.set_state(ConnectionState::Disconnected, current_time_ms);
    }

    /// Transition to shutting down state.
    ///
    /// Call this when shutdown is requested. No further connection attempts.
    pub fn shutdown(&mut self, current_time_ms: u64) {
        self.invalidate();
        self.set_state(ConnectionState::ShuttingDown, current_time_ms);
    }

    /// Hold or release the reconnect countdown.
    ///
    /// While open, an expiring countdown stays at its last second. Closing the
    /// dialog lets that last second run.
    pub fn set_dialog_open(&mut self, open: bool, current_time_ms: u64) {
        self.dialog_open = open;
        if !open && self.countdown_held {
            self.countdown_held = false;
            if self.state == ConnectionState::Reconnecting {
                let deadline = current_time_ms + COUNTDOWN_TICK_MS;
                self.reconnect_timer = Some(Timer::new(self.epoch, deadline));
                self.tick_timer = Some(Timer::new(self.epoch, deadline));
            }
        }
    }

    /// Fire whatever timers are due.
    pub fn poll_timers(&mut self, current_time_ms: u64) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        let epoch = self.epoch;

        if let Some(timer) = self.data_timer {
            if timer.is_due(epoch, current_time_ms) && self.state.is_established() {
                self.data_timer = None;
                actions.push(ConnectionAction::DataTimeout {
                    watchdog: self.watchdog_armed,
                });
            }
        }

        if self.state != ConnectionState::Reconnecting {
            return actions;
        }

        if let Some(timer) = self.reconnect_timer {
            if timer.is_due(epoch, current_time_ms) {
                if self.dialog_open {
                    if !self.countdown_held {
                        self.countdown_held = true;
                        self.tick_timer = None;
                        actions.push(ConnectionAction::Countdown {
                            seconds_left: 1,
                            held: true,
                        });
                    }
                } else {
                    self.reconnect_timer = None;
                    self.tick_timer = None;
                    actions.push(ConnectionAction::Reconnect);
                }
                return actions;
            }
        }

        if let Some(timer) = self.tick_timer {
            if timer.is_due(epoch, current_time_ms) {
                self.tick_timer = Some(Timer::new(epoch, current_time_ms + COUNTDOWN_TICK_MS));
                actions.push(ConnectionAction::Countdown {
                    seconds_left: self.seconds_left(current_time_ms),
                    held: false,
                });
            }
        }
        actions
    }

    /// Whole seconds until the reconnect, rounded up.
    pub fn seconds_left(&self, current_time_ms: u64) -> u64 {
        match self.reconnect_timer {
            _ if self.countdown_held => 1,
            Some(timer) => {
                let remaining = timer.deadline_ms.saturating_sub(current_time_ms);
                remaining.div_ceil(1000).max(1)
            }
            None => 0,
        }
    }

    fn invalidate(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.data_timer = None;
        self.watchdog_armed = false;
        self.reconnect_timer = None;
        self.tick_timer = None;
        self.countdown_held = false;
    }

    fn set_state(&mut self, new_state: ConnectionState, current_time_ms: u64) {
        if self.state != new_state {
            self.state = new_state;
            self.last_state_change_ms = current_time_ms;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
