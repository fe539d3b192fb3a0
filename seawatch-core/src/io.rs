//! I/O abstraction for platform-independent ingestion code.
//!
//! This module defines the trait that abstracts the telemetry socket, allowing
//! the same ingestion state machine to run on top of tokio in the server and on
//! top of a scripted fake in unit tests.
//!
//! # Design
//!
//! The trait uses a **poll-based** interface (not async):
//! - the core has no async runtime
//! - native code can easily adapt async to poll with `try_read`/`try_recv`
//!
//! Connecting never blocks: [`IoProvider::tcp_connect`] only starts the
//! attempt and [`IoProvider::tcp_connect_status`] is polled until it resolves.
//!
//! # Example
//!
//! ```rust,ignore
//! use seawatch_core::io::{ConnectStatus, IoProvider, TcpRead};
//!
//! fn pump<I: IoProvider>(io: &mut I) {
//!     let socket = io.tcp_create().unwrap();
//!     io.tcp_connect(&socket, "192.168.1.20", 5000).unwrap();
//!
//!     // Later, from the poll loop
//!     if let ConnectStatus::Connected = io.tcp_connect_status(&socket) {
//!         let mut buf = [0u8; 4096];
//!         if let TcpRead::Data(len) = io.tcp_recv_raw(&socket, &mut buf) {
//!             // feed &buf[..len] to the framer
//!         }
//!     }
//! }
//! ```

use core::fmt;

// =============================================================================
// Error Types
// =============================================================================

/// I/O error type for cross-platform socket operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoError {
    /// Error code (negative values indicate errors, specific meaning varies by platform)
    pub code: i32,
    /// Human-readable error message
    pub message: String,
}

impl IoError {
    /// Create a new I/O error with a code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create an error from just a code (message will be generic).
    pub fn from_code(code: i32) -> Self {
        Self {
            code,
            message: format!("I/O error: {}", code),
        }
    }

    /// Create a "not connected" error.
    pub fn not_connected() -> Self {
        Self::new(-1, "Not connected")
    }

    /// Create an "invalid handle" error.
    pub fn invalid_handle() -> Self {
        Self::new(-9, "Invalid socket handle")
    }

    /// Create a "connection refused" error.
    pub fn connection_refused() -> Self {
        Self::new(-111, "Connection refused")
    }

    /// Create a "timed out" error.
    pub fn timed_out() -> Self {
        Self::new(-110, "Connection timed out")
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for IoError {}

// =============================================================================
// Socket Handle Types
// =============================================================================

/// Opaque handle to a TCP socket.
///
/// The actual socket implementation is platform-specific.
/// This is just an identifier used by the IoProvider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcpSocketHandle(pub i32);

/// Progress of a non-blocking connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectStatus {
    /// Attempt still in flight
    Pending,
    /// Transport is up
    Connected,
    /// Attempt failed (refused, unreachable, resolver error, ...)
    Failed(IoError),
}

/// Outcome of a non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpRead {
    /// `n` bytes were written to the buffer
    Data(usize),
    /// Nothing available right now
    WouldBlock,
    /// Peer closed the connection
    Closed,
    /// Read failed (reset, broken pipe, ...)
    Failed(IoError),
}

// =============================================================================
// IoProvider Trait
// =============================================================================

/// Platform-independent I/O provider.
///
/// Implementations exist for:
/// - **Native**: tokio sockets wrapped in a non-blocking interface (server crate)
/// - **Tests**: scripted in-memory sockets with a manual clock
///
/// All operations are non-blocking and poll-based.
pub trait IoProvider {
    // -------------------------------------------------------------------------
    // TCP Operations
    // -------------------------------------------------------------------------

    /// Create a new TCP socket.
    fn tcp_create(&mut self) -> Result<TcpSocketHandle, IoError>;

    /// Start a TCP connection (non-blocking).
    ///
    /// `host` may be a name or a literal address. Use
    /// [`tcp_connect_status`](IoProvider::tcp_connect_status) to learn the result.
    fn tcp_connect(&mut self, socket: &TcpSocketHandle, host: &str, port: u16)
        -> Result<(), IoError>;

    /// Check how a connection attempt is going.
    fn tcp_connect_status(&mut self, socket: &TcpSocketHandle) -> ConnectStatus;

    /// Receive raw data from a TCP socket (non-blocking).
    fn tcp_recv_raw(&mut self, socket: &TcpSocketHandle, buf: &mut [u8]) -> TcpRead;

    /// Close a TCP socket, aborting any connect still in flight.
    fn tcp_close(&mut self, socket: TcpSocketHandle);

    // -------------------------------------------------------------------------
    // Utility
    // -------------------------------------------------------------------------

    /// Get current timestamp in milliseconds since some epoch.
    ///
    /// Used for timeouts and backoff. The epoch doesn't matter as long
    /// as it's consistent within the process.
    fn current_time_ms(&self) -> u64;

    /// Log a debug message.
    fn debug(&self, msg: &str);

    /// Log an info message.
    fn info(&self, msg: &str);

    /// Log a warning. Defaults to [`info`](IoProvider::info).
    fn warn(&self, msg: &str) {
        self.info(msg);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted IoProvider used by the ingestion tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    #[derive(Debug, Default)]
    pub struct MockSocket {
        pub host: String,
        pub port: u16,
        pub status: Option<ConnectStatus>,
        pub reads: VecDeque<TcpRead>,
        pub incoming: VecDeque<Vec<u8>>,
        pub closed: bool,
    }

    /// In-memory provider with a manual clock.
    #[derive(Default)]
    pub struct MockIo {
        pub now_ms: u64,
        next_handle: i32,
        pub sockets: HashMap<i32, MockSocket>,
        pub fail_connect: bool,
        pub log: RefCell<Vec<String>>,
    }

    impl MockIo {
        pub fn new() -> Self {
            Self::default()
        }

        /// Handle of the most recently created socket.
        pub fn last_handle(&self) -> TcpSocketHandle {
            TcpSocketHandle(self.next_handle)
        }

        pub fn set_status(&mut self, status: ConnectStatus) {
            let h = self.next_handle;
            if let Some(s) = self.sockets.get_mut(&h) {
                s.status = Some(status);
            }
        }

        pub fn push_bytes(&mut self, data: &[u8]) {
            let h = self.next_handle;
            if let Some(s) = self.sockets.get_mut(&h) {
                s.incoming.push_back(data.to_vec());
            }
        }

        pub fn push_read(&mut self, read: TcpRead) {
            let h = self.next_handle;
            if let Some(s) = self.sockets.get_mut(&h) {
                s.reads.push_back(read);
            }
        }

        pub fn open_sockets(&self) -> usize {
            self.sockets.values().filter(|s| !s.closed).count()
        }

        pub fn created(&self) -> usize {
            self.sockets.len()
        }
    }

    impl IoProvider for MockIo {
        fn tcp_create(&mut self) -> Result<TcpSocketHandle, IoError> {
            self.next_handle += 1;
            self.sockets.insert(self.next_handle, MockSocket::default());
            Ok(TcpSocketHandle(self.next_handle))
        }

        fn tcp_connect(
            &mut self,
            socket: &TcpSocketHandle,
            host: &str,
            port: u16,
        ) -> Result<(), IoError> {
            if self.fail_connect {
                return Err(IoError::connection_refused());
            }
            let s = self
                .sockets
                .get_mut(&socket.0)
                .ok_or_else(IoError::invalid_handle)?;
            s.host = host.to_string();
            s.port = port;
            s.status = Some(ConnectStatus::Pending);
            Ok(())
        }

        fn tcp_connect_status(&mut self, socket: &TcpSocketHandle) -> ConnectStatus {
            match self.sockets.get(&socket.0) {
                Some(s) if !s.closed => s
                    .status
                    .clone()
                    .unwrap_or_else(|| ConnectStatus::Failed(IoError::not_connected())),
                _ => ConnectStatus::Failed(IoError::invalid_handle()),
            }
        }

        fn tcp_recv_raw(&mut self, socket: &TcpSocketHandle, buf: &mut [u8]) -> TcpRead {
            let Some(s) = self.sockets.get_mut(&socket.0) else {
                return TcpRead::Failed(IoError::invalid_handle());
            };
            if let Some(read) = s.reads.pop_front() {
                return read;
            }
            match s.incoming.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        s.incoming.push_front(chunk[n..].to_vec());
                    }
                    TcpRead::Data(n)
                }
                None => TcpRead::WouldBlock,
            }
        }

        fn tcp_close(&mut self, socket: TcpSocketHandle) {
            if let Some(s) = self.sockets.get_mut(&socket.0) {
                s.closed = true;
            }
        }

        fn current_time_ms(&self) -> u64 {
            self.now_ms
        }

        fn debug(&self, msg: &str) {
            self.log.borrow_mut().push(msg.to_string());
        }

        fn info(&self, msg: &str) {
            self.log.borrow_mut().push(msg.to_string());
        }
    }
}
