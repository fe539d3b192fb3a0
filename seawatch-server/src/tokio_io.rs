//! Tokio implementation of IoProvider for the native server.
//!
//! This module provides `TokioIoProvider` which implements `seawatch_core::IoProvider`
//! using tokio's async sockets in a poll-based interface.
//!
//! Connecting is the only operation that has to wait, so it runs in a spawned
//! task and hands the stream back over a oneshot channel. Reads use
//! `try_read`, which never blocks.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use seawatch_core::io::{ConnectStatus, IoError, IoProvider, TcpRead, TcpSocketHandle};
use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;

/// Upper bound for one connect attempt
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Internal state for a TCP socket
#[derive(Default)]
struct TcpSocketState {
    stream: Option<TcpStream>,
    pending: Option<oneshot::Receiver<std::io::Result<TcpStream>>>,
    task: Option<JoinHandle<()>>,
    failed: Option<IoError>,
}

/// Tokio implementation of IoProvider for the native server.
///
/// Wraps tokio sockets in a poll-based interface that matches the
/// IoProvider trait used by seawatch-core's IngestionClient. Must be used
/// from within a tokio runtime.
///
/// # Usage
///
/// ```rust,ignore
/// use seawatch_core::{IngestionClient, WatchConfig};
/// use seawatch_server::tokio_io::TokioIoProvider;
///
/// let mut io = TokioIoProvider::new();
/// let mut client = IngestionClient::new(WatchConfig::default().connection);
/// client.connect(&mut io, "192.168.1.20", 5000);
///
/// // In your main loop:
/// let events = client.poll(&mut io);
/// ```
pub struct TokioIoProvider {
    /// Next socket handle ID
    next_handle: i32,
    /// TCP sockets by handle
    tcp_sockets: HashMap<i32, TcpSocketState>,
    /// Start time for current_time_ms calculation
    start_time: Instant,
    connect_timeout: Duration,
}

impl TokioIoProvider {
    /// Create a new Tokio I/O provider.
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            tcp_sockets: HashMap::new(),
            start_time: Instant::now(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Number of sockets that have not been closed.
    pub fn open_sockets(&self) -> usize {
        self.tcp_sockets.len()
    }

    fn alloc_handle(&mut self) -> i32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl Default for TokioIoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TokioIoProvider {
    fn drop(&mut self) {
        for state in self.tcp_sockets.values() {
            if let Some(task) = &state.task {
                task.abort();
            }
        }
    }
}

/// Map a std I/O error onto the core's error codes.
fn to_io_error(e: &std::io::Error) -> IoError {
    match e.kind() {
        ErrorKind::ConnectionRefused => IoError::connection_refused(),
        ErrorKind::TimedOut => IoError::timed_out(),
        ErrorKind::NotConnected => IoError::not_connected(),
        _ => IoError::new(-e.raw_os_error().unwrap_or(1), e.to_string()),
    }
}

impl IoProvider for TokioIoProvider {
    // -------------------------------------------------------------------------
    // TCP Operations
    // -------------------------------------------------------------------------

    fn tcp_create(&mut self) -> Result<TcpSocketHandle, IoError> {
        let handle = self.alloc_handle();
        self.tcp_sockets.insert(handle, TcpSocketState::default());
        Ok(TcpSocketHandle(handle))
    }

    fn tcp_connect(
        &mut self,
        socket: &TcpSocketHandle,
        host: &str,
        port: u16,
    ) -> Result<(), IoError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| IoError::new(-1, format!("No tokio runtime: {}", e)))?;
        let state = self
            .tcp_sockets
            .get_mut(&socket.0)
            .ok_or_else(IoError::invalid_handle)?;

        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.stream = None;
        state.failed = None;

        let (tx, rx) = oneshot::channel();
        let host = host.to_string();
        let timeout = self.connect_timeout;
        state.pending = Some(rx);
        state.task = Some(runtime.spawn(async move {
            let result =
                match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await
                {
                    Ok(r) => r,
                    Err(_) => Err(std::io::Error::new(
                        ErrorKind::TimedOut,
                        format!("connect to {}:{} timed out", host, port),
                    )),
                };
            // Receiver is gone when the socket was closed meanwhile
            let _ = tx.send(result);
        }));
        Ok(())
    }

    fn tcp_connect_status(&mut self, socket: &TcpSocketHandle) -> ConnectStatus {
        let Some(state) = self.tcp_sockets.get_mut(&socket.0) else {
            return ConnectStatus::Failed(IoError::invalid_handle());
        };
        if state.stream.is_some() {
            return ConnectStatus::Connected;
        }
        if let Some(e) = &state.failed {
            return ConnectStatus::Failed(e.clone());
        }
        let Some(rx) = state.pending.as_mut() else {
            return ConnectStatus::Failed(IoError::not_connected());
        };

        match rx.try_recv() {
            Ok(Ok(stream)) => {
                if let Err(e) = SockRef::from(&stream).set_keepalive(true) {
                    log::debug!("Cannot enable TCP keepalive: {}", e);
                }
                if let Err(e) = stream.set_nodelay(true) {
                    log::debug!("Cannot set TCP_NODELAY: {}", e);
                }
                state.stream = Some(stream);
                state.pending = None;
                state.task = None;
                ConnectStatus::Connected
            }
            Ok(Err(e)) => {
                let err = to_io_error(&e);
                state.failed = Some(err.clone());
                state.pending = None;
                state.task = None;
                ConnectStatus::Failed(err)
            }
            Err(TryRecvError::Empty) => ConnectStatus::Pending,
            Err(TryRecvError::Closed) => {
                let err = IoError::new(-1, "Connect task ended without a result");
                state.failed = Some(err.clone());
                state.pending = None;
                ConnectStatus::Failed(err)
            }
        }
    }

    fn tcp_recv_raw(&mut self, socket: &TcpSocketHandle, buf: &mut [u8]) -> TcpRead {
        let Some(state) = self.tcp_sockets.get(&socket.0) else {
            return TcpRead::Failed(IoError::invalid_handle());
        };
        let Some(stream) = state.stream.as_ref() else {
            return TcpRead::Failed(IoError::not_connected());
        };

        match stream.try_read(buf) {
            Ok(0) => TcpRead::Closed,
            Ok(n) => TcpRead::Data(n),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => TcpRead::WouldBlock,
            Err(e) => TcpRead::Failed(to_io_error(&e)),
        }
    }

    fn tcp_close(&mut self, socket: TcpSocketHandle) {
        if let Some(state) = self.tcp_sockets.remove(&socket.0) {
            if let Some(task) = state.task {
                task.abort();
            }
        }
    }

    // -------------------------------------------------------------------------
    // Utility
    // -------------------------------------------------------------------------

    fn current_time_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    fn debug(&self, msg: &str) {
        log::debug!("{}", msg);
    }

    fn info(&self, msg: &str) {
        log::info!("{}", msg);
    }

    fn warn(&self, msg: &str) {
        log::warn!("{}", msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn wait_for_connect(io: &mut TokioIoProvider, socket: &TcpSocketHandle) -> ConnectStatus {
        for _ in 0..200 {
            match io.tcp_connect_status(socket) {
                ConnectStatus::Pending => tokio::time::sleep(Duration::from_millis(10)).await,
                status => return status,
            }
        }
        ConnectStatus::Pending
    }

    async fn read_some(io: &mut TokioIoProvider, socket: &TcpSocketHandle, buf: &mut [u8]) -> TcpRead {
        for _ in 0..200 {
            match io.tcp_recv_raw(socket, buf) {
                TcpRead::WouldBlock => tokio::time::sleep(Duration::from_millis(10)).await,
                read => return read,
            }
        }
        TcpRead::WouldBlock
    }

    #[test]
    fn test_current_time_ms() {
        let io = TokioIoProvider::new();
        let time1 = io.current_time_ms();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let time2 = io.current_time_ms();
        assert!(time2 >= time1 + 10);
    }

    #[test]
    fn test_handle_allocation() {
        let mut io = TokioIoProvider::new();
        let h1 = io.alloc_handle();
        let h2 = io.alloc_handle();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_connect_outside_runtime_fails() {
        let mut io = TokioIoProvider::new();
        let socket = io.tcp_create().unwrap();
        assert!(io.tcp_connect(&socket, "127.0.0.1", 5000).is_err());
    }

    #[tokio::test]
    async fn test_connect_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut io = TokioIoProvider::new();
        let socket = io.tcp_create().unwrap();
        io.tcp_connect(&socket, "127.0.0.1", port).unwrap();

        let (mut server, _) = listener.accept().await.unwrap();
        assert_eq!(wait_for_connect(&mut io, &socket).await, ConnectStatus::Connected);

        server.write_all(br#"{"NAV_DEPTH":4.2}"#).await.unwrap();
        let mut buf = [0u8; 64];
        let read = read_some(&mut io, &socket, &mut buf).await;
        assert_eq!(read, TcpRead::Data(17));
        assert_eq!(&buf[..17], br#"{"NAV_DEPTH":4.2}"#);

        drop(server);
        assert_eq!(read_some(&mut io, &socket, &mut buf).await, TcpRead::Closed);

        io.tcp_close(socket);
        assert_eq!(io.open_sockets(), 0);
        assert!(matches!(
            io.tcp_recv_raw(&socket, &mut buf),
            TcpRead::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Grab a free port, then release it
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut io = TokioIoProvider::new();
        let socket = io.tcp_create().unwrap();
        io.tcp_connect(&socket, "127.0.0.1", port).unwrap();
        assert!(matches!(
            wait_for_connect(&mut io, &socket).await,
            ConnectStatus::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_read_before_connect() {
        let mut io = TokioIoProvider::new();
        let socket = io.tcp_create().unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(
            io.tcp_recv_raw(&socket, &mut buf),
            TcpRead::Failed(IoError::not_connected())
        );
        assert_eq!(
            io.tcp_connect_status(&TcpSocketHandle(99)),
            ConnectStatus::Failed(IoError::invalid_handle())
        );
    }
}
