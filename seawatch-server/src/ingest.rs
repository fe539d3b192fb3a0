//! Ingestion subsystem: runs the core `IngestionClient` on a tokio interval.
//!
//! ```text
//! ┌──────────────────────────────┐   commands    ┌────────────────┐
//! │ IngestService (this module)  │◀──────────────│ Session        │
//! │  - poll every 100 ms         │               │ connect(),     │
//! │  - feeds Session engine      │──────────────▶│ disconnect()…  │
//! └──────────────┬───────────────┘   events      └────────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐
//! │ TokioIoProvider              │
//! └──────────────────────────────┘
//! ```

use std::time::Duration;

use seawatch_core::{IngestEvent, IngestionClient};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::tokio_io::TokioIoProvider;
use crate::{Session, WatchError};

/// How often the client is polled
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Control messages from the [`Session`] to the ingestion loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestCommand {
    Connect { host: String, port: u16 },
    Disconnect,
    SetDialogOpen(bool),
}

pub struct IngestService {
    session: Session,
    client: IngestionClient,
    io: TokioIoProvider,
    rx_command: mpsc::Receiver<IngestCommand>,
    poll_interval: Duration,
}

impl IngestService {
    pub fn new(session: Session, rx_command: mpsc::Receiver<IngestCommand>) -> Self {
        let config = session.config().connection;
        Self {
            session,
            client: IngestionClient::new(config),
            io: TokioIoProvider::new(),
            rx_command,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn client(&self) -> &IngestionClient {
        &self.client
    }

    fn dispatch(&self, events: Vec<IngestEvent>) {
        for event in events {
            self.session.apply_ingest(event);
        }
    }

    fn handle_command(&mut self, command: IngestCommand) {
        log::debug!("Ingest command: {:?}", command);
        let events = match command {
            IngestCommand::Connect { host, port } => {
                self.client.connect(&mut self.io, &host, port)
            }
            IngestCommand::Disconnect => self.client.disconnect(&mut self.io),
            IngestCommand::SetDialogOpen(open) => {
                self.client.set_dialog_open(&mut self.io, open);
                Vec::new()
            }
        };
        self.dispatch(events);
    }

    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), WatchError> {
        log::info!("Ingest: starting");

        let (connect, config) = {
            let session = self.session.read();
            (!session.args.no_connect, session.engine.config().connection.clone())
        };
        if connect {
            log::info!("Ingest: connecting to {}:{}", config.host, config.port);
            let events = self.client.connect(&mut self.io, &config.host, config.port);
            self.dispatch(events);
        }

        let mut poll_timer = interval(self.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    log::info!("Ingest: shutdown requested");
                    break;
                }
                Some(command) = self.rx_command.recv() => {
                    self.handle_command(command);
                }
                _ = poll_timer.tick() => {
                    let events = self.client.poll(&mut self.io);
                    self.dispatch(events);
                }
            }
        }

        let events = self.client.shutdown(&mut self.io);
        self.dispatch(events);
        log::info!("Ingest: finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seawatch_core::ConnectionState;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn poll_until(
        service: &mut IngestService,
        mut done: impl FnMut(&IngestService) -> bool,
    ) -> bool {
        for _ in 0..300 {
            let events = service.client.poll(&mut service.io);
            service.dispatch(events);
            if done(service) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_stream_reaches_engine() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (session, rx) = Session::new_fake();
        let mut hub_rx = session.hub().subscribe();
        let mut service = IngestService::new(session.clone(), rx);
        service.handle_command(IngestCommand::Connect {
            host: "127.0.0.1".into(),
            port,
        });

        let (mut server, _) = listener.accept().await.unwrap();
        assert!(poll_until(&mut service, |s| s.client().state() == ConnectionState::Connected).await);

        server
            .write_all(br#"{"NAV_LAT":1.0,"NAV_LONG":2.0,"NAV_SPEED_OVER_GROUND":5,"NAV_HEADING_OVER_GROUND":90}"#)
            .await
            .unwrap();
        server
            .write_all(br#"{"AIS_TARGETS":"42","AIS_TARGET_42":"LAT=1.0;LON=2.05;SOG=5;COG=270"}"#)
            .await
            .unwrap();

        let session2 = session.clone();
        assert!(
            poll_until(&mut service, move |_| session2.read().engine.target("42").is_some()).await
        );
        assert!(session.is_connected());
        let own = session.read().engine.own_ship().copied().unwrap();
        assert_eq!(own.latitude, 1.0);
        let risk = session.read().engine.target("42").and_then(|t| t.risk);
        assert!(risk.is_some());

        // Link up was published
        let mut saw_link_up = false;
        while let Ok(event) = hub_rx.try_recv() {
            if event.event == seawatch_core::WatchEvent::Ingest(IngestEvent::ConnectivityChanged(true)) {
                saw_link_up = true;
            }
        }
        assert!(saw_link_up);

        drop(server);
        assert!(poll_until(&mut service, |s| s.client().state() == ConnectionState::Reconnecting).await);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_command() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (session, rx) = Session::new_fake();
        let mut service = IngestService::new(session, rx);
        service.handle_command(IngestCommand::Connect {
            host: "127.0.0.1".into(),
            port,
        });
        let _server = listener.accept().await.unwrap();
        assert!(poll_until(&mut service, |s| s.client().state() == ConnectionState::Connected).await);

        service.handle_command(IngestCommand::Disconnect);
        assert_eq!(service.client().state(), ConnectionState::Disconnected);
        assert_eq!(service.io.open_sockets(), 0);
    }
}
