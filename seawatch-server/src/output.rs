//! `--output`: every hub event as one JSON line on stdout.

use std::io::Write;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::hub::HubEvent;
use crate::WatchError;

pub struct EventPrinter {
    rx: broadcast::Receiver<HubEvent>,
}

impl EventPrinter {
    pub fn new(rx: broadcast::Receiver<HubEvent>) -> Self {
        Self { rx }
    }

    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), WatchError> {
        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => break,
                r = self.rx.recv() => {
                    match r {
                        Ok(event) => {
                            let mut stdout = std::io::stdout().lock();
                            write_event(&mut stdout, &event)?;
                            stdout.flush()?;
                        }
                        Err(RecvError::Lagged(n)) => {
                            log::warn!("Output: lagged, skipped {} events", n);
                        }
                        Err(RecvError::Closed) => return Err(WatchError::Shutdown),
                    }
                }
            }
        }
        Ok(())
    }
}

/// Write `event` as a single line of JSON.
pub fn write_event<W: Write>(w: &mut W, event: &HubEvent) -> Result<(), WatchError> {
    serde_json::to_writer(&mut *w, event)?;
    w.write_all(b"\n")?;
    Ok(())
}
