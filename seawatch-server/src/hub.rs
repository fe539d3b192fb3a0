//! EventHub: fan-out of engine events to subscribers.
//!
//! Every event published here is logged once and then broadcast. Slow
//! subscribers lag and lose events; publishing never waits.

use chrono::{DateTime, Utc};
use seawatch_core::{AlertEvent, IngestEvent, WatchEvent};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default broadcast channel capacity
pub const HUB_CAPACITY: usize = 256;

/// One published event with its wall-clock time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: WatchEvent,
}

#[derive(Clone)]
pub struct EventHub {
    event_tx: broadcast::Sender<HubEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    /// Log and broadcast an event. Having no subscribers is fine.
    pub fn publish(&self, event: WatchEvent) {
        log_event(&event);
        let _ = self.event_tx.send(HubEvent {
            timestamp: Utc::now(),
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(HUB_CAPACITY)
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventHub {{ subscribers: {} }}", self.subscriber_count())
    }
}

fn log_event(event: &WatchEvent) {
    match event {
        WatchEvent::Ingest(IngestEvent::ConnectivityChanged(true)) => {
            log::info!("Telemetry link up")
        }
        WatchEvent::Ingest(IngestEvent::ConnectivityChanged(false)) => {
            log::warn!("Telemetry link down")
        }
        WatchEvent::Ingest(IngestEvent::ReconnectStatus(text)) => log::debug!("{}", text),
        WatchEvent::Ingest(IngestEvent::OwnShipUpdated(update)) => {
            log::trace!("Own ship: {:?}", update)
        }
        WatchEvent::Ingest(IngestEvent::TargetUpdated(report)) => {
            log::trace!("Target {}: {:?}", report.id, report.state)
        }
        WatchEvent::Ingest(IngestEvent::TargetLost(id)) => log::debug!("Target {} lost", id),
        WatchEvent::RiskUpdated { id, result, level } => log::debug!(
            "Target {}: CPA {:.2} NM, TCPA {:.1} min, {} ({:?})",
            id,
            result.cpa,
            result.tcpa,
            result.status,
            level
        ),
        WatchEvent::TargetExpired { id } => log::info!("Target {} expired", id),
        WatchEvent::Alert(AlertEvent::Triggered { alert }) => log::warn!(
            "Alert #{} [{}] {}: {}",
            alert.id,
            alert.priority,
            alert.title,
            alert.message
        ),
        WatchEvent::Alert(AlertEvent::Critical { alert }) => {
            log::error!("CRITICAL alert #{}: {}", alert.id, alert.title)
        }
        WatchEvent::Alert(AlertEvent::StateChanged { id, state }) => {
            log::info!("Alert #{} is now {}", id, state)
        }
    }
}
