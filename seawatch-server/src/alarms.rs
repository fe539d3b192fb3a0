//! Alarm subsystem: runs the engine sweep every `evaluationIntervalMs`.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::{Session, WatchError};

pub struct AlarmService {
    session: Session,
    period: Duration,
}

impl AlarmService {
    pub fn new(session: Session) -> Self {
        let period = Duration::from_millis(session.config().alarms.evaluation_interval_ms.max(100));
        Self { session, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), WatchError> {
        log::info!("Alarms: sweeping every {} ms", self.period.as_millis());

        let mut sweep_timer = interval(self.period);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        sweep_timer.tick().await;

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    log::info!("Alarms: shutdown requested");
                    break;
                }
                _ = sweep_timer.tick() => {
                    self.session.sweep();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seawatch_core::telemetry::OwnShipUpdate;
    use seawatch_core::{AlertType, IngestEvent};

    #[test]
    fn test_period_from_config() {
        let (session, _rx) = Session::new_fake();
        assert_eq!(AlarmService::new(session).period(), Duration::from_millis(5000));
    }

    #[test]
    fn test_sweep_raises_depth_alarm() {
        let (session, _rx) = Session::new_fake();
        session.apply_ingest(IngestEvent::OwnShipUpdated(OwnShipUpdate {
            depth: Some(1.5),
            ..Default::default()
        }));
        session.sweep();
        session.sweep();

        let active = session.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].alert_type, AlertType::DepthShallow);
        assert_eq!(active[0].title, "Shallow Water Alert");
    }
}
