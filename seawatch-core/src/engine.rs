//! Watch engine: ingestion output → collision risk → alerts
//!
//! ```text
//!   IngestEvent ──▶ apply() ──▶ own ship / target table ──▶ evaluate() ──▶ RiskUpdated
//!                                                                 │
//!   tick ────────▶ sweep() ──▶ prune stale targets ──▶ AlertManager::evaluate_conditions
//!                                                                 │
//!                                                                 ▼
//!                                                           AlertEvent
//! ```
//!
//! The engine is a plain context object. It holds no sockets and no clock;
//! the caller passes `now_ms` to every call, and everything that happens is
//! returned as [`WatchEvent`]s.

use std::collections::HashMap;

use serde::Serialize;

use crate::alerts::{
    AlertCounts, AlertEvent, AlertId, AlertManager, AlertPosition, AlertRecord, AlertRequest,
    SensorSnapshot, TargetRisk,
};
use crate::collision::{self, CpaResult, RiskLevel, RiskProfile, VesselState};
use crate::config::WatchConfig;
use crate::ingest::IngestEvent;

/// Everything the engine reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WatchEvent {
    /// Ingestion event, passed through unchanged
    Ingest(IngestEvent),
    /// New CPA result for a target
    #[serde(rename_all = "camelCase")]
    RiskUpdated {
        id: String,
        result: CpaResult,
        level: RiskLevel,
    },
    /// Target removed after not being reported for too long
    TargetExpired { id: String },
    Alert(AlertEvent),
}

/// One entry of the target table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedTarget {
    pub state: VesselState,
    pub last_update_ms: u64,
    /// Latest result, `None` until own ship has a position
    pub risk: Option<CpaResult>,
    pub level: RiskLevel,
}

/// Own-ship sensor values that are not part of [`VesselState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnShipSensors {
    pub depth: Option<f64>,
    pub depth_below_keel: Option<f64>,
    pub heading: Option<f64>,
    pub speed_through_water: Option<f64>,
    pub rate_of_turn: Option<f64>,
}

/// Shared situational state and the alert set.
#[derive(Debug)]
pub struct WatchEngine {
    config: WatchConfig,
    own_ship: Option<VesselState>,
    sensors: OwnShipSensors,
    targets: HashMap<String, TrackedTarget>,
    profile: RiskProfile,
    alerts: AlertManager,
    connected: bool,
}

impl WatchEngine {
    pub fn new(config: WatchConfig) -> Self {
        let alerts = AlertManager::new(&config.alarms);
        WatchEngine {
            config,
            own_ship: None,
            sensors: OwnShipSensors::default(),
            targets: HashMap::new(),
            profile: RiskProfile::default(),
            alerts,
            connected: false,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn own_ship(&self) -> Option<&VesselState> {
        self.own_ship.as_ref()
    }

    pub fn sensors(&self) -> &OwnShipSensors {
        &self.sensors
    }

    pub fn target(&self, id: &str) -> Option<&TrackedTarget> {
        self.targets.get(id)
    }

    /// Targets sorted by id.
    pub fn targets(&self) -> Vec<(&str, &TrackedTarget)> {
        let mut list: Vec<_> = self.targets.iter().map(|(k, v)| (k.as_str(), v)).collect();
        list.sort_by(|a, b| a.0.cmp(b.0));
        list
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn alerts_mut(&mut self) -> &mut AlertManager {
        &mut self.alerts
    }

    pub fn set_risk_profile(&mut self, profile: RiskProfile) {
        self.profile = profile;
    }

    // -------------------------------------------------------------------------
    // Ingestion
    // -------------------------------------------------------------------------

    /// Fold one ingestion event into the state.
    pub fn apply(&mut self, event: IngestEvent, now_ms: u64) -> Vec<WatchEvent> {
        let mut events = Vec::new();

        match &event {
            IngestEvent::ConnectivityChanged(up) => self.connected = *up,
            IngestEvent::OwnShipUpdated(update) => {
                let s = &mut self.sensors;
                s.depth = update.depth.or(s.depth);
                s.depth_below_keel = update.depth_below_keel.or(s.depth_below_keel);
                s.heading = update.heading.or(s.heading);
                s.speed_through_water = update.speed_through_water.or(s.speed_through_water);
                s.rate_of_turn = update.rate_of_turn.or(s.rate_of_turn);

                if let Some(vessel) = update.vessel {
                    self.own_ship = Some(vessel);
                    let mut ids: Vec<String> = self.targets.keys().cloned().collect();
                    ids.sort();
                    for id in ids {
                        events.extend(self.refresh_risk(&id));
                    }
                }
            }
            IngestEvent::TargetUpdated(report) => {
                let entry = self
                    .targets
                    .entry(report.id.clone())
                    .or_insert(TrackedTarget {
                        state: report.state,
                        last_update_ms: now_ms,
                        risk: None,
                        level: RiskLevel::None,
                    });
                entry.state = report.state;
                entry.last_update_ms = now_ms;
                events.extend(self.refresh_risk(&report.id));
            }
            IngestEvent::TargetLost(id) => {
                self.targets.remove(id);
            }
            IngestEvent::ReconnectStatus(_) => {}
        }

        events.insert(0, WatchEvent::Ingest(event));
        events
    }

    fn refresh_risk(&mut self, id: &str) -> Option<WatchEvent> {
        let own = self.own_ship?;
        let target = self.targets.get_mut(id)?;
        let result = collision::evaluate(&own, &target.state);
        let level = self.profile.classify(&result);
        target.risk = Some(result);
        target.level = level;
        Some(WatchEvent::RiskUpdated {
            id: id.to_string(),
            result,
            level,
        })
    }

    // -------------------------------------------------------------------------
    // Periodic sweep
    // -------------------------------------------------------------------------

    /// Prune stale targets, then run the alert condition check.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<WatchEvent> {
        let timeout = self.config.alarms.target_timeout_ms;
        let mut expired: Vec<String> = self
            .targets
            .iter()
            .filter(|(_, t)| now_ms.saturating_sub(t.last_update_ms) > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();

        let mut events = Vec::new();
        for id in expired {
            self.targets.remove(&id);
            events.push(WatchEvent::TargetExpired { id });
        }

        let sensors = SensorSnapshot {
            depth_m: self.sensors.depth,
            position: self.own_ship.map(|v| AlertPosition {
                latitude: v.latitude,
                longitude: v.longitude,
            }),
        };
        let mut risks: Vec<TargetRisk> = self
            .targets
            .iter()
            .filter_map(|(id, t)| {
                t.risk.map(|result| TargetRisk {
                    id: id.clone(),
                    result,
                    position: Some(AlertPosition {
                        latitude: t.state.latitude,
                        longitude: t.state.longitude,
                    }),
                })
            })
            .collect();
        risks.sort_by(|a, b| a.id.cmp(&b.id));

        self.alerts.evaluate_conditions(&sensors, &risks, now_ms);
        events.extend(self.take_alert_events());
        events
    }

    // -------------------------------------------------------------------------
    // Control surface
    // -------------------------------------------------------------------------

    pub fn trigger_alert(&mut self, request: AlertRequest, now_ms: u64) -> Option<AlertId> {
        self.alerts.trigger(request, now_ms)
    }

    pub fn acknowledge_alert(&mut self, id: AlertId, now_ms: u64) -> bool {
        self.alerts.acknowledge(id, now_ms)
    }

    pub fn resolve_alert(&mut self, id: AlertId, now_ms: u64) -> bool {
        self.alerts.resolve(id, now_ms)
    }

    pub fn silence_alert(&mut self, id: AlertId, now_ms: u64) -> bool {
        self.alerts.silence(id, now_ms)
    }

    pub fn clear_all_alerts(&mut self, now_ms: u64) -> usize {
        self.alerts.clear_all(now_ms)
    }

    pub fn active_alerts(&self) -> Vec<AlertRecord> {
        self.alerts.active_alerts().into_iter().cloned().collect()
    }

    pub fn alert_counts(&self) -> AlertCounts {
        self.alerts.counts()
    }

    /// One-off CPA/TCPA between any two vessels.
    pub fn evaluate(own: &VesselState, target: &VesselState) -> CpaResult {
        collision::evaluate(own, target)
    }

    /// Drain alert notifications queued by control calls and sweeps.
    pub fn take_alert_events(&mut self) -> Vec<WatchEvent> {
        self.alerts
            .take_events()
            .into_iter()
            .map(WatchEvent::Alert)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertPriority, AlertType};
    use crate::collision::CpaStatus;
    use crate::telemetry::{OwnShipUpdate, TargetReport, TelemetryDecoder};

    fn own_update(lat: f64, lon: f64, cog: f64, sog: f64) -> IngestEvent {
        IngestEvent::OwnShipUpdated(OwnShipUpdate {
            vessel: Some(VesselState::new(lat, lon, cog, sog)),
            ..Default::default()
        })
    }

    fn target_update(id: &str, lat: f64, lon: f64, cog: f64, sog: f64) -> IngestEvent {
        IngestEvent::TargetUpdated(TargetReport {
            id: id.into(),
            state: VesselState::new(lat, lon, cog, sog),
        })
    }

    fn risk_ids(events: &[WatchEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                WatchEvent::RiskUpdated { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_target_without_own_ship_has_no_risk() {
        let mut engine = WatchEngine::new(WatchConfig::default());
        let events = engine.apply(target_update("1", 0.0, 0.1, 270.0, 10.0), 0);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WatchEvent::Ingest(_)));
        assert_eq!(engine.target("1").unwrap().risk, None);
    }

    #[test]
    fn test_own_ship_update_refreshes_all_targets() {
        let mut engine = WatchEngine::new(WatchConfig::default());
        engine.apply(target_update("2", 0.0, 0.1, 270.0, 10.0), 0);
        engine.apply(target_update("1", 0.1, 0.0, 180.0, 10.0), 0);

        let events = engine.apply(own_update(0.0, 0.0, 90.0, 10.0), 0);
        assert_eq!(risk_ids(&events), vec!["1", "2"]);

        let t = engine.target("2").unwrap();
        let risk = t.risk.unwrap();
        assert_eq!(risk.status, CpaStatus::Valid);
        assert!(risk.cpa < 0.01);
        assert!(t.level >= RiskLevel::Low);
    }

    #[test]
    fn test_sensor_values_persist() {
        let mut engine = WatchEngine::new(WatchConfig::default());
        engine.apply(
            IngestEvent::OwnShipUpdated(OwnShipUpdate {
                depth: Some(12.0),
                ..Default::default()
            }),
            0,
        );
        engine.apply(
            IngestEvent::OwnShipUpdated(OwnShipUpdate {
                heading: Some(45.0),
                ..Default::default()
            }),
            0,
        );
        assert_eq!(engine.sensors().depth, Some(12.0));
        assert_eq!(engine.sensors().heading, Some(45.0));
        assert!(engine.own_ship().is_none());
    }

    #[test]
    fn test_lost_target_removed() {
        let mut engine = WatchEngine::new(WatchConfig::default());
        engine.apply(target_update("1", 0.0, 0.1, 270.0, 10.0), 0);
        engine.apply(IngestEvent::TargetLost("1".into()), 0);
        assert!(engine.target("1").is_none());
    }

    #[test]
    fn test_target_leaving_roster_is_dropped() {
        let mut decoder = TelemetryDecoder::new();
        let mut engine = WatchEngine::new(WatchConfig::default());

        let msg = decoder
            .decode(
                br#"{"AIS_TARGETS":"111","AIS_TARGET_111":"ID=999;LAT=0.1;LON=0.2;SOG=10;COG=270"}"#,
                0,
            )
            .unwrap();
        for report in msg.targets {
            engine.apply(IngestEvent::TargetUpdated(report), 0);
        }
        assert!(engine.target("111").is_some());
        assert!(engine.target("999").is_none());

        let msg = decoder.decode(br#"{"AIS_TARGETS":""}"#, 1000).unwrap();
        assert_eq!(msg.lost, vec!["111".to_string()]);
        for id in msg.lost {
            engine.apply(IngestEvent::TargetLost(id), 1000);
        }
        assert!(engine.targets().is_empty());
    }

    #[test]
    fn test_sweep_expires_targets() {
        let mut config = WatchConfig::default();
        config.alarms.target_timeout_ms = 1000;
        let mut engine = WatchEngine::new(config);
        engine.apply(target_update("1", 0.0, 0.1, 270.0, 10.0), 0);
        engine.apply(target_update("2", 0.0, 0.2, 270.0, 10.0), 800);

        let events = engine.sweep(1500);
        assert_eq!(events, vec![WatchEvent::TargetExpired { id: "1".into() }]);
        assert!(engine.target("2").is_some());
    }

    #[test]
    fn test_sweep_raises_collision_alert_once() {
        let mut engine = WatchEngine::new(WatchConfig::default());
        engine.apply(own_update(0.0, 0.0, 90.0, 10.0), 0);
        engine.apply(target_update("7", 0.0, 0.1, 270.0, 10.0), 0);

        let events = engine.sweep(1000);
        let triggered: Vec<&AlertRecord> = events
            .iter()
            .filter_map(|e| match e {
                WatchEvent::Alert(AlertEvent::Triggered { alert }) => Some(alert),
                _ => None,
            })
            .collect();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].alert_type, AlertType::CollisionRisk);
        assert_eq!(triggered[0].source, "CPA_Monitor:7");

        let events = engine.sweep(2000);
        assert!(!events
            .iter()
            .any(|e| matches!(e, WatchEvent::Alert(AlertEvent::Triggered { .. }))));
        assert_eq!(engine.alert_counts().active, 1);
    }

    #[test]
    fn test_shallow_water_alert_and_clear() {
        let mut engine = WatchEngine::new(WatchConfig::default());
        engine.apply(
            IngestEvent::OwnShipUpdated(OwnShipUpdate {
                depth: Some(2.0),
                ..Default::default()
            }),
            0,
        );
        engine.sweep(0);
        let active = engine.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].priority, AlertPriority::Critical);

        engine.apply(
            IngestEvent::OwnShipUpdated(OwnShipUpdate {
                depth: Some(20.0),
                ..Default::default()
            }),
            1000,
        );
        engine.sweep(1000);
        assert!(engine.active_alerts().is_empty());
        assert_eq!(engine.alert_counts().history, 1);
    }

    #[test]
    fn test_control_surface() {
        let mut engine = WatchEngine::new(WatchConfig::default());
        let id = engine
            .trigger_alert(
                AlertRequest::new(
                    AlertType::UserDefined,
                    AlertPriority::Medium,
                    "Anchor watch",
                    "Check anchor",
                ),
                0,
            )
            .unwrap();
        assert!(engine.acknowledge_alert(id, 1));
        assert!(engine.resolve_alert(id, 2));
        assert!(!engine.acknowledge_alert(id, 3));
        assert_eq!(engine.take_alert_events().len(), 3);
        assert_eq!(engine.clear_all_alerts(4), 0);
    }

    #[test]
    fn test_connectivity_tracked() {
        let mut engine = WatchEngine::new(WatchConfig::default());
        engine.apply(IngestEvent::ConnectivityChanged(true), 0);
        assert!(engine.is_connected());
        engine.apply(IngestEvent::ConnectivityChanged(false), 0);
        assert!(!engine.is_connected());
    }
}
