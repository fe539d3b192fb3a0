//! Alert manager: the authoritative alert set.

use std::collections::{BTreeMap, VecDeque};

use super::{
    AlertCounts, AlertEvent, AlertId, AlertPosition, AlertPriority, AlertRecord, AlertRequest,
    AlertState, AlertType,
};
use crate::collision::{CpaResult, CpaThresholds};
use crate::config::AlarmConfig;

/// Source of the shallow water condition alert
pub const DEPTH_MONITOR_SOURCE: &str = "Depth_Monitor";
/// Prefix of collision condition alert sources, followed by the target id
pub const CPA_MONITOR_PREFIX: &str = "CPA_Monitor:";

/// Latest own-ship sensor values for the condition sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    /// Meters; `None` or zero means no reading
    pub depth_m: Option<f64>,
    pub position: Option<AlertPosition>,
}

/// Latest CPA result of one target for the condition sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRisk {
    pub id: String,
    pub result: CpaResult,
    pub position: Option<AlertPosition>,
}

/// Manages alert lifecycle and the periodic condition sweep.
///
/// Every mutating call queues [`AlertEvent`]s; the owner collects them with
/// [`take_events`](Self::take_events).
#[derive(Debug)]
pub struct AlertManager {
    enabled: bool,
    depth_monitoring: bool,
    collision_monitoring: bool,
    min_safe_depth_m: f64,
    thresholds: CpaThresholds,
    max_history: usize,
    next_id: AlertId,
    active: BTreeMap<AlertId, AlertRecord>,
    history: VecDeque<AlertRecord>,
    events: Vec<AlertEvent>,
}

impl AlertManager {
    pub fn new(config: &AlarmConfig) -> Self {
        AlertManager {
            enabled: config.enabled,
            depth_monitoring: config.depth_monitoring,
            collision_monitoring: config.collision_monitoring,
            min_safe_depth_m: config.min_safe_depth_m,
            thresholds: CpaThresholds::from_config(config),
            max_history: config.max_history.max(1),
            next_id: 1,
            active: BTreeMap::new(),
            history: VecDeque::new(),
            events: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Master switch. Disabling keeps open alerts but stops new ones.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_depth_monitoring(&mut self, enabled: bool) {
        self.depth_monitoring = enabled;
    }

    pub fn set_collision_monitoring(&mut self, enabled: bool) {
        self.collision_monitoring = enabled;
    }

    pub fn set_min_safe_depth(&mut self, meters: f64) {
        self.min_safe_depth_m = meters;
    }

    pub fn min_safe_depth(&self) -> f64 {
        self.min_safe_depth_m
    }

    pub fn set_thresholds(&mut self, thresholds: CpaThresholds) {
        self.thresholds = thresholds;
    }

    pub fn thresholds(&self) -> &CpaThresholds {
        &self.thresholds
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Create a new alert.
    ///
    /// Returns `None` when the system is disabled. Explicit triggers are
    /// never deduplicated.
    pub fn trigger(&mut self, request: AlertRequest, now_ms: u64) -> Option<AlertId> {
        if !self.enabled {
            return None;
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let record = AlertRecord {
            id,
            alert_type: request.alert_type,
            priority: request.priority,
            state: AlertState::Active,
            title: request.title,
            message: request.message,
            source: request.source,
            position: request.position,
            requires_acknowledgment: request.priority >= AlertPriority::High,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };

        self.events.push(AlertEvent::Triggered {
            alert: record.clone(),
        });
        if record.priority == AlertPriority::Critical {
            self.events.push(AlertEvent::Critical {
                alert: record.clone(),
            });
        }
        self.active.insert(id, record);
        Some(id)
    }

    /// `Active` → `Acknowledged`. False for unknown ids and other states.
    pub fn acknowledge(&mut self, id: AlertId, now_ms: u64) -> bool {
        self.transition(id, AlertState::Acknowledged, now_ms, |s| {
            s == AlertState::Active
        })
    }

    /// `Active` → `Silenced`.
    pub fn silence(&mut self, id: AlertId, now_ms: u64) -> bool {
        self.transition(id, AlertState::Silenced, now_ms, |s| s == AlertState::Active)
    }

    /// Resolve an open alert and move it to history.
    pub fn resolve(&mut self, id: AlertId, now_ms: u64) -> bool {
        let Some(mut record) = self.active.remove(&id) else {
            return false;
        };
        record.state = AlertState::Resolved;
        record.updated_at_ms = now_ms;
        self.events.push(AlertEvent::StateChanged {
            id,
            state: AlertState::Resolved,
        });

        self.history.push_back(record);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        true
    }

    /// Resolve every open alert. Returns how many were resolved.
    pub fn clear_all(&mut self, now_ms: u64) -> usize {
        let ids: Vec<AlertId> = self.active.keys().copied().collect();
        for id in &ids {
            self.resolve(*id, now_ms);
        }
        ids.len()
    }

    fn transition(
        &mut self,
        id: AlertId,
        to: AlertState,
        now_ms: u64,
        allowed: impl Fn(AlertState) -> bool,
    ) -> bool {
        match self.active.get_mut(&id) {
            Some(record) if allowed(record.state) => {
                record.state = to;
                record.updated_at_ms = now_ms;
                self.events.push(AlertEvent::StateChanged { id, state: to });
                true
            }
            _ => false,
        }
    }

    // -------------------------------------------------------------------------
    // Condition sweep
    // -------------------------------------------------------------------------

    /// Re-derive alert conditions from the latest sensor values.
    ///
    /// Raises at most one open alert per condition. A condition is its alert
    /// type, except collision risk, which is keyed per target by source.
    /// While a matching alert is open in any state (acknowledged and silenced
    /// included), a persisting condition only refreshes its message. A
    /// condition that cleared resolves the alert the sweep raised for it.
    /// Returns the ids of newly created alerts.
    pub fn evaluate_conditions(
        &mut self,
        sensors: &SensorSnapshot,
        risks: &[TargetRisk],
        now_ms: u64,
    ) -> Vec<AlertId> {
        let mut created = Vec::new();
        if !self.enabled {
            return created;
        }

        if self.depth_monitoring {
            if let Some(depth) = sensors.depth_m.filter(|d| *d > 0.0) {
                if depth < self.min_safe_depth_m {
                    let request = AlertRequest::new(
                        AlertType::DepthShallow,
                        AlertPriority::Critical,
                        "Shallow Water Alert",
                        format!(
                            "Current depth {:.1} m is below minimum safe depth {:.1} m",
                            depth, self.min_safe_depth_m
                        ),
                    )
                    .with_source(DEPTH_MONITOR_SOURCE);
                    let request = AlertRequest {
                        position: sensors.position,
                        ..request
                    };
                    created.extend(self.raise_condition(request, now_ms));
                } else {
                    self.clear_condition(AlertType::DepthShallow, DEPTH_MONITOR_SOURCE, now_ms);
                }
            }
        }

        if self.collision_monitoring {
            let mut dangerous = Vec::new();
            for risk in risks {
                if !self.thresholds.is_dangerous(&risk.result) {
                    continue;
                }
                let source = format!("{}{}", CPA_MONITOR_PREFIX, risk.id);
                let priority = if risk.result.cpa < self.thresholds.cpa_nm / 4.0 {
                    AlertPriority::Critical
                } else {
                    AlertPriority::High
                };
                let request = AlertRequest {
                    alert_type: AlertType::CollisionRisk,
                    priority,
                    title: "Collision Risk".to_string(),
                    message: format!(
                        "Target {} CPA {:.2} NM in {:.1} min",
                        risk.id, risk.result.cpa, risk.result.tcpa
                    ),
                    source: source.clone(),
                    position: risk.position,
                };
                created.extend(self.raise_condition(request, now_ms));
                dangerous.push(source);
            }

            let cleared: Vec<AlertId> = self
                .active
                .values()
                .filter(|r| {
                    r.alert_type == AlertType::CollisionRisk
                        && r.source.starts_with(CPA_MONITOR_PREFIX)
                        && !dangerous.contains(&r.source)
                })
                .map(|r| r.id)
                .collect();
            for id in cleared {
                self.resolve(id, now_ms);
            }
        }

        created
    }

    /// Trigger unless an alert for the same condition is open; otherwise
    /// update that alert in place.
    fn raise_condition(&mut self, request: AlertRequest, now_ms: u64) -> Option<AlertId> {
        let Some(id) = self.find_condition(request.alert_type, &request.source) else {
            return self.trigger(request, now_ms);
        };
        let Some(record) = self.active.get_mut(&id) else {
            return None;
        };
        record.message = request.message;
        record.position = request.position.or(record.position);
        record.updated_at_ms = now_ms;
        if request.priority > record.priority {
            record.priority = request.priority;
            record.requires_acknowledgment = record.priority >= AlertPriority::High;
            if record.priority == AlertPriority::Critical {
                self.events.push(AlertEvent::Critical {
                    alert: record.clone(),
                });
            }
        }
        None
    }

    fn clear_condition(&mut self, alert_type: AlertType, source: &str, now_ms: u64) {
        if let Some(id) = self.find_open(alert_type, source) {
            self.resolve(id, now_ms);
        }
    }

    /// Oldest open alert standing for the same condition.
    fn find_condition(&self, alert_type: AlertType, source: &str) -> Option<AlertId> {
        match alert_type {
            AlertType::CollisionRisk => self.find_open(alert_type, source),
            _ => self
                .active
                .values()
                .find(|r| r.alert_type == alert_type)
                .map(|r| r.id),
        }
    }

    /// Open alert of `alert_type` from `source`, if any.
    pub fn find_open(&self, alert_type: AlertType, source: &str) -> Option<AlertId> {
        self.active
            .values()
            .find(|r| r.alert_type == alert_type && r.source == source)
            .map(|r| r.id)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn get(&self, id: AlertId) -> Option<&AlertRecord> {
        self.active
            .get(&id)
            .or_else(|| self.history.iter().rev().find(|r| r.id == id))
    }

    /// Open alerts, highest priority first, then oldest first.
    pub fn active_alerts(&self) -> Vec<&AlertRecord> {
        let mut alerts: Vec<&AlertRecord> = self.active.values().collect();
        alerts.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        alerts
    }

    pub fn has_active_alerts(&self) -> bool {
        !self.active.is_empty()
    }

    /// Resolved alerts, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &AlertRecord> {
        self.history.iter()
    }

    pub fn counts(&self) -> AlertCounts {
        let mut counts = AlertCounts {
            history: self.history.len(),
            ..Default::default()
        };
        for record in self.active.values() {
            match record.state {
                AlertState::Active => counts.active += 1,
                AlertState::Acknowledged => counts.acknowledged += 1,
                AlertState::Silenced => counts.silenced += 1,
                AlertState::Resolved => {}
            }
            if record.priority == AlertPriority::Critical {
                counts.critical += 1;
            }
            if record.requires_acknowledgment && record.state == AlertState::Active {
                counts.unacknowledged += 1;
            }
        }
        counts
    }

    /// Drain queued notifications.
    pub fn take_events(&mut self) -> Vec<AlertEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CpaStatus;

    fn manager() -> AlertManager {
        AlertManager::new(&AlarmConfig::default())
    }

    fn request(priority: AlertPriority) -> AlertRequest {
        AlertRequest::new(AlertType::NavigationWarning, priority, "Title", "Message")
            .with_source("test")
    }

    fn shallow(depth: f64) -> SensorSnapshot {
        SensorSnapshot {
            depth_m: Some(depth),
            position: Some(AlertPosition {
                latitude: -6.1,
                longitude: 106.8,
            }),
        }
    }

    fn risk(id: &str, cpa: f64, tcpa: f64) -> TargetRisk {
        TargetRisk {
            id: id.to_string(),
            result: CpaResult {
                cpa,
                tcpa,
                current_range: 1.0,
                relative_bearing: 10.0,
                is_valid: true,
                status: CpaStatus::Valid,
            },
            position: None,
        }
    }

    #[test]
    fn test_trigger_assigns_increasing_ids() {
        let mut alerts = manager();
        let a = alerts.trigger(request(AlertPriority::Low), 10).unwrap();
        let b = alerts.trigger(request(AlertPriority::Low), 20).unwrap();
        assert!(b > a);

        let record = alerts.get(a).unwrap();
        assert_eq!(record.state, AlertState::Active);
        assert_eq!(record.created_at_ms, 10);
        assert!(!record.requires_acknowledgment);
    }

    #[test]
    fn test_trigger_events() {
        let mut alerts = manager();
        alerts.trigger(request(AlertPriority::High), 0);
        let events = alerts.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], AlertEvent::Triggered { alert } if alert.requires_acknowledgment));

        alerts.trigger(request(AlertPriority::Critical), 0);
        let events = alerts.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], AlertEvent::Critical { .. }));
        assert!(alerts.take_events().is_empty());
    }

    #[test]
    fn test_disabled_trigger_is_noop() {
        let mut alerts = manager();
        alerts.set_enabled(false);
        assert_eq!(alerts.trigger(request(AlertPriority::Critical), 0), None);
        assert!(!alerts.has_active_alerts());
        assert!(alerts.take_events().is_empty());
    }

    #[test]
    fn test_acknowledge_then_resolve() {
        let mut alerts = manager();
        let id = alerts.trigger(request(AlertPriority::High), 0).unwrap();
        assert!(alerts.acknowledge(id, 5));
        assert_eq!(alerts.get(id).unwrap().state, AlertState::Acknowledged);
        // Only from Active
        assert!(!alerts.acknowledge(id, 6));

        assert!(alerts.resolve(id, 7));
        assert!(!alerts.has_active_alerts());
        let record = alerts.get(id).unwrap();
        assert_eq!(record.state, AlertState::Resolved);
        assert_eq!(record.updated_at_ms, 7);
        assert_eq!(alerts.history().count(), 1);
    }

    #[test]
    fn test_acknowledge_resolved_fails() {
        let mut alerts = manager();
        let id = alerts.trigger(request(AlertPriority::Medium), 0).unwrap();
        assert!(alerts.resolve(id, 1));
        assert!(!alerts.acknowledge(id, 2));
        assert_eq!(alerts.get(id).unwrap().state, AlertState::Resolved);
        assert!(!alerts.resolve(id, 3));
        assert!(!alerts.acknowledge(999, 3));
    }

    #[test]
    fn test_silence() {
        let mut alerts = manager();
        let id = alerts.trigger(request(AlertPriority::High), 0).unwrap();
        assert!(alerts.silence(id, 1));
        assert_eq!(alerts.get(id).unwrap().state, AlertState::Silenced);
        assert!(!alerts.acknowledge(id, 2));
        assert!(alerts.resolve(id, 3));
    }

    #[test]
    fn test_clear_all() {
        let mut alerts = manager();
        let a = alerts.trigger(request(AlertPriority::Low), 0).unwrap();
        let b = alerts.trigger(request(AlertPriority::High), 0).unwrap();
        alerts.acknowledge(b, 1);
        alerts.take_events();

        assert_eq!(alerts.clear_all(2), 2);
        assert!(!alerts.has_active_alerts());
        assert_eq!(alerts.get(a).unwrap().state, AlertState::Resolved);
        let events = alerts.take_events();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, AlertEvent::StateChanged { state: AlertState::Resolved, .. })));
    }

    #[test]
    fn test_history_is_bounded() {
        let config = AlarmConfig {
            max_history: 3,
            ..Default::default()
        };
        let mut alerts = AlertManager::new(&config);
        for i in 0..5 {
            let id = alerts.trigger(request(AlertPriority::Low), i).unwrap();
            alerts.resolve(id, i);
        }
        let ids: Vec<AlertId> = alerts.history().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn test_sweep_deduplicates_shallow_depth() {
        let mut alerts = manager();
        let first = alerts.evaluate_conditions(&shallow(3.2), &[], 0);
        assert_eq!(first.len(), 1);
        let record = alerts.get(first[0]).unwrap();
        assert_eq!(record.alert_type, AlertType::DepthShallow);
        assert_eq!(record.priority, AlertPriority::Critical);
        assert_eq!(record.source, DEPTH_MONITOR_SOURCE);
        assert_eq!(
            record.message,
            "Current depth 3.2 m is below minimum safe depth 5.0 m"
        );

        // Still shallow: no second alert, message refreshed
        assert!(alerts.evaluate_conditions(&shallow(2.9), &[], 5000).is_empty());
        assert_eq!(alerts.counts().active, 1);
        assert!(alerts.get(first[0]).unwrap().message.contains("2.9 m"));

        // Acknowledged alerts still suppress duplicates
        alerts.acknowledge(first[0], 6000);
        assert!(alerts.evaluate_conditions(&shallow(2.9), &[], 10000).is_empty());
    }

    #[test]
    fn test_sweep_dedups_against_explicit_trigger() {
        let mut alerts = manager();
        let explicit = AlertRequest::new(
            AlertType::DepthShallow,
            AlertPriority::Critical,
            "Shallow Water Alert",
            "manual",
        )
        .with_source(DEPTH_MONITOR_SOURCE);
        alerts.trigger(explicit.clone(), 0).unwrap();
        assert!(alerts.evaluate_conditions(&shallow(1.0), &[], 0).is_empty());
        assert_eq!(alerts.counts().active, 1);

        // Explicit triggers are never deduplicated
        assert!(alerts.trigger(explicit, 1).is_some());
        assert_eq!(alerts.counts().active, 2);
    }

    #[test]
    fn test_sweep_dedups_on_type_across_sources() {
        let mut alerts = manager();
        let manual = alerts
            .trigger(
                AlertRequest::new(
                    AlertType::DepthShallow,
                    AlertPriority::Critical,
                    "Shallow Water Alert",
                    "reported by crew",
                )
                .with_source("manual"),
                0,
            )
            .unwrap();

        assert!(alerts.evaluate_conditions(&shallow(2.0), &[], 5000).is_empty());
        let shallow_open = alerts
            .active_alerts()
            .iter()
            .filter(|r| r.alert_type == AlertType::DepthShallow)
            .count();
        assert_eq!(shallow_open, 1);
        assert!(alerts.get(manual).unwrap().message.starts_with("Current depth 2.0 m"));

        // Acknowledged still counts as open
        assert!(alerts.acknowledge(manual, 6000));
        assert!(alerts.evaluate_conditions(&shallow(2.0), &[], 10000).is_empty());
        assert_eq!(alerts.counts().active, 1);

        // Clearing only resolves what the sweep raised
        alerts.evaluate_conditions(&shallow(8.0), &[], 15000);
        assert_eq!(alerts.get(manual).unwrap().state, AlertState::Acknowledged);
    }

    #[test]
    fn test_depth_condition_clears() {
        let mut alerts = manager();
        let id = alerts.evaluate_conditions(&shallow(3.0), &[], 0)[0];
        // Zero depth is "no reading" and changes nothing
        alerts.evaluate_conditions(&shallow(0.0), &[], 1000);
        assert!(alerts.has_active_alerts());

        alerts.evaluate_conditions(&shallow(8.0), &[], 2000);
        assert!(!alerts.has_active_alerts());
        assert_eq!(alerts.get(id).unwrap().state, AlertState::Resolved);

        // Shallow again: a new alert
        let again = alerts.evaluate_conditions(&shallow(3.0), &[], 3000);
        assert_eq!(again.len(), 1);
        assert_ne!(again[0], id);
    }

    #[test]
    fn test_depth_monitoring_disabled() {
        let mut alerts = manager();
        alerts.set_depth_monitoring(false);
        assert!(alerts.evaluate_conditions(&shallow(1.0), &[], 0).is_empty());
    }

    #[test]
    fn test_collision_condition() {
        let mut alerts = manager();
        let risks = vec![
            risk("111", 0.15, 10.0),
            risk("222", 0.01, 3.0),
            risk("333", 2.0, 30.0),
        ];
        let created = alerts.evaluate_conditions(&SensorSnapshot::default(), &risks, 0);
        assert_eq!(created.len(), 2);

        let high = alerts.find_open(AlertType::CollisionRisk, "CPA_Monitor:111").unwrap();
        assert_eq!(alerts.get(high).unwrap().priority, AlertPriority::High);
        let critical = alerts.find_open(AlertType::CollisionRisk, "CPA_Monitor:222").unwrap();
        assert_eq!(alerts.get(critical).unwrap().priority, AlertPriority::Critical);

        // Same risks again: nothing new
        assert!(alerts
            .evaluate_conditions(&SensorSnapshot::default(), &risks, 5000)
            .is_empty());

        // 111 no longer dangerous, 222 gone
        let risks = vec![risk("111", 1.5, 10.0)];
        alerts.evaluate_conditions(&SensorSnapshot::default(), &risks, 10000);
        assert!(!alerts.has_active_alerts());
        assert_eq!(alerts.counts().history, 2);
    }

    #[test]
    fn test_counts() {
        let mut alerts = manager();
        let a = alerts.trigger(request(AlertPriority::Critical), 0).unwrap();
        let b = alerts.trigger(request(AlertPriority::High), 0).unwrap();
        let c = alerts.trigger(request(AlertPriority::Low), 0).unwrap();
        alerts.acknowledge(a, 1);
        alerts.silence(b, 1);
        alerts.resolve(c, 1);

        let counts = alerts.counts();
        assert_eq!(counts.active, 0);
        assert_eq!(counts.acknowledged, 1);
        assert_eq!(counts.silenced, 1);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.unacknowledged, 0);
        assert_eq!(counts.history, 1);
    }

    #[test]
    fn test_active_alerts_sorted_by_priority() {
        let mut alerts = manager();
        alerts.trigger(request(AlertPriority::Low), 0);
        alerts.trigger(request(AlertPriority::Critical), 0);
        alerts.trigger(request(AlertPriority::Medium), 0);
        let order: Vec<AlertPriority> = alerts.active_alerts().iter().map(|r| r.priority).collect();
        assert_eq!(
            order,
            vec![
                AlertPriority::Critical,
                AlertPriority::Medium,
                AlertPriority::Low
            ]
        );
    }
}
