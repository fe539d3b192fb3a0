//! Alert Lifecycle
//!
//! Operator alerts with acknowledgment, silencing and bounded history.
//!
//! ```text
//!            acknowledge            resolve
//!   Active ─────────────▶ Acknowledged ─────▶ Resolved ──▶ history
//!     │  \                                       ▲
//!     │   \ silence                              │
//!     │    ▶ Silenced ───────────────────────────┤
//!     └──────────────────────────────────────────┘
//! ```
//!
//! Alerts come from two places: explicit [`AlertManager::trigger`] calls,
//! which always create a new record, and the periodic condition sweep
//! ([`AlertManager::evaluate_conditions`]), which keeps at most one open
//! alert per condition and resolves it once the condition clears. A
//! condition is an alert type; only collision risk is split further, one
//! condition per target, using the alert source as the key.

mod manager;

pub use manager::{
    AlertManager, SensorSnapshot, TargetRisk, CPA_MONITOR_PREFIX, DEPTH_MONITOR_SOURCE,
};

use serde::{Deserialize, Serialize};

/// Alert identifier, unique and increasing within one manager.
pub type AlertId = u32;

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertType {
    GuardZoneProximity,
    DepthShallow,
    DepthDeep,
    CollisionRisk,
    NavigationWarning,
    SystemError,
    UserDefined,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::GuardZoneProximity => write!(f, "Guard zone proximity"),
            AlertType::DepthShallow => write!(f, "Shallow depth"),
            AlertType::DepthDeep => write!(f, "Deep depth"),
            AlertType::CollisionRisk => write!(f, "Collision risk"),
            AlertType::NavigationWarning => write!(f, "Navigation warning"),
            AlertType::SystemError => write!(f, "System error"),
            AlertType::UserDefined => write!(f, "User defined"),
        }
    }
}

/// Alert priority, ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertPriority::Low => write!(f, "LOW"),
            AlertPriority::Medium => write!(f, "MEDIUM"),
            AlertPriority::High => write!(f, "HIGH"),
            AlertPriority::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertState {
    Active,
    Acknowledged,
    Resolved,
    Silenced,
}

impl AlertState {
    /// Still in the active set
    pub fn is_open(&self) -> bool {
        !matches!(self, AlertState::Resolved)
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Active => write!(f, "Active"),
            AlertState::Acknowledged => write!(f, "Acknowledged"),
            AlertState::Resolved => write!(f, "Resolved"),
            AlertState::Silenced => write!(f, "Silenced"),
        }
    }
}

/// Where an alert applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// One alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: AlertId,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub state: AlertState,
    pub title: String,
    pub message: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<AlertPosition>,
    pub requires_acknowledgment: bool,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// Arguments of [`AlertManager::trigger`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub position: Option<AlertPosition>,
}

impl AlertRequest {
    pub fn new(
        alert_type: AlertType,
        priority: AlertPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AlertRequest {
            alert_type,
            priority,
            title: title.into(),
            message: message.into(),
            source: String::new(),
            position: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.position = Some(AlertPosition {
            latitude,
            longitude,
        });
        self
    }
}

/// Notifications produced by the manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AlertEvent {
    /// A new alert was created
    Triggered { alert: AlertRecord },
    /// A new alert with `Critical` priority was created; follows `Triggered`
    Critical { alert: AlertRecord },
    /// An existing alert changed state
    #[serde(rename_all = "camelCase")]
    StateChanged { id: AlertId, state: AlertState },
}

/// Summary of the active set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCounts {
    pub active: usize,
    pub acknowledged: usize,
    pub silenced: usize,
    /// Open alerts with `Critical` priority
    pub critical: usize,
    /// Open alerts that still wait for acknowledgment
    pub unacknowledged: usize,
    pub history: usize,
}
