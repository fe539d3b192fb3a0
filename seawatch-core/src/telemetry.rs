//! Telemetry field extraction.
//!
//! Each framed message is a flat JSON object. Own-ship navigation values use
//! fixed `NAV_*` keys; AIS targets are announced by a roster key listing the
//! target ids, with one templated `AIS_TARGET_<id>` key per target carrying a
//! compact `KEY=VALUE` report:
//!
//! ```text
//! {
//!   "NAV_LAT": "-6.1021", "NAV_LONG": 106.88, "NAV_DEPTH": 12.4,
//!   "AIS_TARGETS": "525001234,525009876",
//!   "AIS_TARGET_525001234": "ID=525001234;LAT=-6.11;LON=106.90;SOG=8.2;COG=271.5;TS=1700000000"
//! }
//! ```
//!
//! Targets are parsed in two phases: the roster is applied to the explicit
//! [`TargetRoster`] first, then every rostered id is looked up. A report that
//! fails is skipped; a bad field inside a report or an own-ship value that
//! fails is skipped on its own and the rest of the message still counts.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::collision::VesselState;
use crate::error::ParseError;

pub const KEY_LAT: &str = "NAV_LAT";
pub const KEY_LON: &str = "NAV_LONG";
pub const KEY_HEADING: &str = "NAV_HEADING";
pub const KEY_COG: &str = "NAV_HEADING_OVER_GROUND";
pub const KEY_SPEED: &str = "NAV_SPEED";
pub const KEY_SOG: &str = "NAV_SPEED_OVER_GROUND";
pub const KEY_STW: &str = "NAV_STW";
pub const KEY_DEPTH: &str = "NAV_DEPTH";
pub const KEY_DEPTH_BELOW_KEEL: &str = "NAV_DEPTH_BELOW_KEEL";
pub const KEY_ROT: &str = "NAV_ROT";
pub const KEY_YAW: &str = "NAV_YAW";
pub const KEY_Z: &str = "NAV_Z";
pub const KEY_DRIFT: &str = "NAV_DRIFT";
pub const KEY_DRIFT_ANGLE: &str = "NAV_DRIFT_ANGLE";
pub const KEY_SET: &str = "NAV_SET";

/// Roster of active target ids
pub const KEY_TARGET_ROSTER: &str = "AIS_TARGETS";
/// Prefix of the per-target report key
pub const TARGET_KEY_PREFIX: &str = "AIS_TARGET_";

/// Key of the report for `id`.
pub fn target_key(id: &str) -> String {
    format!("{}{}", TARGET_KEY_PREFIX, id)
}

// =============================================================================
// Decoded values
// =============================================================================

/// Own-ship values carried by one message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnShipUpdate {
    /// Present only when the message has both latitude and longitude
    pub vessel: Option<VesselState>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub speed_through_water: Option<f64>,
    /// Meters
    pub depth: Option<f64>,
    /// Meters
    pub depth_below_keel: Option<f64>,
    pub rate_of_turn: Option<f64>,
    pub yaw: Option<f64>,
    pub z: Option<f64>,
    pub drift: Option<f64>,
    pub drift_angle: Option<f64>,
    pub set: Option<f64>,
}

impl OwnShipUpdate {
    pub fn is_empty(&self) -> bool {
        *self == OwnShipUpdate::default()
    }
}

/// One target's kinematic report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    pub id: String,
    pub state: VesselState,
}

/// Everything extracted from one message.
#[derive(Debug, Clone, Default)]
pub struct DecodedMessage {
    pub own_ship: Option<OwnShipUpdate>,
    pub targets: Vec<TargetReport>,
    /// Ids dropped from the roster by this message
    pub lost: Vec<String>,
    /// Fields that were skipped
    pub skipped: Vec<ParseError>,
}

// =============================================================================
// Roster
// =============================================================================

/// Ids added and removed by a roster update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// The set of target ids announced by the last roster key.
#[derive(Debug, Clone, Default)]
pub struct TargetRoster {
    ids: BTreeSet<String>,
}

impl TargetRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated roster value.
    pub fn parse_ids(raw: &str) -> BTreeSet<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Replace the roster, returning what changed.
    pub fn update(&mut self, ids: BTreeSet<String>) -> RosterChange {
        let added = ids.difference(&self.ids).cloned().collect();
        let removed = self.ids.difference(&ids).cloned().collect();
        self.ids = ids;
        RosterChange { added, removed }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Turns framed messages into own-ship and target updates.
///
/// Keeps the roster and the last own-ship course and speed, since a message
/// does not have to repeat them.
#[derive(Debug, Clone, Default)]
pub struct TelemetryDecoder {
    roster: TargetRoster,
    last_cog: Option<f64>,
    last_sog: Option<f64>,
}

impl TelemetryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roster(&self) -> &TargetRoster {
        &self.roster
    }

    /// Forget the roster, e.g. when a new session starts.
    pub fn reset(&mut self) {
        self.roster.clear();
        self.last_cog = None;
        self.last_sog = None;
    }

    /// Decode one framed message.
    ///
    /// Fails only when the message is not a JSON object.
    pub fn decode(&mut self, message: &[u8], now_ms: u64) -> Result<DecodedMessage, ParseError> {
        let value: Value = serde_json::from_slice(message)?;
        let Value::Object(obj) = value else {
            return Err(ParseError::NotAnObject);
        };

        let mut out = DecodedMessage::default();
        let own = self.decode_own_ship(&obj, now_ms, &mut out.skipped);
        if !own.is_empty() {
            out.own_ship = Some(own);
        }

        if let Some(raw) = obj.get(KEY_TARGET_ROSTER) {
            match raw.as_str() {
                Some(list) => {
                    let change = self.roster.update(TargetRoster::parse_ids(list));
                    out.lost = change.removed;
                }
                None => out.skipped.push(ParseError::MalformedEntry(format!(
                    "{}={}",
                    KEY_TARGET_ROSTER, raw
                ))),
            }
        }

        for id in self.roster.ids() {
            let Some(raw) = obj.get(&target_key(id)) else {
                continue;
            };
            match parse_target_report(id, raw, now_ms, &mut out.skipped) {
                Ok(report) => out.targets.push(report),
                Err(e) => out.skipped.push(e),
            }
        }

        Ok(out)
    }

    fn decode_own_ship(
        &mut self,
        obj: &Map<String, Value>,
        now_ms: u64,
        skipped: &mut Vec<ParseError>,
    ) -> OwnShipUpdate {
        let mut field = |key: &str| -> Option<f64> {
            let raw = obj.get(key)?;
            match parse_number(key, raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    skipped.push(e);
                    None
                }
            }
        };

        // Zero means the source has no fix
        let lat = field(KEY_LAT).filter(|v| *v != 0.0);
        let lon = field(KEY_LON).filter(|v| *v != 0.0);
        let cog = field(KEY_COG);
        let sog = field(KEY_SOG);
        let heading = field(KEY_HEADING);

        let mut update = OwnShipUpdate {
            vessel: None,
            heading,
            speed: field(KEY_SPEED),
            speed_through_water: field(KEY_STW),
            depth: field(KEY_DEPTH),
            depth_below_keel: field(KEY_DEPTH_BELOW_KEEL),
            rate_of_turn: field(KEY_ROT),
            yaw: field(KEY_YAW),
            z: field(KEY_Z),
            drift: field(KEY_DRIFT),
            drift_angle: field(KEY_DRIFT_ANGLE),
            set: field(KEY_SET),
        };

        let lat = lat.and_then(|v| in_range(KEY_LAT, v, 90.0, skipped));
        let lon = lon.and_then(|v| in_range(KEY_LON, v, 180.0, skipped));

        if cog.is_some() {
            self.last_cog = cog;
        }
        if sog.is_some() {
            self.last_sog = sog;
        }

        if let (Some(latitude), Some(longitude)) = (lat, lon) {
            update.vessel = Some(VesselState {
                latitude,
                longitude,
                course_over_ground: self.last_cog.unwrap_or(0.0),
                speed_over_ground: self.last_sog.unwrap_or(0.0),
                heading,
                timestamp_ms: now_ms,
            });
        }
        update
    }
}

fn in_range(key: &str, value: f64, limit: f64, skipped: &mut Vec<ParseError>) -> Option<f64> {
    if value.abs() <= limit {
        Some(value)
    } else {
        skipped.push(ParseError::OutOfRange {
            key: key.to_string(),
            value,
        });
        None
    }
}

/// Read a JSON number or a numeric string.
pub fn parse_number(key: &str, value: &Value) -> Result<f64, ParseError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse one `AIS_TARGET_<id>` value.
///
/// The report is a list of `KEY=VALUE` pairs separated by `;` or `,`. `LAT`
/// and `LON` are required. A missing `SOG` or `COG` leaves the motion unknown
/// (NaN), which the calculator reports as invalid motion data. Without `TS`
/// the receive time is used. The report is always tagged with `roster_id`;
/// an `ID`/`MMSI` naming another vessel is skipped as a bad field.
pub fn parse_target_report(
    roster_id: &str,
    raw: &Value,
    now_ms: u64,
    skipped: &mut Vec<ParseError>,
) -> Result<TargetReport, ParseError> {
    let text = raw
        .as_str()
        .ok_or_else(|| ParseError::MalformedEntry(format!("{}={}", target_key(roster_id), raw)))?;

    let mut lat = None;
    let mut lon = None;
    let mut sog = f64::NAN;
    let mut cog = f64::NAN;
    let mut heading = None;
    let mut timestamp_ms = now_ms;

    for entry in text.split([';', ',']).map(str::trim).filter(|e| !e.is_empty()) {
        let Some((key, value)) = entry.split_once('=') else {
            skipped.push(ParseError::MalformedEntry(entry.to_string()));
            continue;
        };
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim();

        if key == "ID" || key == "MMSI" {
            if !value.is_empty() && value != roster_id {
                skipped.push(ParseError::IdMismatch {
                    roster: roster_id.to_string(),
                    reported: value.to_string(),
                });
            }
            continue;
        }

        let number = match value.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                skipped.push(ParseError::InvalidNumber {
                    key,
                    value: value.to_string(),
                });
                continue;
            }
        };
        match key.as_str() {
            "LAT" => lat = Some(number),
            "LON" => lon = Some(number),
            "SOG" => sog = number,
            "COG" => cog = number,
            "HDG" => heading = Some(number),
            "TS" if number >= 0.0 => timestamp_ms = number as u64,
            "TS" => skipped.push(ParseError::OutOfRange {
                key: key.clone(),
                value: number,
            }),
            _ => {}
        }
    }

    let latitude = lat.ok_or_else(|| ParseError::MissingField("LAT".into()))?;
    let longitude = lon.ok_or_else(|| ParseError::MissingField("LON".into()))?;

    Ok(TargetReport {
        id: roster_id.to_string(),
        state: VesselState {
            latitude,
            longitude,
            course_over_ground: cog,
            speed_over_ground: sog,
            heading,
            timestamp_ms,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(decoder: &mut TelemetryDecoder, json: &str) -> DecodedMessage {
        decoder.decode(json.as_bytes(), 1000).unwrap()
    }

    #[test]
    fn test_own_ship_numbers_and_strings() {
        let mut decoder = TelemetryDecoder::new();
        let msg = decode(
            &mut decoder,
            r#"{"NAV_LAT":"-6.1","NAV_LONG":106.8,"NAV_HEADING_OVER_GROUND":"45",
               "NAV_SPEED_OVER_GROUND":7.5,"NAV_DEPTH":"12.25","UNKNOWN":1}"#,
        );
        let own = msg.own_ship.unwrap();
        let vessel = own.vessel.unwrap();
        assert_eq!(vessel.latitude, -6.1);
        assert_eq!(vessel.longitude, 106.8);
        assert_eq!(vessel.course_over_ground, 45.0);
        assert_eq!(vessel.speed_over_ground, 7.5);
        assert_eq!(vessel.timestamp_ms, 1000);
        assert_eq!(own.depth, Some(12.25));
        assert!(msg.skipped.is_empty());
    }

    #[test]
    fn test_vessel_needs_both_coordinates() {
        let mut decoder = TelemetryDecoder::new();
        let msg = decode(&mut decoder, r#"{"NAV_LAT":1.5,"NAV_DEPTH":4}"#);
        let own = msg.own_ship.unwrap();
        assert!(own.vessel.is_none());
        assert_eq!(own.depth, Some(4.0));

        // A zero coordinate is "no fix"
        let msg = decode(&mut decoder, r#"{"NAV_LAT":1.5,"NAV_LONG":0.0}"#);
        assert!(msg.own_ship.is_none());
    }

    #[test]
    fn test_bad_field_skipped_rest_kept() {
        let mut decoder = TelemetryDecoder::new();
        let msg = decode(
            &mut decoder,
            r#"{"NAV_LAT":1.5,"NAV_LONG":2.5,"NAV_DEPTH":"deep","NAV_HEADING":true}"#,
        );
        let own = msg.own_ship.unwrap();
        assert!(own.vessel.is_some());
        assert_eq!(own.depth, None);
        assert_eq!(msg.skipped.len(), 2);
        assert!(matches!(
            msg.skipped[0],
            ParseError::InvalidNumber { ref key, .. } if key == KEY_HEADING || key == KEY_DEPTH
        ));
    }

    #[test]
    fn test_out_of_range_latitude() {
        let mut decoder = TelemetryDecoder::new();
        let msg = decode(&mut decoder, r#"{"NAV_LAT":95.0,"NAV_LONG":2.5}"#);
        assert!(msg.own_ship.is_none());
        assert!(matches!(msg.skipped[0], ParseError::OutOfRange { .. }));
    }

    #[test]
    fn test_course_and_speed_carry_over() {
        let mut decoder = TelemetryDecoder::new();
        decode(
            &mut decoder,
            r#"{"NAV_HEADING_OVER_GROUND":90,"NAV_SPEED_OVER_GROUND":5}"#,
        );
        let msg = decode(&mut decoder, r#"{"NAV_LAT":1.0,"NAV_LONG":2.0}"#);
        let vessel = msg.own_ship.unwrap().vessel.unwrap();
        assert_eq!(vessel.course_over_ground, 90.0);
        assert_eq!(vessel.speed_over_ground, 5.0);
    }

    #[test]
    fn test_roster_two_phase() {
        let mut decoder = TelemetryDecoder::new();
        let msg = decode(
            &mut decoder,
            r#"{"AIS_TARGETS":"111, 222,333",
               "AIS_TARGET_111":"ID=111;LAT=1.0;LON=2.0;SOG=10;COG=90;HDG=92;TS=5000",
               "AIS_TARGET_222":"LAT=1.1,LON=2.1,SOG=3,COG=180",
               "AIS_TARGET_999":"ID=999;LAT=1.0;LON=2.0"}"#,
        );
        assert_eq!(decoder.roster().len(), 3);
        assert_eq!(msg.targets.len(), 2);

        let first = &msg.targets[0];
        assert_eq!(first.id, "111");
        assert_eq!(first.state.course_over_ground, 90.0);
        assert_eq!(first.state.heading, Some(92.0));
        assert_eq!(first.state.timestamp_ms, 5000);

        let second = &msg.targets[1];
        assert_eq!(second.id, "222");
        assert_eq!(second.state.timestamp_ms, 1000);

        // Roster shrinks
        let msg = decode(&mut decoder, r#"{"AIS_TARGETS":"222"}"#);
        assert_eq!(msg.lost, vec!["111".to_string(), "333".to_string()]);
        assert!(decoder.roster().contains("222"));
    }

    #[test]
    fn test_report_without_roster_entry_uses_known_roster() {
        let mut decoder = TelemetryDecoder::new();
        decode(&mut decoder, r#"{"AIS_TARGETS":"7"}"#);
        let msg = decode(&mut decoder, r#"{"AIS_TARGET_7":"LAT=1;LON=2;SOG=1;COG=1"}"#);
        assert_eq!(msg.targets.len(), 1);
        assert_eq!(msg.targets[0].id, "7");
    }

    #[test]
    fn test_report_keeps_roster_id() {
        let mut decoder = TelemetryDecoder::new();
        let msg = decode(
            &mut decoder,
            r#"{"AIS_TARGETS":"111","AIS_TARGET_111":"ID=999;LAT=1.0;LON=2.0;SOG=5;COG=45"}"#,
        );
        assert_eq!(msg.targets.len(), 1);
        assert_eq!(msg.targets[0].id, "111");
        assert_eq!(msg.targets[0].state.speed_over_ground, 5.0);
        assert_eq!(
            msg.skipped,
            vec![ParseError::IdMismatch {
                roster: "111".into(),
                reported: "999".into(),
            }]
        );

        // A matching MMSI is not a problem
        let msg = decode(
            &mut decoder,
            r#"{"AIS_TARGET_111":"MMSI=111;LAT=1.0;LON=2.0;SOG=5;COG=45"}"#,
        );
        assert_eq!(msg.targets[0].id, "111");
        assert!(msg.skipped.is_empty());
    }

    #[test]
    fn test_report_missing_position_skipped() {
        let mut skipped = Vec::new();
        let raw = Value::String("ID=5;LAT=1.0;SOG=4".into());
        let err = parse_target_report("5", &raw, 0, &mut skipped).unwrap_err();
        assert_eq!(err, ParseError::MissingField("LON".into()));
    }

    #[test]
    fn test_report_bad_optional_field() {
        let mut skipped = Vec::new();
        let raw = Value::String("LAT=1.0;LON=2.0;SOG=fast;junk;COG=10".into());
        let report = parse_target_report("5", &raw, 0, &mut skipped).unwrap();
        assert!(report.state.speed_over_ground.is_nan());
        assert_eq!(report.state.course_over_ground, 10.0);
        assert_eq!(skipped.len(), 2);
    }

    #[test]
    fn test_not_an_object() {
        let mut decoder = TelemetryDecoder::new();
        assert_eq!(decoder.decode(b"[1,2]", 0).unwrap_err(), ParseError::NotAnObject);
        assert!(matches!(
            decoder.decode(b"{nope}", 0),
            Err(ParseError::InvalidJson(_))
        ));
    }
}
