//! Payload decoding
//!
//! Payloads are compact JSON records:
//! `{"ts_ms":1718000000000,"device":"obd-pi","metric":"RPM","value":3120.5,"tags":{"drive":"..."}}`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{DecodeError, Metric, MetricValue, TelemetryEvent};

/// Wire shape of a telemetry record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPayload {
    /// Emission time, epoch milliseconds
    pub ts_ms: i64,
    /// Publishing device
    pub device: String,
    /// Wire metric name
    pub metric: String,
    /// Reading
    pub value: MetricValue,
    /// Free-form labels such as the drive id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
}

impl TelemetryPayload {
    /// Serialize to the compact JSON form publishers use
    pub fn to_bytes(&self) -> Vec<u8> {
        // Only string keys and plain values; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Decode a raw transport payload into a telemetry event.
///
/// Fails on an empty payload, malformed JSON, a missing required field
/// (`ts_ms`, `device`, `metric`, `value`) or a timestamp chrono cannot
/// represent. Unknown metric names are not an error here.
pub fn decode(payload: &[u8]) -> Result<TelemetryEvent, DecodeError> {
    if payload.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(DecodeError::Empty);
    }

    let wire: TelemetryPayload = serde_json::from_slice(payload)?;

    let event = TelemetryEvent {
        emitted_at_ms: wire.ts_ms,
        device: wire.device,
        metric: Metric::from_wire(&wire.metric),
        value: wire.value,
        tags: wire.tags.unwrap_or_default(),
    };
    if event.emitted_at().is_none() {
        return Err(DecodeError::InvalidTimestamp(event.emitted_at_ms));
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_record() {
        let raw = br#"{"ts_ms":1718000000000,"device":"obd-pi","metric":"RPM","value":3120.5,"tags":{"drive":"drive-1"}}"#;
        let ev = decode(raw).unwrap();
        assert_eq!(ev.emitted_at_ms, 1_718_000_000_000);
        assert_eq!(ev.device, "obd-pi");
        assert_eq!(ev.metric, Metric::Rpm);
        assert_eq!(ev.value, MetricValue::Number(3120.5));
        assert_eq!(ev.tags.get("drive").map(String::as_str), Some("drive-1"));
    }

    #[test]
    fn test_decode_without_tags() {
        let raw = br#"{"ts_ms":1,"device":"d","metric":"SPEED","value":12}"#;
        let ev = decode(raw).unwrap();
        assert!(ev.tags.is_empty());
        assert_eq!(ev.value, MetricValue::Number(12.0));
    }

    #[test]
    fn test_decode_string_value() {
        let raw = br#"{"ts_ms":1,"device":"race-monitor","metric":"LAST_LAP","value":"1:32.410","tags":{}}"#;
        let ev = decode(raw).unwrap();
        assert_eq!(ev.metric, Metric::Other("LAST_LAP".into()));
        assert_eq!(ev.value, MetricValue::Text("1:32.410".into()));
    }

    #[test]
    fn test_decode_missing_required_fields() {
        for raw in [
            &br#"{"device":"d","metric":"RPM","value":1}"#[..],
            br#"{"ts_ms":1,"metric":"RPM","value":1}"#,
            br#"{"ts_ms":1,"device":"d","value":1}"#,
            br#"{"ts_ms":1,"device":"d","metric":"RPM"}"#,
        ] {
            assert!(matches!(decode(raw), Err(DecodeError::Malformed(_))));
        }
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode(b""), Err(DecodeError::Empty)));
        assert!(matches!(decode(b"  \n"), Err(DecodeError::Empty)));
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(&[0xff, 0xfe, 0x00]), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(br#"{"ts_ms":"soon","device":"d","metric":"RPM","value":1}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"ts_ms":1,"device":"d","metric":"RPM","value":null}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_out_of_range_timestamp() {
        let raw = format!(
            r#"{{"ts_ms":{},"device":"d","metric":"RPM","value":1}}"#,
            i64::MAX
        );
        assert!(matches!(
            decode(raw.as_bytes()),
            Err(DecodeError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_payload_round_trips_through_decoder() {
        let payload = TelemetryPayload {
            ts_ms: 42,
            device: "sim".into(),
            metric: "THROTTLE_POS".into(),
            value: MetricValue::Number(17.5),
            tags: None,
        };
        let ev = decode(&payload.to_bytes()).unwrap();
        assert_eq!(ev.metric, Metric::Throttle);
        assert_eq!(ev.value.as_f64(), Some(17.5));
    }
}
