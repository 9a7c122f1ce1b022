// Wire payload for one publish cycle
use super::telemetry::Sample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All readings taken in one producer tick.
///
/// Published as `{"sequence": n, "timestamp_ms": t, "readings": {...}}`.
/// The bare `{"<metric>": <value>}` form older sensors send is accepted on
/// decode with `sequence` and `timestamp_ms` left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
    pub readings: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Envelope(ReadingSet),
    Flat(BTreeMap<String, f64>),
}

impl ReadingSet {
    pub fn from_samples(sequence: u64, timestamp_ms: i64, samples: Vec<Sample>) -> Self {
        let readings = samples.into_iter().map(|s| (s.metric, s.value)).collect();
        Self {
            sequence: Some(sequence),
            timestamp_ms: Some(timestamp_ms),
            readings,
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let payload: WirePayload = serde_json::from_slice(raw)?;
        Ok(match payload {
            WirePayload::Envelope(set) => set,
            WirePayload::Flat(readings) => Self {
                sequence: None,
                timestamp_ms: None,
                readings,
            },
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    #[cfg(test)]
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.readings.get(metric).copied()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_flat_payload() {
        let set = ReadingSet::decode(br#"{"Voltage (V)": 220.5, "Current (I)": 10}"#).unwrap();
        assert_eq!(set.sequence, None);
        assert_eq!(set.get("Voltage (V)"), Some(220.5));
        assert_eq!(set.get("Current (I)"), Some(10.0));
    }

    #[test]
    fn test_decode_envelope() {
        let raw = br#"{"sequence": 4, "timestamp_ms": 1700000000000, "readings": {"Vibration": 1.25}}"#;
        let set = ReadingSet::decode(raw).unwrap();
        assert_eq!(set.sequence, Some(4));
        assert_eq!(set.timestamp_ms, Some(1_700_000_000_000));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_encoded_form_carries_envelope() {
        let set = ReadingSet::from_samples(9, 1_000, vec![Sample::new("Temp (T)", 21.5, 1_000)]);
        let json: serde_json::Value = serde_json::from_slice(&set.encode().unwrap()).unwrap();
        assert_eq!(json["sequence"], 9);
        assert_eq!(json["readings"]["Temp (T)"], 21.5);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(ReadingSet::decode(br#"{"Voltage (V)": 220."#).is_err());
        assert!(ReadingSet::decode(br#"{"Voltage (V)": "high"}"#).is_err());
        assert!(ReadingSet::decode(b"[1, 2, 3]").is_err());
        assert!(ReadingSet::decode(&[0xff, 0xfe]).is_err());
    }
}
