use serde::Serialize;
use serde_json::Value;

/// Remote field names of the monitored record.
///
/// These are shared with the sensor firmware and every other client of the
/// database, so they must match exactly (spaces included).
pub mod fields {
    pub const TURBIDITY: &str = "Kekeruhan";
    pub const WATER_LEVEL: &str = "Ketinggian AIR";
    pub const PH: &str = "pH";
    pub const TEMPERATURE: &str = "SUHU";
    pub const TURBIDITY_STATUS: &str = "status KEKERUHAN AIR";
    pub const WATER_LEVEL_STATUS: &str = "status KETINGGIAN AIR";
    pub const TEMPERATURE_STATUS: &str = "status SUHU";
    pub const PH_STATUS: &str = "status pH";
    pub const AUTOMATIC: &str = "OTOMATIS";
    pub const PUMP1: &str = "POMPA1";
    pub const PUMP2: &str = "POMPA2";
}

/// A two-state control flag.
///
/// On the wire flags are the strings `"1"` and `"0"`, never JSON booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Off,
    On,
}

impl Flag {
    /// Wire representation of the flag.
    pub const fn encode(self) -> &'static str {
        match self {
            Flag::Off => "0",
            Flag::On => "1",
        }
    }

    /// Parse the wire representation. Anything but `"0"`/`"1"` is unknown.
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "0" => Some(Flag::Off),
            "1" => Some(Flag::On),
            _ => None,
        }
    }

    pub const fn is_on(self) -> bool {
        matches!(self, Flag::On)
    }

    pub const fn toggled(self) -> Self {
        match self {
            Flag::Off => Flag::On,
            Flag::On => Flag::Off,
        }
    }
}

impl From<bool> for Flag {
    fn from(on: bool) -> Self {
        if on { Flag::On } else { Flag::Off }
    }
}

impl From<Flag> for Value {
    fn from(flag: Flag) -> Self {
        Value::String(flag.encode().to_string())
    }
}

/// Local mirror of the monitored record.
///
/// Every field is optional: a missing or mistyped remote field shows up as
/// `None` instead of failing the whole mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub turbidity: Option<f64>,
    pub water_level: Option<f64>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,

    /// Status labels computed by the device, e.g. "Jernih"
    pub turbidity_status: Option<String>,
    pub water_level_status: Option<String>,
    pub temperature_status: Option<String>,
    pub ph_status: Option<String>,

    pub automatic: Option<Flag>,
    pub pump1: Option<Flag>,
    pub pump2: Option<Flag>,
}

impl SensorSnapshot {
    /// Map a full record value into a snapshot.
    pub fn from_record(record: &Value) -> Self {
        Self {
            turbidity: number_field(record, fields::TURBIDITY),
            water_level: number_field(record, fields::WATER_LEVEL),
            ph: number_field(record, fields::PH),
            temperature: number_field(record, fields::TEMPERATURE),
            turbidity_status: string_field(record, fields::TURBIDITY_STATUS),
            water_level_status: string_field(record, fields::WATER_LEVEL_STATUS),
            temperature_status: string_field(record, fields::TEMPERATURE_STATUS),
            ph_status: string_field(record, fields::PH_STATUS),
            automatic: flag_field(record, fields::AUTOMATIC),
            pump1: flag_field(record, fields::PUMP1),
            pump2: flag_field(record, fields::PUMP2),
        }
    }
}

fn number_field(record: &Value, field: &str) -> Option<f64> {
    record.get(field).and_then(Value::as_f64)
}

fn string_field(record: &Value, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Decode a flag field of a record.
pub fn flag_field(record: &Value, field: &str) -> Option<Flag> {
    record.get(field).and_then(Value::as_str).and_then(Flag::decode)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_flag_wire_encoding() {
        assert_eq!(Flag::On.encode(), "1");
        assert_eq!(Flag::Off.encode(), "0");
        assert_eq!(Flag::decode("1"), Some(Flag::On));
        assert_eq!(Flag::decode("0"), Some(Flag::Off));
        assert_eq!(Flag::decode("true"), None);
        assert_eq!(Flag::decode(""), None);
        assert_eq!(Value::from(Flag::On), json!("1"));
    }

    #[test]
    fn test_flag_toggle() {
        assert_eq!(Flag::On.toggled(), Flag::Off);
        assert_eq!(Flag::Off.toggled(), Flag::On);
        assert_eq!(Flag::from(true), Flag::On);
        assert!(!Flag::from(false).is_on());
    }

    #[test]
    fn test_full_record_mapping() {
        let record = json!({
            "Kekeruhan": 12,
            "Ketinggian AIR": 5,
            "pH": 7.1,
            "SUHU": 26,
            "status KEKERUHAN AIR": "Jernih",
            "status KETINGGIAN AIR": "Normal",
            "status SUHU": "Normal",
            "status pH": "Netral",
            "OTOMATIS": "0",
            "POMPA1": "1",
            "POMPA2": "0"
        });

        let snapshot = SensorSnapshot::from_record(&record);
        assert_eq!(
            snapshot,
            SensorSnapshot {
                turbidity: Some(12.0),
                water_level: Some(5.0),
                ph: Some(7.1),
                temperature: Some(26.0),
                turbidity_status: Some("Jernih".to_string()),
                water_level_status: Some("Normal".to_string()),
                temperature_status: Some("Normal".to_string()),
                ph_status: Some("Netral".to_string()),
                automatic: Some(Flag::Off),
                pump1: Some(Flag::On),
                pump2: Some(Flag::Off),
            }
        );
    }

    #[test]
    fn test_missing_and_mistyped_fields_are_none() {
        let record = json!({
            "Kekeruhan": "12",
            "pH": 7.1,
            "POMPA1": true,
            "POMPA2": "2",
            "status pH": 7,
            "unrelated": "field"
        });

        let snapshot = SensorSnapshot::from_record(&record);
        assert_eq!(snapshot.turbidity, None);
        assert_eq!(snapshot.ph, Some(7.1));
        assert_eq!(snapshot.water_level, None);
        assert_eq!(snapshot.pump1, None);
        assert_eq!(snapshot.pump2, None);
        assert_eq!(snapshot.ph_status, None);
    }

    #[test]
    fn test_non_object_record_maps_to_empty_snapshot() {
        assert_eq!(
            SensorSnapshot::from_record(&json!(42)),
            SensorSnapshot::default()
        );
    }

    #[test]
    fn test_snapshot_serializes_flags_as_words() {
        let snapshot = SensorSnapshot {
            pump1: Some(Flag::On),
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["pump1"], "on");
        assert_eq!(json["pump2"], Value::Null);
    }
}
