//! Device report normalization.
//!
//! Converts a raw device report into the canonical envelope, applying
//! model-specific unit conversions. Pure and side-effect free (one warning
//! log aside), which makes it the unit-test boundary for report handling.

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::envelope::Envelope;

/// Models this bridge recognizes. Reports from anything else are still
/// forwarded, but flagged so operators can extend the mapping.
pub const KNOWN_MODELS: &[&str] = &[
    "gateway",
    "sensor_ht",
    "switch",
    "sensor_switch.aq2",
    "motion",
    "sensor_motion.aq2",
    "magnet",
    "sensor_magnet.aq2",
    "cube",
    "86sw1",
    "86sw2",
    "ctrl_neutral1",
    "ctrl_neutral2",
    "sensor_wleak.aq1",
    "plug",
];

pub fn is_known_model(model: &str) -> bool {
    KNOWN_MODELS.contains(&model)
}

/// Normalize one `report`/`read_ack` into the canonical envelope.
pub fn normalize(
    cmd: &str,
    model: &str,
    sid: &str,
    short_id: Option<Value>,
    data: Value,
) -> Envelope {
    let data = match model {
        "sensor_ht" => normalize_sensor_ht(data),
        _ => {
            if !is_known_model(model) {
                warn!("unknown model `{}` from sid {}, forwarding unchanged", model, sid);
            }
            data
        }
    };
    Envelope::device(cmd, model, sid, short_id, data)
}

/// Temperature/humidity arrive as integer tenths. The canonical shape is
/// `{voltage?, temperature, humidity}` with both readings always present,
/// null when the device sent zero or nothing. The hardware uses zero for
/// "not reported", so a literal 0.0 reading is indistinguishable and
/// discarded.
fn normalize_sensor_ht(data: Value) -> Value {
    let source = match data {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let mut out = Map::new();
    if let Some(voltage) = source.get("voltage") {
        out.insert("voltage".to_string(), voltage.clone());
    }
    out.insert("temperature".to_string(), tenths(source.get("temperature")));
    out.insert("humidity".to_string(), tenths(source.get("humidity")));
    Value::Object(out)
}

/// Divide a raw tenths reading by 10, rounding halves up to the nearest
/// tenth. Not `f64::round`, which rounds negative halves the other way.
fn tenths(raw: Option<&Value>) -> Value {
    match raw.and_then(Value::as_f64) {
        Some(v) if v != 0.0 => json!((v + 0.5).floor() / 10.0),
        _ => Value::Null,
    }
}
