//! Deterministic value → colour assignment for attribute colouring.

use std::collections::BTreeMap;

use serde_json::Value;

/// Colour mapping of one attribute column, keyed by the value's text form.
pub type ColourMapping = BTreeMap<String, String>;

/// At most this many distinct values get a colour.
pub const MAX_COLOUR_VALUES: usize = 50;

/// Hue steps used to interleave neighbouring indices around the wheel.
const HUE_STEPS: usize = 12;

const SATURATION: f64 = 80.0;
const LIGHTNESS: f64 = 50.0;

/// Fixed colours for the standard network voltages (volts).
pub const VOLTAGE_COLOUR_PRESET: [(f64, &str); 5] = [
    (415.0, "#6fdd50"),
    (3300.0, "#8bb01c"),
    (6600.0, "#edbd0e"),
    (11000.0, "#e86033"),
    (22000.0, "#0eaaed"),
];

/// HSL (degrees, percent, percent) to `#rrggbb`.
pub fn hsl_to_hex(h: f64, s: f64, l: f64) -> String {
    let l = l / 100.0;
    let a = s * l.min(1.0 - l) / 100.0;
    let channel = |n: f64| {
        let k = (n + h / 30.0) % 12.0;
        let c = l - a * (k - 3.0).min(9.0 - k).min(1.0).max(-1.0);
        (255.0 * c).round().clamp(0.0, 255.0) as u8
    };
    format!("#{:02x}{:02x}{:02x}", channel(0.0), channel(8.0), channel(4.0))
}

/// Text form of a column value as used for mapping keys: strings verbatim,
/// numbers without a trailing `.0`. Compound values and `null` have none.
pub fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Preset colour for a voltage value given as a number or numeric string.
pub fn voltage_preset(value: &Value) -> Option<&'static str> {
    let volts = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    VOLTAGE_COLOUR_PRESET
        .iter()
        .find(|(v, _)| *v == volts)
        .map(|(_, colour)| *colour)
}

/// `true` if a column should use the voltage presets.
pub fn is_voltage_column(column: &str) -> bool {
    column.contains("voltage")
}

/// Assigns every value a colour.
///
/// Only the first [`MAX_COLOUR_VALUES`] values are considered. With
/// `is_voltage`, values found in [`VOLTAGE_COLOUR_PRESET`] keep their preset;
/// every other value at index `i` of `n` gets hue
/// `(i / n * 360 + 30 * (i % 12)) % 360` at 80% saturation and 50% lightness.
pub fn generate_colour_mapping(values: &[Value], is_voltage: bool) -> ColourMapping {
    let values = &values[..values.len().min(MAX_COLOUR_VALUES)];
    let n = values.len() as f64;
    let mut mapping = ColourMapping::new();

    for (i, value) in values.iter().enumerate() {
        let Some(key) = value_key(value) else {
            continue;
        };
        if is_voltage && let Some(preset) = voltage_preset(value) {
            mapping.insert(key, preset.to_string());
            continue;
        }

        let angle = i as f64 / n * 360.0;
        let offset = (360.0 / HUE_STEPS as f64) * (i % HUE_STEPS) as f64;
        let hue = (angle + offset) % 360.0;
        mapping.insert(key, hsl_to_hex(hue, SATURATION, LIGHTNESS));
    }

    mapping
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn hsl_primaries() {
        assert_eq!(hsl_to_hex(0.0, 100.0, 50.0), "#ff0000");
        assert_eq!(hsl_to_hex(120.0, 100.0, 50.0), "#00ff00");
        assert_eq!(hsl_to_hex(240.0, 100.0, 50.0), "#0000ff");
        assert_eq!(hsl_to_hex(0.0, 0.0, 100.0), "#ffffff");
    }

    #[test]
    fn mapping_is_deterministic() {
        let values: Vec<Value> = ["a", "b", "c", "d", "e"].iter().map(|v| json!(v)).collect();
        let first = generate_colour_mapping(&values, false);
        let second = generate_colour_mapping(&values, false);
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
        // i = 0: hue 0.
        assert_eq!(first["a"], hsl_to_hex(0.0, 80.0, 50.0));
    }

    #[test]
    fn neighbours_are_spread_around_the_wheel() {
        let values: Vec<Value> = (0..4).map(|i| json!(i)).collect();
        let mapping = generate_colour_mapping(&values, false);
        // i = 1 of 4: 90 + 30 = 120 degrees.
        assert_eq!(mapping["1"], hsl_to_hex(120.0, 80.0, 50.0));
        // i = 3 of 4: 270 + 90 = 360 -> 0 degrees.
        assert_eq!(mapping["3"], mapping["0"]);
    }

    #[test]
    fn voltage_preset_takes_precedence() {
        let values = vec![json!(230), json!(11000), json!("22000")];
        let mapping = generate_colour_mapping(&values, is_voltage_column("voltage_level"));
        assert_eq!(mapping["11000"], "#e86033");
        assert_eq!(mapping["22000"], "#0eaaed");
        assert_ne!(mapping["230"], "#e86033");
    }

    #[test]
    fn presets_ignored_for_other_columns() {
        let values = vec![json!(11000)];
        let mapping = generate_colour_mapping(&values, is_voltage_column("owner"));
        assert_eq!(mapping["11000"], hsl_to_hex(0.0, 80.0, 50.0));
    }

    #[test]
    fn caps_candidate_values() {
        let values: Vec<Value> = (0..120).map(|i| json!(format!("v{i}"))).collect();
        let mapping = generate_colour_mapping(&values, false);
        assert_eq!(mapping.len(), MAX_COLOUR_VALUES);
        assert!(!mapping.contains_key("v50"));
    }

    #[test]
    fn value_keys() {
        assert_eq!(value_key(&json!(11000)).as_deref(), Some("11000"));
        assert_eq!(value_key(&json!(11000.0)).as_deref(), Some("11000"));
        assert_eq!(value_key(&json!(0.4)).as_deref(), Some("0.4"));
        assert_eq!(value_key(&json!("x")).as_deref(), Some("x"));
        assert_eq!(value_key(&Value::Null), None);
    }
}
