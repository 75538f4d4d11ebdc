//! Outdoor weather normalization.
//!
//! Two provider payload shapes are supported:
//! - rich: a `currently` object with numeric readings and a `summary`
//! - minimal: `query.results.channel.item.condition.{temp,text}`
//!
//! Numeric readings are parsed leniently. Anything missing or unparsable
//! becomes `NaN` and is carried into the record untouched; JSON has no NaN so
//! the stored row shows `null` for it. The minimal shape reports whole
//! degrees, which stay integers in the stored row.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::get_path;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherShape {
    Rich,
    Minimal,
}

/// A numeric weather value as the provider gave it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Whole(i64),
    /// `NaN` when the provider value was missing or unparsable.
    Decimal(f64),
}

impl Reading {
    pub fn is_nan(self) -> bool {
        matches!(self, Reading::Decimal(v) if v.is_nan())
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Reading::Whole(v) => v as f64,
            Reading::Decimal(v) => v,
        }
    }

    fn to_value(self) -> Value {
        match self {
            Reading::Whole(v) => Value::from(v),
            Reading::Decimal(v) => number(v),
        }
    }
}

/// Weather fields merged into a reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub outside_temperature: Reading,
    /// Provider text, copied as-is.
    pub weather_conditions: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outside_humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apparent_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dew_point: Option<f64>,
}

impl WeatherReport {
    /// Normalizes a provider payload of the given shape.
    pub fn from_document(shape: WeatherShape, doc: &Value) -> Self {
        match shape {
            WeatherShape::Rich => Self::from_rich(doc),
            WeatherShape::Minimal => Self::from_minimal(doc),
        }
    }

    fn from_rich(doc: &Value) -> Self {
        let currently = |key: &str| get_path(doc, &["currently", key]);
        Self {
            outside_temperature: Reading::Decimal(parse_float(currently("temperature"))),
            weather_conditions: verbatim(currently("summary")),
            outside_humidity: Some(parse_float(currently("humidity"))),
            apparent_temperature: Some(parse_float(currently("apparentTemperature"))),
            wind_speed: Some(parse_float(currently("windSpeed"))),
            cloud_cover: Some(parse_float(currently("cloudCover"))),
            dew_point: Some(parse_float(currently("dewPoint"))),
        }
    }

    fn from_minimal(doc: &Value) -> Self {
        let condition = |key: &str| get_path(doc, &["query", "results", "channel", "item", "condition", key]);
        Self {
            outside_temperature: parse_int(condition("temp")).map_or(Reading::Decimal(f64::NAN), Reading::Whole),
            weather_conditions: verbatim(condition("text")),
            outside_humidity: None,
            apparent_temperature: None,
            wind_speed: None,
            cloud_cover: None,
            dew_point: None,
        }
    }

    /// Weather fields as a record, ready to be merged over a reading.
    pub fn to_record(&self) -> Record {
        let mut rec = Record::new();
        rec.insert("outsideTemperature", self.outside_temperature.to_value());
        rec.insert("weatherConditions", self.weather_conditions.clone().unwrap_or(Value::Null));
        let optional = [
            ("outsideHumidity", self.outside_humidity),
            ("apparentTemperature", self.apparent_temperature),
            ("windSpeed", self.wind_speed),
            ("cloudCover", self.cloud_cover),
            ("dewPoint", self.dew_point),
        ];
        for (field, value) in optional {
            if let Some(v) = value {
                rec.insert(field, number(v));
            }
        }
        rec
    }
}

fn number(v: f64) -> Value {
    // NaN / infinity have no JSON representation
    serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn verbatim(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

/// Float reading: numbers as-is, strings by their longest numeric prefix.
pub fn parse_float(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => float_prefix(s.trim_start()),
        _ => f64::NAN,
    }
}

/// Integer reading: numbers truncated, strings by their leading digits.
/// `None` when nothing usable is there.
pub fn parse_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64)),
        Value::String(s) => int_prefix(s.trim_start()),
        _ => None,
    }
}

fn int_prefix(s: &str) -> Option<i64> {
    let sign_len = usize::from(s.starts_with(['-', '+']));
    let digits = s[sign_len..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    s[..sign_len + digits].parse().ok()
}

fn float_prefix(s: &str) -> f64 {
    let bytes = s.as_bytes();
    let mut end = usize::from(s.starts_with(['-', '+']));
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return f64::NAN;
    }
    // optional exponent, only kept when it has digits
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'-' || bytes[exp_end] == b'+') {
            exp_end += 1;
        }
        let exp_digits = bytes[exp_end..].iter().take_while(|b| b.is_ascii_digit()).count();
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }
    s[..end].parse().unwrap_or(f64::NAN)
}
