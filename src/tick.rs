//! Tick rows as accepted by the writer.
//!
//! A tick is one timestamped record carrying an arbitrary subset of a
//! symbol's fields. Field sets may differ from row to row; the chunk codec
//! turns a batch of them into sparse columns.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the reserved timestamp field.
pub const INDEX_FIELD: &str = "index";

/// Name of the synthesized symbol pseudo-column.
pub const SYMBOL_FIELD: &str = "SYMBOL";

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn is_text(&self) -> bool {
        matches!(self, Scalar::Text(_))
    }

    /// Numeric view; `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Text(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value as i64)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// Timestamp of a tick as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTime {
    /// Milliseconds since the Unix epoch, UTC.
    Millis(i64),
    /// Timezone-qualified instant.
    Zoned(DateTime<FixedOffset>),
    /// Wall-clock time without a timezone. Rejected on write.
    Naive(NaiveDateTime),
}

impl TickTime {
    /// UTC epoch milliseconds, or a validation error for naive timestamps.
    pub fn to_millis(&self) -> Result<i64> {
        match self {
            TickTime::Millis(ms) => Ok(*ms),
            TickTime::Zoned(dt) => Ok(dt.timestamp_millis()),
            TickTime::Naive(naive) => Err(Error::Validation(format!(
                "timestamp {naive} has no timezone"
            ))),
        }
    }

    pub fn is_naive(&self) -> bool {
        matches!(self, TickTime::Naive(_))
    }
}

impl From<i64> for TickTime {
    fn from(value: i64) -> Self {
        TickTime::Millis(value)
    }
}

impl From<NaiveDateTime> for TickTime {
    fn from(value: NaiveDateTime) -> Self {
        TickTime::Naive(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for TickTime {
    fn from(value: DateTime<Tz>) -> Self {
        TickTime::Zoned(value.fixed_offset())
    }
}

/// One timestamped record.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub timestamp: TickTime,
    pub fields: BTreeMap<String, Scalar>,
}

impl Tick {
    pub fn new(timestamp: impl Into<TickTime>) -> Self {
        Self {
            timestamp: timestamp.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.get(name)
    }

    /// Parse a tick from a JSON object.
    ///
    /// `index` may be an integer (epoch milliseconds) or an ISO-8601 string;
    /// strings without an offset become naive timestamps. `null` fields are
    /// treated as absent.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::Validation("tick must be a JSON object".to_string()))?;
        let index = object
            .get(INDEX_FIELD)
            .ok_or_else(|| Error::Validation("tick has no index field".to_string()))?;
        let timestamp = parse_json_time(index)?;

        let mut tick = Tick::new(timestamp);
        for (name, raw) in object {
            if name == INDEX_FIELD {
                continue;
            }
            let scalar = match raw {
                serde_json::Value::Null => continue,
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(v) => Scalar::Int(v),
                    None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
                },
                serde_json::Value::String(s) => Scalar::Text(s.clone()),
                other => {
                    return Err(Error::Validation(format!(
                        "field {name} has unsupported value {other}"
                    )))
                }
            };
            tick.fields.insert(name.clone(), scalar);
        }
        Ok(tick)
    }
}

fn parse_json_time(value: &serde_json::Value) -> Result<TickTime> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(TickTime::Millis)
            .ok_or_else(|| Error::Validation(format!("index {n} is not integer milliseconds"))),
        serde_json::Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(TickTime::Zoned(dt));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Ok(TickTime::Naive(naive));
                }
            }
            Err(Error::Validation(format!("unparseable index {s:?}")))
        }
        other => Err(Error::Validation(format!("unsupported index {other}"))),
    }
}

/// Convert UTC epoch milliseconds back into a timezone-qualified instant.
pub fn millis_to_datetime<Tz: TimeZone>(ms: i64, tz: &Tz) -> Option<DateTime<Tz>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.with_timezone(tz))
}
