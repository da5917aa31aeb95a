// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Metric model: the tagged gauge/counter value, its wire record and the
//! per-kind merge rule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MetrixError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Last write wins.
    Gauge,
    /// Writes accumulate.
    Counter,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetrixError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetrixError::InvalidKind(other.to_string())),
        }
    }
}

/// A metric value, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parse a textual value: integer for counters, float for gauges.
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self> {
        match kind {
            MetricKind::Counter => raw
                .trim()
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|e| MetrixError::invalid_value(kind, format!("{raw:?}: {e}"))),
            MetricKind::Gauge => {
                let value = raw
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| MetrixError::invalid_value(kind, format!("{raw:?}: {e}")))?;
                finite_gauge(value).map(MetricValue::Gauge)
            }
        }
    }

    /// Merge an incoming write onto the stored value of the same metric.
    ///
    /// Gauges are replaced; counters add to the stored value, starting from
    /// zero when nothing is stored yet.
    pub fn merge_onto(self, current: Option<MetricValue>) -> Result<MetricValue> {
        match self {
            MetricValue::Gauge(_) => Ok(self),
            MetricValue::Counter(delta) => {
                let stored = match current {
                    Some(MetricValue::Counter(stored)) => stored,
                    _ => 0,
                };
                accumulate(stored, delta).map(MetricValue::Counter)
            }
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(d) => write!(f, "{d}"),
        }
    }
}

/// Checked counter accumulation.
pub fn accumulate(stored: i64, delta: i64) -> Result<i64> {
    stored.checked_add(delta).ok_or_else(|| {
        MetrixError::invalid_value(
            MetricKind::Counter,
            format!("{stored} + {delta} overflows a 64-bit counter"),
        )
    })
}

fn finite_gauge(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetrixError::invalid_value(
            MetricKind::Gauge,
            format!("{value} is not a finite number"),
        ))
    }
}

/// A validated metric: one id and exactly one typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// JSON wire shape: `{"id", "type", "delta"?, "value"?}`.
///
/// The type is kept as a string so that an unknown kind surfaces as
/// [`MetrixError::InvalidKind`] rather than a decoding failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRecord {
    /// A lookup record carrying only id and type.
    pub fn query(kind: MetricKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.as_str().to_string(),
            delta: None,
            value: None,
        }
    }

    pub fn metric_kind(&self) -> Result<MetricKind> {
        self.kind.parse()
    }

    /// Overwrite the value slot matching `value`'s kind, clearing the other.
    pub fn fill(&mut self, value: MetricValue) {
        match value {
            MetricValue::Gauge(v) => {
                self.value = Some(v);
                self.delta = None;
            }
            MetricValue::Counter(d) => {
                self.delta = Some(d);
                self.value = None;
            }
        }
    }
}

impl From<&Metric> for MetricRecord {
    fn from(metric: &Metric) -> Self {
        let mut record = MetricRecord::query(metric.kind(), metric.id.clone());
        record.fill(metric.value);
        record
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        MetricRecord::from(&metric)
    }
}

impl TryFrom<&MetricRecord> for Metric {
    type Error = MetrixError;

    fn try_from(record: &MetricRecord) -> Result<Self> {
        let kind = record.metric_kind()?;
        if record.id.is_empty() {
            return Err(MetrixError::invalid_value(kind, "empty metric id"));
        }
        let value = match kind {
            MetricKind::Counter => record
                .delta
                .map(MetricValue::Counter)
                .ok_or_else(|| MetrixError::invalid_value(kind, "missing delta"))?,
            MetricKind::Gauge => record
                .value
                .ok_or_else(|| MetrixError::invalid_value(kind, "missing value"))
                .and_then(finite_gauge)
                .map(MetricValue::Gauge)?,
        };
        Ok(Metric {
            id: record.id.clone(),
            value,
        })
    }
}

impl TryFrom<MetricRecord> for Metric {
    type Error = MetrixError;

    fn try_from(record: MetricRecord) -> Result<Self> {
        Metric::try_from(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_kind() {
        assert_eq!(
            MetricValue::parse(MetricKind::Counter, "5").unwrap(),
            MetricValue::Counter(5)
        );
        assert_eq!(
            MetricValue::parse(MetricKind::Gauge, "1.25").unwrap(),
            MetricValue::Gauge(1.25)
        );
        assert!(MetricValue::parse(MetricKind::Counter, "1.5").is_err());
        assert!(MetricValue::parse(MetricKind::Gauge, "abc").is_err());
        assert!(MetricValue::parse(MetricKind::Gauge, "NaN").is_err());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("gauge".parse::<MetricKind>().unwrap(), MetricKind::Gauge);
        assert!(matches!(
            "histogram".parse::<MetricKind>(),
            Err(MetrixError::InvalidKind(k)) if k == "histogram"
        ));
    }

    #[test]
    fn test_merge_rules() {
        let stored = Some(MetricValue::Counter(5));
        assert_eq!(
            MetricValue::Counter(3).merge_onto(stored).unwrap(),
            MetricValue::Counter(8)
        );
        assert_eq!(
            MetricValue::Counter(3).merge_onto(None).unwrap(),
            MetricValue::Counter(3)
        );
        assert_eq!(
            MetricValue::Gauge(2.0)
                .merge_onto(Some(MetricValue::Gauge(9.0)))
                .unwrap(),
            MetricValue::Gauge(2.0)
        );
        assert!(MetricValue::Counter(1)
            .merge_onto(Some(MetricValue::Counter(i64::MAX)))
            .is_err());
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_string(&MetricRecord::from(Metric::gauge("Alloc", 123.0))).unwrap();
        assert_eq!(json, r#"{"id":"Alloc","type":"gauge","value":123.0}"#);

        let record: MetricRecord =
            serde_json::from_str(r#"{"id":"PollCount","type":"counter","delta":7}"#).unwrap();
        assert_eq!(Metric::try_from(&record).unwrap(), Metric::counter("PollCount", 7));
    }

    #[test]
    fn test_record_validation() {
        let missing_delta = MetricRecord::query(MetricKind::Counter, "PollCount");
        assert!(matches!(
            Metric::try_from(&missing_delta),
            Err(MetrixError::InvalidValue { kind: MetricKind::Counter, .. })
        ));

        let bad_kind = MetricRecord {
            id: "x".into(),
            kind: "summary".into(),
            ..Default::default()
        };
        assert!(matches!(Metric::try_from(&bad_kind), Err(MetrixError::InvalidKind(_))));
    }

    #[test]
    fn test_fill_clears_other_slot() {
        let mut record = MetricRecord::query(MetricKind::Gauge, "Alloc");
        record.delta = Some(3);
        record.fill(MetricValue::Gauge(1.5));
        assert_eq!(record.value, Some(1.5));
        assert_eq!(record.delta, None);
    }
}
