// Metric domain models
use crate::domain::error::MonitorError;
use crate::domain::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Luminosity,
    Temperature,
    Humidity,
}

impl Metric {
    /// Every metric, in the order cycles fetch and report them.
    pub const ALL: [Metric; 3] = [Metric::Luminosity, Metric::Temperature, Metric::Humidity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Luminosity => "luminosity",
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the upstream `values` array, still in its textual form.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub index: usize,
    pub value: String,
    pub recv_time: String,
}

impl RawSample {
    pub fn new(index: usize, value: impl Into<String>, recv_time: impl Into<String>) -> Self {
        Self {
            index,
            value: value.into(),
            recv_time: recv_time.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Metric,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl Sample {
    pub fn new(metric: Metric, value: f64, observed_at: DateTime<Utc>, received_at: DateTime<Utc>) -> Self {
        Self {
            metric,
            value,
            observed_at,
            received_at,
        }
    }

    /// Coerce a raw upstream entry into a typed sample.
    pub fn from_raw(metric: Metric, raw: &RawSample, received_at: DateTime<Utc>) -> Result<Self, MonitorError> {
        let value = raw
            .value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| MonitorError::MalformedResponse {
                path: format!("values[{}].attrValue", raw.index),
                reason: format!("expected a finite number, got {:?}", raw.value),
            })?;
        let observed_at = timestamp::parse(&raw.recv_time)?;

        Ok(Self::new(metric, value, observed_at, received_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_parses_value_and_time() {
        let now = Utc::now();
        let raw = RawSample::new(0, "21.5", "2024-03-01T10:15:30.123Z");
        let sample = Sample::from_raw(Metric::Temperature, &raw, now).unwrap();

        assert_eq!(sample.metric, Metric::Temperature);
        assert_eq!(sample.value, 21.5);
        assert_eq!(sample.observed_at, timestamp::parse("2024-03-01 10:15:30.123").unwrap());
        assert_eq!(sample.received_at, now);
    }

    #[test]
    fn test_from_raw_rejects_non_numeric_value() {
        let raw = RawSample::new(3, "warm", "2024-03-01T10:15:30Z");
        match Sample::from_raw(Metric::Temperature, &raw, Utc::now()) {
            Err(MonitorError::MalformedResponse { path, .. }) => assert_eq!(path, "values[3].attrValue"),
            other => panic!("expected malformed response, got {:?}", other),
        }
    }

    #[test]
    fn test_from_raw_rejects_non_finite_value() {
        let raw = RawSample::new(0, "NaN", "2024-03-01T10:15:30Z");
        assert!(matches!(
            Sample::from_raw(Metric::Humidity, &raw, Utc::now()),
            Err(MonitorError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_from_raw_rejects_bad_timestamp() {
        let raw = RawSample::new(0, "12", "yesterday");
        assert!(matches!(
            Sample::from_raw(Metric::Luminosity, &raw, Utc::now()),
            Err(MonitorError::TimestampFormat { .. })
        ));
    }
}
