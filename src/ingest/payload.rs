//! Agent payload types.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/series`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct SeriesPayload {
    #[serde(default, deserialize_with = "nullable")]
    pub series: Vec<Serie>,
}

/// One time series as sent by the agent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Serie {
    #[serde(rename = "metric", default)]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub points: Vec<Point>,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub host: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub device: String,
    #[serde(rename = "type", default)]
    pub kind: MetricType,
    #[serde(default, deserialize_with = "nullable")]
    pub interval: i64,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub source_type_name: String,
}

/// `[timestamp, value]`. Either member may be a number or a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub timestamp: f64,
    pub value: f64,
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let members = Vec::<MaybeString>::deserialize(deserializer)?;
        match members.as_slice() {
            [timestamp, value] => Ok(Point {
                timestamp: timestamp.0,
                value: value.0,
            }),
            other => Err(de::Error::custom(format!(
                "wrong number of fields in Point: {} != 2",
                other.len()
            ))),
        }
    }
}

/// A float that may arrive as a JSON string.
struct MaybeString(f64);

impl<'de> Deserialize<'de> for MaybeString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(MaybeString(n)),
            Raw::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(MaybeString)
                .map_err(|err| de::Error::custom(format!("string value should contain a scalar: {err}"))),
        }
    }
}

/// Metric type of a serie. Missing or empty means gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Gauge,
    Rate,
    Count,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Rate => "rate",
            MetricType::Count => "count",
        }
    }
}

impl<'de> Deserialize<'de> for MetricType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") | Some("gauge") => Ok(MetricType::Gauge),
            Some("rate") => Ok(MetricType::Rate),
            Some("count") => Ok(MetricType::Count),
            Some(other) => Err(de::Error::unknown_variant(other, &["gauge", "rate", "count"])),
        }
    }
}

/// Body of `POST /api/v1/check_run`.
pub type ServiceChecks = Vec<ServiceCheck>;

/// Result of one agent check.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct ServiceCheck {
    #[serde(rename = "check", default)]
    pub name: String,
    #[serde(rename = "host_name", default, deserialize_with = "nullable")]
    pub host: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub status: ServiceCheckStatus,
    #[serde(default, deserialize_with = "nullable")]
    pub message: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ServiceCheckStatus {
    #[default]
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl TryFrom<u8> for ServiceCheckStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Warning),
            2 => Ok(Self::Critical),
            3 => Ok(Self::Unknown),
            other => Err(format!("invalid value for a service check status: {other}")),
        }
    }
}

impl From<ServiceCheckStatus> for u8 {
    fn from(status: ServiceCheckStatus) -> Self {
        status as u8
    }
}

/// Body of `POST /intake/`. Only host tags are consumed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct IntakePayload {
    #[serde(rename = "internalHostname", default, deserialize_with = "nullable")]
    pub internal_hostname: String,
    #[serde(rename = "host-tags", default)]
    pub host_tags: Option<HostTags>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct HostTags {
    #[serde(default, deserialize_with = "nullable")]
    pub system: Vec<String>,
}

/// Treat an explicit `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_accept_numbers_and_strings() {
        let serie: Serie = serde_json::from_str(
            r#"{"metric":"system.load.1","points":[[1636629071,"0.5"],["1636629081",1.5]],"type":"rate","interval":10}"#,
        )
        .unwrap();
        assert_eq!(serie.points[0], Point { timestamp: 1636629071.0, value: 0.5 });
        assert_eq!(serie.points[1].timestamp, 1636629081.0);
        assert_eq!(serie.kind, MetricType::Rate);
        assert_eq!(serie.interval, 10);
    }

    #[test]
    fn test_point_with_wrong_arity_is_rejected() {
        let err = serde_json::from_str::<Point>("[1, 2, 3]").unwrap_err();
        assert!(err.to_string().contains("wrong number of fields"));
    }

    #[test]
    fn test_non_numeric_string_is_rejected() {
        assert!(serde_json::from_str::<Point>(r#"[1, "abc"]"#).is_err());
    }

    #[test]
    fn test_missing_and_null_fields_default() {
        let serie: Serie =
            serde_json::from_str(r#"{"metric":"m","tags":null,"type":"","host":null}"#).unwrap();
        assert!(serie.tags.is_empty());
        assert!(serie.host.is_empty());
        assert_eq!(serie.kind, MetricType::Gauge);
    }

    #[test]
    fn test_service_check_status_range() {
        let check: ServiceCheck =
            serde_json::from_str(r#"{"check":"ntp","status":2,"timestamp":10}"#).unwrap();
        assert_eq!(check.status, ServiceCheckStatus::Critical);
        assert!(serde_json::from_str::<ServiceCheck>(r#"{"check":"ntp","status":7}"#).is_err());
    }

    #[test]
    fn test_intake_host_tags_are_optional() {
        let with: IntakePayload = serde_json::from_str(
            r#"{"internalHostname":"web-1","host-tags":{"system":["env:prod"]}}"#,
        )
        .unwrap();
        assert_eq!(with.internal_hostname, "web-1");
        assert_eq!(with.host_tags.unwrap().system, vec!["env:prod"]);

        let without: IntakePayload =
            serde_json::from_str(r#"{"internalHostname":"web-1","apiKey":"x"}"#).unwrap();
        assert!(without.host_tags.is_none());
    }
}
