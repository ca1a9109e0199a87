//! Translation of agent payloads into label-set time series.
//!
//! # Rules
//! - Tags become labels; host tags stored by the intake endpoint are merged in
//! - `host` and `device` fields become labels unless a tag already set them
//! - Every series carries the metric name and the agent metric type
//! - Rates are multiplied by their interval when it is positive
//! - Timestamps go from seconds to milliseconds; samples are sorted by time

use std::collections::HashMap;

use tower::BoxError;

use crate::http::RequestContext;
use crate::ingest::host_tags::HostTagStore;
use crate::ingest::labels::{
    all_host_tags_label, dd_type_label, metric_to_label_value, parse_all_host_tags, Label,
    LabelSet, METRIC_NAME_LABEL,
};
use crate::ingest::payload::{MetricType, Point, Serie, ServiceCheck};

const HOST_LABEL: &str = "host";
const DEVICE_LABEL: &str = "device";
const SERVICE_CHECK_TYPE: &str = "service_check";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub labels: Vec<Label>,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricMetadata {
    pub family: String,
    pub kind: MetricType,
}

/// A batch handed to the remote writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteRequest {
    pub timeseries: Vec<TimeSeries>,
    pub metadata: Vec<MetricMetadata>,
}

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("serie name should not be empty")]
    EmptySerieName,
    #[error("check name should not be empty")]
    EmptyCheckName,
    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
    #[error("can't get host tags for {host:?}: {source}")]
    HostTags {
        host: String,
        #[source]
        source: BoxError,
    },
}

/// Host tag lookups memoized for one request.
struct HostTagCache<'a> {
    store: &'a dyn HostTagStore,
    hosts: HashMap<String, Vec<String>>,
}

impl<'a> HostTagCache<'a> {
    fn new(store: &'a dyn HostTagStore) -> Self {
        Self {
            store,
            hosts: HashMap::new(),
        }
    }

    async fn tags(&mut self, ctx: &RequestContext, host: &str) -> Result<&[String], TranslateError> {
        if !self.hosts.contains_key(host) {
            let entry = self
                .store
                .get(ctx, host)
                .await
                .map_err(|source| TranslateError::HostTags {
                    host: host.to_owned(),
                    source,
                })?;
            let name = all_host_tags_label();
            let tags = entry
                .and_then(|entry| entry.labels.into_iter().find(|l| l.name == name))
                .map(|label| parse_all_host_tags(&label.value))
                .unwrap_or_default();
            self.hosts.insert(host.to_owned(), tags);
        }
        Ok(self.hosts.get(host).map(Vec::as_slice).unwrap_or_default())
    }
}

fn finish_labels(labels: LabelSet, name: &str, kind: &str) -> Vec<Label> {
    let mut labels = labels.into_labels();
    labels.push(Label::new(METRIC_NAME_LABEL, metric_to_label_value(name)));
    labels.push(Label::new(dd_type_label(), kind));
    labels
}

/// Translate series into a write request.
pub async fn translate_series(
    ctx: &RequestContext,
    series: &[Serie],
    store: &dyn HostTagStore,
) -> Result<WriteRequest, TranslateError> {
    let mut cache = HostTagCache::new(store);
    let mut request = WriteRequest {
        timeseries: Vec::with_capacity(series.len()),
        metadata: Vec::with_capacity(series.len()),
    };

    for serie in series {
        if serie.name.is_empty() {
            return Err(TranslateError::EmptySerieName);
        }

        let mut labels = LabelSet::from_tags(serie.tags.iter().map(String::as_str).filter(|t| !t.is_empty()));
        for tag in cache.tags(ctx, &serie.host).await? {
            labels.add_tag(tag);
        }
        if !serie.host.is_empty() {
            labels.set_if_absent(HOST_LABEL, &serie.host);
        }
        if !serie.device.is_empty() {
            labels.set_if_absent(DEVICE_LABEL, &serie.device);
        }

        request.timeseries.push(TimeSeries {
            labels: finish_labels(labels, &serie.name, serie.kind.as_str()),
            samples: samples(&serie.points, serie.kind, serie.interval)?,
        });
        request.metadata.push(MetricMetadata {
            family: metric_to_label_value(&serie.name),
            kind: MetricType::Gauge,
        });
    }

    Ok(request)
}

/// Seconds to milliseconds. Timestamps come from clients, so overflow is an
/// input error.
fn timestamp_ms(seconds: i64) -> Result<i64, TranslateError> {
    seconds
        .checked_mul(1000)
        .ok_or(TranslateError::TimestampOutOfRange(seconds))
}

fn samples(points: &[Point], kind: MetricType, interval: i64) -> Result<Vec<Sample>, TranslateError> {
    let mut samples = points
        .iter()
        .map(|point| {
            // Non-positive intervals store the raw value.
            let value = if kind == MetricType::Rate && interval > 0 {
                point.value * interval as f64
            } else {
                point.value
            };
            Ok(Sample {
                timestamp_ms: timestamp_ms(point.timestamp as i64)?,
                value,
            })
        })
        .collect::<Result<Vec<_>, TranslateError>>()?;
    samples.sort_by_key(|s| s.timestamp_ms);
    Ok(samples)
}

/// Translate check results into one single-sample series each, valued with
/// the check status.
pub async fn translate_checks(
    ctx: &RequestContext,
    checks: &[ServiceCheck],
    store: &dyn HostTagStore,
) -> Result<WriteRequest, TranslateError> {
    let mut cache = HostTagCache::new(store);
    let mut request = WriteRequest::default();

    for check in checks {
        if check.name.is_empty() {
            return Err(TranslateError::EmptyCheckName);
        }

        let mut labels = LabelSet::from_tags(check.tags.iter().map(String::as_str));
        for tag in cache.tags(ctx, &check.host).await? {
            labels.add_tag(tag);
        }
        if !check.host.is_empty() {
            labels.set_if_absent(HOST_LABEL, &check.host);
        }

        request.timeseries.push(TimeSeries {
            labels: finish_labels(labels, &check.name, SERVICE_CHECK_TYPE),
            samples: vec![Sample {
                timestamp_ms: timestamp_ms(check.timestamp)?,
                value: f64::from(u8::from(check.status)),
            }],
        });
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::host_tags::InMemoryHostTagStore;
    use crate::ingest::labels::all_host_tags;
    use crate::ingest::payload::ServiceCheckStatus;

    fn serie(name: &str) -> Serie {
        Serie {
            name: name.to_owned(),
            ..Serie::default()
        }
    }

    #[tokio::test]
    async fn test_serie_labels() {
        let store = InMemoryHostTagStore::new();
        let ctx = RequestContext::new();
        let input = Serie {
            tags: vec!["env:prod".into(), "".into(), "canary".into()],
            host: "web-1".into(),
            device: "sda".into(),
            ..serie("system.disk.free")
        };

        let request = translate_series(&ctx, &[input], &store).await.unwrap();
        let ts = &request.timeseries[0];
        assert_eq!(ts.label("__name__"), Some("system_dot_disk_dot_free"));
        assert_eq!(ts.label("_dot_internal_dot_dd__type"), Some("gauge"));
        assert_eq!(ts.label("env"), Some("'prod'"));
        assert_eq!(ts.label("_dot_unnamed_dot_canary"), Some("'canary'"));
        assert_eq!(ts.label("host"), Some("'web-1'"));
        assert_eq!(ts.label("device"), Some("'sda'"));
        assert_eq!(request.metadata[0].family, "system_dot_disk_dot_free");
    }

    #[tokio::test]
    async fn test_rate_samples_are_scaled_and_sorted() {
        let store = InMemoryHostTagStore::new();
        let input = Serie {
            kind: MetricType::Rate,
            interval: 10,
            points: vec![
                Point { timestamp: 20.0, value: 2.0 },
                Point { timestamp: 10.0, value: 1.5 },
            ],
            ..serie("requests")
        };

        let request = translate_series(&RequestContext::new(), &[input], &store)
            .await
            .unwrap();
        assert_eq!(
            request.timeseries[0].samples,
            vec![
                Sample { timestamp_ms: 10_000, value: 15.0 },
                Sample { timestamp_ms: 20_000, value: 20.0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_negative_interval_keeps_raw_value() {
        let store = InMemoryHostTagStore::new();
        let input = Serie {
            kind: MetricType::Rate,
            interval: -5,
            points: vec![Point { timestamp: 1.0, value: 3.0 }],
            ..serie("requests")
        };

        let request = translate_series(&RequestContext::new(), &[input], &store)
            .await
            .unwrap();
        assert_eq!(request.timeseries[0].samples[0].value, 3.0);
    }

    #[tokio::test]
    async fn test_host_tags_are_merged() {
        let store = InMemoryHostTagStore::new();
        let ctx = RequestContext::new();
        store
            .set(&ctx, "web-1", vec![all_host_tags(&["env:prod".into(), "team:core".into()])])
            .await
            .unwrap();

        let input = Serie {
            host: "web-1".into(),
            tags: vec!["env:dev".into()],
            ..serie("cpu")
        };
        let request = translate_series(&ctx, &[input], &store).await.unwrap();
        let ts = &request.timeseries[0];
        assert_eq!(ts.label("env"), Some("'dev','prod'"));
        assert_eq!(ts.label("team"), Some("'core'"));
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let store = InMemoryHostTagStore::new();
        let err = translate_series(&RequestContext::new(), &[serie("")], &store)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::EmptySerieName));
    }

    #[tokio::test]
    async fn test_check_run_series() {
        let store = InMemoryHostTagStore::new();
        let check = ServiceCheck {
            name: "ntp.in_sync".into(),
            host: "web-1".into(),
            timestamp: 100,
            status: ServiceCheckStatus::Critical,
            ..ServiceCheck::default()
        };

        let request = translate_checks(&RequestContext::new(), &[check], &store)
            .await
            .unwrap();
        let ts = &request.timeseries[0];
        assert_eq!(ts.label("__name__"), Some("ntp_dot_in__sync"));
        assert_eq!(ts.label("_dot_internal_dot_dd__type"), Some("service_check"));
        assert_eq!(ts.samples, vec![Sample { timestamp_ms: 100_000, value: 2.0 }]);
    }

    #[tokio::test]
    async fn test_overflowing_timestamps_are_rejected() {
        let store = InMemoryHostTagStore::new();
        let ctx = RequestContext::new();

        let check = ServiceCheck {
            name: "ntp".into(),
            timestamp: i64::MAX / 10,
            ..ServiceCheck::default()
        };
        let err = translate_checks(&ctx, &[check], &store).await.unwrap_err();
        assert!(matches!(err, TranslateError::TimestampOutOfRange(_)));

        let input = Serie {
            points: vec![Point { timestamp: 1e300, value: 1.0 }],
            ..serie("cpu")
        };
        let err = translate_series(&ctx, &[input], &store).await.unwrap_err();
        assert!(matches!(err, TranslateError::TimestampOutOfRange(_)));
    }
}
