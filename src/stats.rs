//! Broker statistics scraped from the diagnostics service over a port-forward.

use indexmap::IndexMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::cluster::ClusterClient;
use crate::error::ClusterError;

pub const REPLICATION_CORRECTNESS: &str = "aio_mq_replication_correctness";
pub const MESSAGES_LOST: &str = "aio_mq_payload_check_total_messages_lost";

/* ============================= REDUCERS ============================= */

/// How samples of one metric combine across label sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Product,
    Max,
    Last,
}

impl Reducer {
    pub fn apply(&self, acc: f64, sample: f64) -> f64 {
        match self {
            Reducer::Sum => acc + sample,
            Reducer::Product => acc * sample,
            Reducer::Max => acc.max(sample),
            Reducer::Last => sample,
        }
    }
}

/// Per-metric reducer table. Unlisted metrics keep the last sample.
pub const REDUCERS: &[(&str, Reducer)] = &[
    ("aio_mq_publishes_received", Reducer::Sum),
    ("aio_mq_publishes_sent", Reducer::Sum),
    ("aio_mq_connected_sessions", Reducer::Sum),
    ("aio_mq_total_subscriptions", Reducer::Sum),
    ("aio_mq_store_retained_messages", Reducer::Sum),
    ("aio_mq_payload_check_total_messages_lost", Reducer::Sum),
    ("aio_mq_payload_check_total_messages_received", Reducer::Sum),
    ("aio_mq_replication_correctness", Reducer::Product),
    ("aio_mq_payload_check_latency_last_value", Reducer::Last),
];

pub fn reducer_for(metric: &str) -> Reducer {
    REDUCERS
        .iter()
        .find(|(name, _)| *name == metric)
        .map(|(_, r)| *r)
        .unwrap_or(Reducer::Last)
}

/* ============================= EXPOSITION PARSING ============================= */

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: IndexMap<String, String>,
    pub value: f64,
}

/// Parse the Prometheus text exposition format. Comments and malformed lines are skipped.
pub fn parse_exposition(text: &str) -> Vec<Sample> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Sample> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (series, rest) = match line.find('{') {
        Some(open) => {
            let close = line[open..].find('}')? + open;
            (&line[..=close], &line[close + 1..])
        }
        None => {
            let split = line.find(char::is_whitespace)?;
            (&line[..split], &line[split..])
        }
    };
    let value: f64 = rest.split_whitespace().next()?.parse().ok()?;

    let (name, labels) = match series.find('{') {
        Some(open) => (&series[..open], parse_labels(&series[open + 1..series.len() - 1])),
        None => (series, IndexMap::new()),
    };
    Some(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

fn parse_labels(raw: &str) -> IndexMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Merge samples per metric name using [`reducer_for`].
pub fn merge(samples: &[Sample]) -> IndexMap<String, f64> {
    let mut merged: IndexMap<String, f64> = IndexMap::new();
    for sample in samples {
        let reducer = reducer_for(&sample.name);
        merged
            .entry(sample.name.clone())
            .and_modify(|acc| *acc = reducer.apply(*acc, sample.value))
            .or_insert(sample.value);
    }
    merged
}

/* ============================= STATS ============================= */

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerStats {
    pub values: IndexMap<String, f64>,
}

impl BrokerStats {
    pub fn from_exposition(text: &str) -> Self {
        Self {
            values: merge(&parse_exposition(text)),
        }
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }

    /// Health thresholds over the scraped values. Metrics absent from the
    /// scrape produce no entry.
    pub fn thresholds(&self) -> Vec<Threshold> {
        let mut out = Vec::new();
        if let Some(c) = self.get(REPLICATION_CORRECTNESS) {
            out.push(Threshold {
                condition: format!("{REPLICATION_CORRECTNESS}==1"),
                value: c,
                met: c >= 1.0,
            });
        }
        if let Some(lost) = self.get(MESSAGES_LOST) {
            out.push(Threshold {
                condition: format!("{MESSAGES_LOST}==0"),
                value: lost,
                met: lost <= 0.0,
            });
        }
        out
    }
}

/// One threshold over a merged metric. An unmet threshold is a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub condition: String,
    pub value: f64,
    pub met: bool,
}

/* ============================= FETCH ============================= */

/// Scrape `/metrics` from `pod:port`.
pub async fn fetch_stats(
    client: &dyn ClusterClient,
    namespace: &str,
    pod: &str,
    port: u16,
) -> Result<BrokerStats, ClusterError> {
    let mut stream = client.port_forward(namespace, pod, port).await?;
    let request = format!("GET /metrics HTTP/1.0\r\nHost: localhost:{port}\r\nAccept: text/plain\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ClusterError::Connectivity(format!("port-forward write failed: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| ClusterError::Connectivity(format!("port-forward flush failed: {e}")))?;

    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .map_err(|e| ClusterError::Connectivity(format!("port-forward read failed: {e}")))?;
    let response = String::from_utf8_lossy(&raw);
    let body = split_http_body(&response)?;
    debug!(pod, bytes = body.len(), "broker_stats_fetched");
    Ok(BrokerStats::from_exposition(body))
}

fn split_http_body(response: &str) -> Result<&str, ClusterError> {
    let (head, body) = response
        .split_once("\r\n\r\n")
        .or_else(|| response.split_once("\n\n"))
        .ok_or_else(|| ClusterError::Decode("malformed metrics response".to_string()))?;
    let status_line = head.lines().next().unwrap_or("");
    let code = status_line.split_whitespace().nth(1).unwrap_or("");
    if code != "200" {
        return Err(ClusterError::Api {
            code: code.parse().unwrap_or(0),
            message: format!("metrics endpoint returned '{status_line}'"),
        });
    }
    Ok(body)
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSITION: &str = r#"
# HELP aio_mq_publishes_received Publishes received
# TYPE aio_mq_publishes_received counter
aio_mq_publishes_received{pod="frontend-0"} 10
aio_mq_publishes_received{pod="frontend-1"} 5
aio_mq_replication_correctness{chain="0"} 1
aio_mq_replication_correctness{chain="1"} 0.5
aio_mq_payload_check_latency_last_value 12
aio_mq_payload_check_latency_last_value 7
aio_mq_payload_check_total_messages_lost{a="x,y"} 0
malformed line here
"#;

    #[test]
    fn test_parse_skips_comments_and_garbage() {
        let samples = parse_exposition(EXPOSITION);
        assert_eq!(samples.len(), 7);
        assert_eq!(samples[0].labels.get("pod").map(String::as_str), Some("frontend-0"));
    }

    #[test]
    fn test_reducers_per_metric() {
        let stats = BrokerStats::from_exposition(EXPOSITION);
        assert_eq!(stats.get("aio_mq_publishes_received"), Some(15.0));
        assert_eq!(stats.get(REPLICATION_CORRECTNESS), Some(0.5));
        assert_eq!(stats.get("aio_mq_payload_check_latency_last_value"), Some(7.0));
    }

    #[test]
    fn test_unknown_metric_keeps_last() {
        assert_eq!(reducer_for("something_else"), Reducer::Last);
        let stats = BrokerStats::from_exposition("x 1\nx 3\n");
        assert_eq!(stats.get("x"), Some(3.0));
    }

    #[test]
    fn test_thresholds() {
        let stats = BrokerStats::from_exposition(EXPOSITION);
        let thresholds = stats.thresholds();
        assert_eq!(thresholds.len(), 2);
        assert_eq!(thresholds[0].condition, "aio_mq_replication_correctness==1");
        assert!(!thresholds[0].met);
        assert_eq!(thresholds[0].value, 0.5);
        assert!(thresholds[1].met);

        let lossy = BrokerStats::from_exposition("aio_mq_payload_check_total_messages_lost 3\n");
        let thresholds = lossy.thresholds();
        assert_eq!(thresholds.len(), 1);
        assert!(!thresholds[0].met);

        assert!(BrokerStats::from_exposition("x 1\n").thresholds().is_empty());
    }

    #[test]
    fn test_http_body_split() {
        let ok = "HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nx 1\n";
        assert_eq!(split_http_body(ok).unwrap(), "x 1\n");
        let missing = "HTTP/1.0 404 Not Found\r\n\r\n";
        assert!(matches!(split_http_body(missing), Err(ClusterError::Api { code: 404, .. })));
    }
}
