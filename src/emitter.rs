//! # Emitter
//!
//! Embedded metrics document constructor + writer returned from httpbin_emf_probe::Builder

use super::{emf, Error};
use metrics::SharedString;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Configuration via Builder
pub struct Config {
    pub cloudwatch_namespace: SharedString,
    pub dimension_sets: Vec<Vec<SharedString>>,
    pub metrics: Vec<emf::EmbeddedMetric>,
    pub timestamp: Option<u64>,
}

/// Embedded CloudWatch Metrics document constructor + writer
///
/// Use [Builder](super::Builder) to construct
///
/// # Example
/// ```
/// #[derive(serde::Serialize)]
/// struct Fields {
///     #[serde(rename = "Endpoint")]
///     endpoint: &'static str,
///     #[serde(rename = "Success")]
///     success: u8,
/// }
///
/// let emitter = httpbin_emf_probe::Builder::new()
///      .cloudwatch_namespace("MyApplication")
///      .with_dimensions(["Endpoint"])
///      .with_metric("Success", metrics::Unit::Count)
///      .build()
///      .unwrap();
///
/// emitter
///     .emit(&Fields { endpoint: "httpbin.org", success: 1 }, std::io::stdout())
///     .unwrap();
/// ```
pub struct Emitter {
    config: Config,
}

impl Emitter {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn namespace(&self) -> &str {
        &self.config.cloudwatch_namespace
    }

    /// Compute the timestamp unless it was set via [Builder::with_timestamp](super::Builder::with_timestamp)
    pub fn timestamp(&self) -> u64 {
        match self.config.timestamp {
            Some(t) => t,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis() as u64)
                .unwrap_or_default(),
        }
    }

    fn directive(&self) -> emf::EmbeddedDirective<'_> {
        emf::EmbeddedDirective {
            dimensions: &self.config.dimension_sets,
            metrics: &self.config.metrics,
            namespace: &self.config.cloudwatch_namespace,
        }
    }

    /// Wrap `fields` in a metadata block stamped with the current time
    ///
    /// Fails when a declared dimension or metric is missing from `fields` or has the wrong type
    pub fn document<T: Serialize>(&self, fields: T) -> Result<emf::EmbeddedMetrics<'_, T>, Error> {
        self.document_at(fields, self.timestamp())
    }

    /// Same as [Emitter::document] with an explicit timestamp
    pub fn document_at<T: Serialize>(&self, fields: T, timestamp: u64) -> Result<emf::EmbeddedMetrics<'_, T>, Error> {
        let directive = self.directive();
        emf::validate(&serde_json::to_value(&fields)?, &directive)?;

        Ok(emf::EmbeddedMetrics {
            fields,
            aws: emf::EmbeddedMetricsAws {
                timestamp,
                cloudwatch_metrics: [directive],
            },
        })
    }

    /// Write a single document as one line to an implementation of std::io::Write
    /// * The whole line goes out in a single write_all
    pub fn emit<T: Serialize>(&self, fields: T, mut writer: impl std::io::Write) -> Result<(), Error> {
        let document = self.document(fields)?;
        let mut line = serde_json::to_vec(&document)?;
        line.push(b'\n');
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;
    use serde_json::{json, Value};

    #[derive(Serialize)]
    struct Request<'a> {
        #[serde(rename = "Endpoint")]
        endpoint: &'a str,
        #[serde(rename = "RequestId")]
        request_id: &'a str,
        #[serde(rename = "Latency")]
        latency: u64,
    }

    fn emitter() -> Emitter {
        Builder::new()
            .cloudwatch_namespace("namespace")
            .with_dimensions(["Endpoint"])
            .with_metric("Latency", metrics::Unit::Milliseconds)
            .with_timestamp(1687657545423)
            .build()
            .unwrap()
    }

    #[test]
    fn emits_one_line() {
        let request = Request {
            endpoint: "10.172.207.225",
            request_id: "ABC123",
            latency: 12,
        };

        let mut output = Vec::new();
        emitter().emit(&request, &mut output).unwrap();
        let output_str = std::str::from_utf8(&output).unwrap();
        assert_eq!(
            output_str,
            r#"{"Endpoint":"10.172.207.225","RequestId":"ABC123","Latency":12,"_aws":{"Timestamp":1687657545423,"CloudWatchMetrics":[{"Dimensions":[["Endpoint"]],"Metrics":[{"Name":"Latency","Unit":"Milliseconds"}],"Namespace":"namespace"}]}}
"#
        );
    }

    #[test]
    fn rejects_fields_missing_from_the_directive() {
        let err = emitter()
            .document(json!({"Endpoint": "10.172.207.225"}))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "metric `Latency` is declared but not present");

        let mut output = Vec::new();
        assert!(emitter().emit(json!({"Latency": 3}), &mut output).is_err());
        assert!(output.is_empty());
    }

    #[test]
    fn live_timestamp_is_recent() {
        let emitter = Builder::new().cloudwatch_namespace("namespace").build().unwrap();
        let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64;
        let document = emitter.document(json!({})).unwrap();
        let value: Value = serde_json::to_value(&document).unwrap();
        assert!(value["_aws"]["Timestamp"].as_u64().unwrap() >= before);
    }
}
