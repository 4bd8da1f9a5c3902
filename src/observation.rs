//! # Observation
//!
//! The facts gathered from one probe attempt and the flat embedded metrics fields built from them

use super::Builder;
use serde::Serialize;
use serde_json::{Map, Value};

/// Namespace the probe's metrics are published under unless configured otherwise
pub const NAMESPACE: &str = "Example/Namespace";

/// Outcome of a single request against an endpoint
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observation {
    pub endpoint: String,
    pub path: String,
    pub success: u8,
    pub error: u8,
    pub connection_latency_ms: u64,
    pub response_latency_ms: u64,
    pub status: u16,
    pub message: String,
    pub correlation_id: String,
    pub data: Option<Map<String, Value>>,
}

impl Observation {
    /// Borrow the observation as the flat fields of an embedded metrics document
    pub fn record(&self) -> ProbeRecord<'_> {
        ProbeRecord {
            endpoint: &self.endpoint,
            success: self.success,
            response_latency: self.response_latency_ms,
            correlation_id: &self.correlation_id,
            operation: operation(&self.path),
            full_path: &self.path,
            error: self.error,
            invocations: 1,
            connection_latency: self.connection_latency_ms,
            status: self.status,
            message: &self.message,
            data: self.data.as_ref(),
        }
    }
}

/// Dimensions, metrics and properties of one probe attempt, in emission order
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProbeRecord<'a> {
    pub endpoint: &'a str,
    pub success: u8,
    pub response_latency: u64,
    pub correlation_id: &'a str,
    pub operation: &'a str,
    pub full_path: &'a str,
    pub error: u8,
    pub invocations: u8,
    pub connection_latency: u64,
    pub status: u16,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a Map<String, Value>>,
}

/// First segment of a request path, ignoring any query string
///
/// `/status/102,203` is `status`, `/get?location=London` is `get`, and `/` is empty
pub fn operation(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.strip_prefix('/').unwrap_or(path);
    path.split('/').next().unwrap_or_default()
}

/// [Builder] preloaded with the probe's metric schema: rollups per endpoint and per
/// endpoint + operation, success/error/invocation counts and both latencies
pub fn probe_builder(namespace: impl Into<metrics::SharedString>) -> Builder {
    Builder::new()
        .cloudwatch_namespace(namespace)
        .with_dimensions(["Endpoint"])
        .with_dimensions(["Endpoint", "Operation"])
        .with_metric("Success", metrics::Unit::Count)
        .with_metric("Error", metrics::Unit::Count)
        .with_metric("Invocations", metrics::Unit::Count)
        .with_metric("ConnectionLatency", metrics::Unit::Milliseconds)
        .with_metric("ResponseLatency", metrics::Unit::Milliseconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn uuid_observation() -> Observation {
        let data = json!({"uuid": "3f1e6a52-8c5c-4a4b-9d0e-1f2a3b4c5d6e"});
        Observation {
            endpoint: "httpbin.org".into(),
            path: "/uuid".into(),
            success: 1,
            error: 0,
            connection_latency_ms: 41,
            response_latency_ms: 87,
            status: 200,
            message: "OK".into(),
            correlation_id: "4bd2d365-3792-46c8-9b6c-6132f9630fbb".into(),
            data: data.as_object().cloned(),
        }
    }

    #[test]
    fn operation_of_candidate_paths() {
        assert_eq!(operation("/uuid"), "uuid");
        assert_eq!(operation("/anything?a=b&c=d"), "anything");
        assert_eq!(operation("/get?location=Manchester"), "get");
        assert_eq!(operation("/status/102,203,303,418,505"), "status");
    }

    #[test]
    fn operation_degrades_on_odd_paths() {
        assert_eq!(operation("/"), "");
        assert_eq!(operation(""), "");
        assert_eq!(operation("/?a=b"), "");
        assert_eq!(operation("?a=b"), "");
        assert_eq!(operation("uuid"), "uuid");
        assert_eq!(operation("//double"), "");
    }

    #[test]
    fn successful_document() {
        let emitter = probe_builder(NAMESPACE).with_timestamp(1687947426188).build().unwrap();
        let observation = uuid_observation();

        let mut output = Vec::new();
        emitter.emit(observation.record(), &mut output).unwrap();

        assert_eq!(
            std::str::from_utf8(&output).unwrap(),
            r#"{"Endpoint":"httpbin.org","Success":1,"ResponseLatency":87,"CorrelationId":"4bd2d365-3792-46c8-9b6c-6132f9630fbb","Operation":"uuid","FullPath":"/uuid","Error":0,"Invocations":1,"ConnectionLatency":41,"Status":200,"Message":"OK","Data":{"uuid":"3f1e6a52-8c5c-4a4b-9d0e-1f2a3b4c5d6e"},"_aws":{"Timestamp":1687947426188,"CloudWatchMetrics":[{"Dimensions":[["Endpoint"],["Endpoint","Operation"]],"Metrics":[{"Name":"Success","Unit":"Count"},{"Name":"Error","Unit":"Count"},{"Name":"Invocations","Unit":"Count"},{"Name":"ConnectionLatency","Unit":"Milliseconds"},{"Name":"ResponseLatency","Unit":"Milliseconds"}],"Namespace":"Example/Namespace"}]}}
"#
        );
    }

    #[test]
    fn data_is_absent_not_null() {
        let emitter = probe_builder(NAMESPACE).build().unwrap();
        let observation = Observation {
            data: None,
            ..uuid_observation()
        };

        let document = serde_json::to_value(emitter.document(observation.record()).unwrap()).unwrap();
        assert!(document.get("Data").is_none());
        assert_eq!(document["Invocations"], 1);
    }

    #[test]
    fn same_observation_same_bytes() {
        let emitter = probe_builder(NAMESPACE).build().unwrap();
        let observation = uuid_observation();

        let first = serde_json::to_string(&emitter.document_at(observation.record(), 1).unwrap()).unwrap();
        let second = serde_json::to_string(&emitter.document_at(observation.record(), 1).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
