//! # EMF
//!
//! Helpers for serializing CloudWatch Embedded Metrics via serde_json, and for checking that
//! the `_aws` directive only names fields the document actually carries
//!
//! <https://docs.aws.amazon.com/AmazonCloudWatch/latest/monitoring/CloudWatch_Embedded_Metric_Format_Specification.html>

use metrics::SharedString;
use serde::{Serialize, Serializer};
use serde_json::value::Value;
use thiserror::Error;

/// Top level key reserved for the metadata block
pub const AWS_KEY: &str = "_aws";

/// A complete document: the flat fields of `T` followed by the `_aws` metadata block
#[derive(Debug, Serialize)]
pub struct EmbeddedMetrics<'a, T> {
    #[serde(flatten)]
    pub fields: T,
    #[serde(rename = "_aws")]
    pub aws: EmbeddedMetricsAws<'a>,
}

#[derive(Debug, Serialize)]
pub struct EmbeddedMetricsAws<'a> {
    #[serde(rename = "Timestamp")]
    pub timestamp: u64,
    // This crate never uses more than one directive in a metrics document
    #[serde(rename = "CloudWatchMetrics")]
    pub cloudwatch_metrics: [EmbeddedDirective<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct EmbeddedDirective<'a> {
    #[serde(rename = "Dimensions")]
    #[serde(serialize_with = "dimension_names")]
    pub dimensions: &'a [Vec<SharedString>],
    #[serde(rename = "Metrics")]
    pub metrics: &'a [EmbeddedMetric],
    #[serde(rename = "Namespace")]
    pub namespace: &'a str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmbeddedMetric {
    #[serde(rename = "Name")]
    #[serde(serialize_with = "shared_str")]
    pub name: SharedString,
    #[serde(rename = "Unit")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
}

// SharedString has no Serialize impl, write the names out as plain strings
fn shared_str<S: Serializer>(name: &SharedString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(name)
}

fn dimension_names<S: Serializer>(sets: &&[Vec<SharedString>], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(sets.iter().map(|set| set.iter().map(|name| &**name).collect::<Vec<&str>>()))
}

/// Ways a set of flat fields can disagree with the directive describing them
#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("metric fields must serialize to a JSON object")]
    NotAnObject,
    #[error("field name `_aws` is reserved for the metadata block")]
    ReservedField,
    #[error("dimension `{0}` is declared but not present")]
    MissingDimension(String),
    #[error("dimension `{0}` must be a string value")]
    DimensionNotString(String),
    #[error("metric `{0}` is declared but not present")]
    MissingMetric(String),
    #[error("metric `{0}` must be a number or an array of numbers")]
    MetricNotNumeric(String),
}

/// Check the flat fields (already converted to a [Value]) against a directive
pub fn validate(fields: &Value, directive: &EmbeddedDirective<'_>) -> Result<(), DocumentError> {
    let fields = fields.as_object().ok_or(DocumentError::NotAnObject)?;

    if fields.contains_key(AWS_KEY) {
        return Err(DocumentError::ReservedField);
    }

    for name in directive.dimensions.iter().flatten() {
        let name: &str = name;
        match fields.get(name) {
            Some(Value::String(_)) => {}
            Some(_) => return Err(DocumentError::DimensionNotString(name.to_string())),
            None => return Err(DocumentError::MissingDimension(name.to_string())),
        }
    }

    for metric in directive.metrics {
        match fields.get(&*metric.name) {
            Some(value) if is_numeric(value) => {}
            Some(_) => return Err(DocumentError::MetricNotNumeric(metric.name.to_string())),
            None => return Err(DocumentError::MissingMetric(metric.name.to_string())),
        }
    }

    Ok(())
}

// EMF accepts a single value or an array of up to 100 values per metric
fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::Array(values) => !values.is_empty() && values.iter().all(Value::is_number),
        _ => false,
    }
}

/// Convert a metrics::Unit into the cloudwatch string
///
/// <https://docs.aws.amazon.com/AmazonCloudWatch/latest/APIReference/API_MetricDatum.html>
pub fn unit_name(unit: metrics::Unit) -> &'static str {
    match unit {
        metrics::Unit::Count => "Count",
        metrics::Unit::Percent => "Percent",
        metrics::Unit::Seconds => "Seconds",
        metrics::Unit::Milliseconds => "Milliseconds",
        metrics::Unit::Microseconds => "Microseconds",
        metrics::Unit::Nanoseconds => "Nanoseconds",
        metrics::Unit::Tebibytes => "Terabytes",
        metrics::Unit::Gibibytes => "Gigabytes",
        metrics::Unit::Mebibytes => "Megabytes",
        metrics::Unit::Kibibytes => "Kilobytes",
        metrics::Unit::Bytes => "Bytes",
        metrics::Unit::TerabitsPerSecond => "Terabits/Second",
        metrics::Unit::GigabitsPerSecond => "Gigabits/Second",
        metrics::Unit::MegabitsPerSecond => "Megabits/Second",
        metrics::Unit::KilobitsPerSecond => "Kilobits/Second",
        metrics::Unit::BitsPerSecond => "Bits/Second",
        metrics::Unit::CountPerSecond => "Count/Second",
    }
}
