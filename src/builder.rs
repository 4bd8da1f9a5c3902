use super::{emf, emitter, Error};
use metrics::SharedString;

/// The Embedded Metric Format supports a maximum of 30 dimensions per dimension set
pub const MAX_DIMENSIONS: usize = 30;

/// The Embedded Metric Format supports a maximum of 100 metrics per directive
pub const MAX_METRICS: usize = 100;

/// Builder for the Embedded Cloudwatch Metrics Emitter
///
/// # Example
/// ```
///  let emitter = httpbin_emf_probe::Builder::new()
///      .cloudwatch_namespace("MyApplication")
///      .with_dimensions(["Endpoint"])
///      .with_metric("Success", metrics::Unit::Count)
///      .build()
///      .unwrap();
/// ```
#[derive(Default)]
pub struct Builder {
    cloudwatch_namespace: Option<SharedString>,
    dimension_sets: Vec<Vec<SharedString>>,
    metrics: Vec<emf::EmbeddedMetric>,
    timestamp: Option<u64>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the CloudWatch namespace for all metrics
    /// * Must be set or build() will return Err("cloudwatch_namespace missing")
    pub fn cloudwatch_namespace(self, namespace: impl Into<SharedString>) -> Self {
        Self {
            cloudwatch_namespace: Some(namespace.into()),
            ..self
        }
    }

    /// Adds a dimension set, CloudWatch aggregates every metric once per set
    /// * This method can be called multiple times, each call declares a separate rollup
    /// * A set may not be empty or hold more than 30 names
    pub fn with_dimensions<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<SharedString>,
    {
        self.dimension_sets.push(names.into_iter().map(Into::into).collect());
        self
    }

    /// Declares a metric and the unit CloudWatch should record it with
    pub fn with_metric(mut self, name: impl Into<SharedString>, unit: metrics::Unit) -> Self {
        self.metrics.push(emf::EmbeddedMetric {
            name: name.into(),
            unit: Some(emf::unit_name(unit)),
        });
        self
    }

    /// Declares a metric without a unit
    pub fn with_unitless_metric(mut self, name: impl Into<SharedString>) -> Self {
        self.metrics.push(emf::EmbeddedMetric {
            name: name.into(),
            unit: None,
        });
        self
    }

    /// Stamp every document with a fixed timestamp instead of the current time
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Private helper for consuming the builder into emitter configuration
    fn config(self) -> Result<emitter::Config, Error> {
        let cloudwatch_namespace = self.cloudwatch_namespace.ok_or("cloudwatch_namespace missing")?;
        if cloudwatch_namespace.is_empty() {
            return Err("cloudwatch_namespace is empty".into());
        }

        for set in &self.dimension_sets {
            if set.is_empty() {
                return Err("dimension sets may not be empty".into());
            }
            if set.len() > MAX_DIMENSIONS {
                return Err(format!("dimension set has more than {MAX_DIMENSIONS} dimensions").into());
            }
        }

        if self.metrics.len() > MAX_METRICS {
            return Err(format!("more than {MAX_METRICS} metrics declared").into());
        }

        for (index, metric) in self.metrics.iter().enumerate() {
            if self.metrics[..index].iter().any(|m| m.name == metric.name) {
                return Err(format!("metric {} declared twice", metric.name).into());
            }
            if self.dimension_sets.iter().flatten().any(|d| *d == metric.name) {
                return Err(format!("{} declared as both a dimension and a metric", metric.name).into());
            }
        }

        Ok(emitter::Config {
            cloudwatch_namespace,
            dimension_sets: self.dimension_sets,
            metrics: self.metrics,
            timestamp: self.timestamp,
        })
    }

    /// Construct the emitter
    pub fn build(self) -> Result<emitter::Emitter, Error> {
        Ok(emitter::Emitter::new(self.config()?))
    }

    /// Construct the emitter and leak it so it can be shared by every invocation
    pub fn init(self) -> Result<&'static emitter::Emitter, Error> {
        Ok(Box::leak(Box::new(self.build()?)))
    }
}
