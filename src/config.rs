//! Runtime configuration read from the function's environment variables

use super::driver::{Iterations, DEFAULT_TARGET};
use super::observation::NAMESPACE;
use super::transport::DEFAULT_TIMEOUT;
use super::Error;
use std::time::Duration;

/// Settings the function reads once at start up
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeConfig {
    /// Host probed on every attempt, `PROBE_TARGET`
    pub target: String,
    /// CloudWatch namespace, `PROBE_NAMESPACE`
    pub namespace: String,
    /// Connect and request timeout, `PROBE_TIMEOUT_MS`
    pub timeout: Duration,
    /// Attempts per invocation, `PROBE_ITERATIONS`, derived from the clock when unset
    pub iterations: Iterations,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            namespace: NAMESPACE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            iterations: Iterations::Clock,
        }
    }
}

impl ProbeConfig {
    /// Read the configuration from the process environment
    pub fn load() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, unset or empty variables keep their default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(target) = lookup("PROBE_TARGET") {
            config.target = target;
        }
        if let Some(namespace) = lookup("PROBE_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(timeout) = lookup("PROBE_TIMEOUT_MS") {
            let millis: u64 = timeout
                .trim()
                .parse()
                .map_err(|e| format!("PROBE_TIMEOUT_MS={timeout}: {e}"))?;
            config.timeout = Duration::from_millis(millis);
        }
        if let Some(iterations) = lookup("PROBE_ITERATIONS") {
            let count: usize = iterations
                .trim()
                .parse()
                .map_err(|e| format!("PROBE_ITERATIONS={iterations}: {e}"))?;
            config.iterations = Iterations::Fixed(count);
        }

        Ok(config)
    }
}
