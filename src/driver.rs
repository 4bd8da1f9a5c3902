//! # Driver
//!
//! Runs the probe attempts of one invocation and hands each observation to the [Emitter]

use super::emitter::Emitter;
use super::observation::Observation;
use super::random::RandomSource;
use super::transport::{Connection, Transport};
use super::Error;
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, error};

/// Upper bound on attempts per invocation
pub const MAX_ITERATIONS: usize = 20;

/// Host every attempt targets unless the invalid host is drawn
pub const DEFAULT_TARGET: &str = "httpbin.org";

/// Host that never resolves, drawn now and then to exercise the failure path
pub const INVALID_TARGET: &str = "inv@lid";

/// Identity of the invocation being served
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvocationContext {
    pub correlation_id: String,
    pub function_name: String,
    pub function_version: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ContextError {
    #[error("invocation context has no request id")]
    MissingCorrelationId,
}

impl InvocationContext {
    pub fn new(
        correlation_id: impl Into<String>,
        function_name: impl Into<String>,
        function_version: impl Into<String>,
    ) -> Result<Self, ContextError> {
        let correlation_id = correlation_id.into();
        if correlation_id.is_empty() {
            return Err(ContextError::MissingCorrelationId);
        }
        Ok(Self {
            correlation_id,
            function_name: function_name.into(),
            function_version: function_version.into(),
        })
    }
}

/// How many attempts an invocation makes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Iterations {
    /// Derived from the wall clock: `(now_ms % 20) + 1`
    #[default]
    Clock,
    /// Always the given count, clamped to `1..=20`
    Fixed(usize),
}

impl Iterations {
    pub fn count(self, now_ms: u64) -> usize {
        match self {
            Iterations::Clock => (now_ms % MAX_ITERATIONS as u64) as usize + 1,
            Iterations::Fixed(count) => count.clamp(1, MAX_ITERATIONS),
        }
    }
}

/// The request paths an attempt picks from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathTemplate {
    Uuid,
    Anything,
    Location,
    Status,
}

impl PathTemplate {
    pub const ALL: [PathTemplate; 4] = [
        PathTemplate::Uuid,
        PathTemplate::Anything,
        PathTemplate::Location,
        PathTemplate::Status,
    ];

    /// Request path, `city` is only used by [PathTemplate::Location]
    pub fn render(self, city: &str) -> String {
        match self {
            PathTemplate::Uuid => "/uuid".to_string(),
            PathTemplate::Anything => "/anything?a=b&c=d".to_string(),
            PathTemplate::Location => format!("/get?location={city}"),
            PathTemplate::Status => "/status/102,203,303,418,505".to_string(),
        }
    }
}

/// Hosts and query values attempts are drawn from
#[derive(Clone, Debug)]
pub struct Targets {
    pub valid: String,
    pub invalid: String,
    /// Relative weights of `valid` and `invalid`
    pub weights: [u32; 2],
    pub cities: Vec<String>,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            valid: DEFAULT_TARGET.to_string(),
            invalid: INVALID_TARGET.to_string(),
            weights: [98, 2],
            cities: vec!["Manchester".to_string(), "London".to_string()],
        }
    }
}

/// Observation driver
///
/// # Example
/// ```no_run
/// # async fn probe() -> Result<(), httpbin_emf_probe::Error> {
/// use httpbin_emf_probe::{observation, transport, Driver, EntropySource, InvocationContext};
///
/// let emitter = observation::probe_builder(observation::NAMESPACE).build()?;
/// let transport = transport::HttpsTransport::new(transport::DEFAULT_TIMEOUT)?;
/// let driver = Driver::new(transport, &emitter);
///
/// let context = InvocationContext::new("4bd2d365", "probe", "$LATEST")?;
/// driver.run(&context, &mut EntropySource::new(), &mut std::io::stdout()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Driver<'a, T> {
    transport: T,
    emitter: &'a Emitter,
    targets: Targets,
    iterations: Iterations,
}

impl<'a, T: Transport> Driver<'a, T> {
    pub fn new(transport: T, emitter: &'a Emitter) -> Self {
        Self {
            transport,
            emitter,
            targets: Targets::default(),
            iterations: Iterations::default(),
        }
    }

    pub fn with_targets(self, targets: Targets) -> Self {
        Self { targets, ..self }
    }

    pub fn with_iterations(self, iterations: Iterations) -> Self {
        Self { iterations, ..self }
    }

    pub fn emitter(&self) -> &Emitter {
        self.emitter
    }

    /// Draw the endpoint and request path of the next attempt
    pub fn plan<R: RandomSource + ?Sized>(&self, rng: &mut R) -> (String, String) {
        let endpoint = match rng.weighted(&self.targets.weights) {
            0 => &self.targets.valid,
            _ => &self.targets.invalid,
        };

        let template = PathTemplate::ALL
            .get(rng.index(PathTemplate::ALL.len()))
            .copied()
            .unwrap_or(PathTemplate::Uuid);

        let city = match template {
            PathTemplate::Location => self
                .targets
                .cities
                .get(rng.index(self.targets.cities.len()))
                .map(String::as_str)
                .unwrap_or_default(),
            _ => "",
        };

        (endpoint.clone(), template.render(city))
    }

    /// Make one attempt, failures end up in the observation rather than being returned
    pub async fn observe(&self, context: &InvocationContext, endpoint: String, path: String) -> Observation {
        let mut observation = Observation {
            endpoint,
            path,
            correlation_id: context.correlation_id.clone(),
            ..Default::default()
        };

        if let Err(e) = self.attempt(&mut observation).await {
            error!("Exception attempting to retrieve from {}: {e}", observation.endpoint);
            observation.success = 0;
            observation.error = 1;
            observation.status = 0;
            observation.message = e.to_string();
        }

        observation
    }

    async fn attempt(&self, observation: &mut Observation) -> Result<(), Error> {
        let start = Instant::now();
        let connection = self.transport.connect(&observation.endpoint).await?;
        observation.connection_latency_ms = elapsed_ms(start);
        debug!(
            "HTTPS connection to {} took {}ms",
            observation.endpoint, observation.connection_latency_ms
        );

        let start = Instant::now();
        let response = connection.get(&observation.path).await?;
        observation.response_latency_ms = elapsed_ms(start);
        debug!("Request/Response took {}ms", observation.response_latency_ms);

        observation.success = 1;
        observation.status = response.status;
        observation.message = response.reason;
        observation.data = decode_body(&response.body);

        if tracing::enabled!(tracing::Level::DEBUG) {
            for (key, value) in observation.data.iter().flatten() {
                debug!("k=[{key}]: v=[{value}]");
            }
        }

        Ok(())
    }

    /// Run every planned attempt of an invocation, writing one document per attempt to `sink`
    ///
    /// Returns the number of attempts made. Only a failure to build or write a document ends
    /// the loop early.
    pub async fn run<R, W>(&self, context: &InvocationContext, rng: &mut R, sink: &mut W) -> Result<usize, Error>
    where
        R: RandomSource + ?Sized,
        W: std::io::Write + ?Sized,
    {
        let count = self.iterations.count(now_ms());
        debug!("{} attempts planned for {}", count, context.correlation_id);

        for _ in 0..count {
            let (endpoint, path) = self.plan(rng);
            let observation = self.observe(context, endpoint, path).await;
            self.emitter.emit(observation.record(), &mut *sink)?;
        }

        Ok(count)
    }
}

/// Decode a response body into a JSON object, anything else yields None
pub fn decode_body(body: &[u8]) -> Option<Map<String, Value>> {
    serde_json::from_slice(body).ok()
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
