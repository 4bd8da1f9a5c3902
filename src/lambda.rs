//! Integration with [lambda_runtime]
//!
//! *this module requires the `lambda` feature flag*
//!
//! # Example
//! ```no_run
//! use httpbin_emf_probe::{lambda, observation, transport, Driver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     tracing_subscriber::fmt()
//!         .json()
//!         .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
//!         .with_target(false)
//!         .with_current_span(false)
//!         .without_time()
//!         .init();
//!
//!     let emitter = observation::probe_builder(observation::NAMESPACE).init()?;
//!     let transport = transport::HttpsTransport::new(transport::DEFAULT_TIMEOUT)?;
//!     let driver = Box::leak(Box::new(Driver::new(transport, emitter)));
//!
//!     lambda::run(driver).await
//! }
//! ```
//!
//! # Output
//!
//! ```plaintext
//! START RequestId: 4bd2d365-3792-46c8-9b6c-6132f9630fbb Version: $LATEST
//! {"level":"INFO","fields":{"message":"bootstrap ($LATEST) with event: {}"}}
//! {"Endpoint":"httpbin.org","Success":1,"ResponseLatency":87,"CorrelationId":"4bd2d365-3792-46c8-9b6c-6132f9630fbb","Operation":"uuid","FullPath":"/uuid","Error":0,"Invocations":1,"ConnectionLatency":41,"Status":200,"Message":"OK","Data":{"uuid":"3f1e6a52-8c5c-4a4b-9d0e-1f2a3b4c5d6e"},"_aws":{...}}
//! END RequestId: 4bd2d365-3792-46c8-9b6c-6132f9630fbb
//! ```
//!
//! If you're building a more sophisticated [tower] stack, compose [ProbeService] and
//! [InvocationService] yourself

use super::driver::{ContextError, Driver, InvocationContext};
use super::random::EntropySource;
use super::transport::Transport;
use futures::future::{BoxFuture, FutureExt};
use lambda_runtime::LambdaEvent;
use pin_project::pin_project;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant;
use tracing::{error, info, info_span, Span};

impl TryFrom<&lambda_runtime::Context> for InvocationContext {
    type Error = ContextError;

    fn try_from(context: &lambda_runtime::Context) -> Result<Self, Self::Error> {
        InvocationContext::new(
            context.request_id.clone(),
            context.env_config.function_name.clone(),
            context.env_config.version.clone(),
        )
    }
}

/// [tower::Service] running every probe attempt of an invocation through a [Driver]
///
/// Documents go to the sink returned by `sink`, stdout unless built with [ProbeService::with_sink]
pub struct ProbeService<T: 'static, W = std::io::Stdout> {
    driver: &'static Driver<'static, T>,
    sink: fn() -> W,
}

impl<T: Transport + 'static> ProbeService<T> {
    pub fn new(driver: &'static Driver<'static, T>) -> Self {
        Self {
            driver,
            sink: std::io::stdout,
        }
    }
}

impl<T: Transport + 'static, W> ProbeService<T, W> {
    pub fn with_sink(driver: &'static Driver<'static, T>, sink: fn() -> W) -> Self {
        Self { driver, sink }
    }
}

impl<T, W> tower::Service<LambdaEvent<Value>> for ProbeService<T, W>
where
    T: Transport + 'static,
    W: std::io::Write + Send + 'static,
{
    type Response = ();
    type Error = lambda_runtime::Error;
    type Future = BoxFuture<'static, Result<(), lambda_runtime::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: LambdaEvent<Value>) -> Self::Future {
        let driver = self.driver;
        let mut sink = (self.sink)();

        async move {
            let context = InvocationContext::try_from(&event.context)?;
            info!(
                "{} ({}) with event: {}",
                context.function_name, context.function_version, event.payload
            );

            let mut rng = EntropySource::new();
            driver.run(&context, &mut rng, &mut sink).await?;
            Ok::<_, lambda_runtime::Error>(())
        }
        .boxed()
    }
}

/// [tower::Service] wrapping each invocation of the inner service in a span carrying the
/// request id, and logging how the invocation ended
pub struct InvocationService<S> {
    inner: S,
}

impl<S> InvocationService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S, Request> tower::Service<LambdaEvent<Request>> for InvocationService<S>
where
    S: tower::Service<LambdaEvent<Request>>,
    S::Error: std::fmt::Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = InvocationFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: LambdaEvent<Request>) -> Self::Future {
        let span = info_span!("invocation", request_id = %req.context.request_id);
        let inner = {
            let _enter = span.enter();
            self.inner.call(req)
        };

        InvocationFuture {
            span,
            started: Instant::now(),
            inner,
        }
    }
}

#[pin_project]
#[doc(hidden)]
pub struct InvocationFuture<F> {
    span: Span,
    started: Instant,
    #[pin]
    inner: F,
}

impl<F, Response, Error> Future for InvocationFuture<F>
where
    F: Future<Output = Result<Response, Error>>,
    Error: std::fmt::Display,
{
    type Output = Result<Response, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _enter = this.span.enter();

        let result = ready!(this.inner.poll(cx));
        let elapsed_ms = this.started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(elapsed_ms, "invocation complete"),
            Err(e) => error!(elapsed_ms, "invocation failed: {e}"),
        }

        Poll::Ready(result)
    }
}

/// Start the Lambda Rust runtime with a [ProbeService] for `driver`, wrapped by an
/// [InvocationService]
pub async fn run<T: Transport + 'static>(driver: &'static Driver<'static, T>) -> Result<(), lambda_runtime::Error> {
    lambda_runtime::run(InvocationService::new(ProbeService::new(driver))).await
}
