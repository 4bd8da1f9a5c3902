use httpbin_emf_probe::{lambda, observation, transport, Driver, ProbeConfig, Targets};
use lambda_runtime::Error;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_target(false)
        .with_current_span(false)
        .without_time()
        .init();

    let config = ProbeConfig::load()?;
    info!("probing {} every invocation, metrics in {}", config.target, config.namespace);

    let emitter = observation::probe_builder(config.namespace).init()?;
    let transport = transport::HttpsTransport::new(config.timeout)?;
    let driver = Driver::new(transport, emitter)
        .with_targets(Targets {
            valid: config.target,
            ..Targets::default()
        })
        .with_iterations(config.iterations);

    lambda::run(Box::leak(Box::new(driver))).await
}
