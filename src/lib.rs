pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use {
    builder::Builder,
    config::ProbeConfig,
    driver::{Driver, InvocationContext, Iterations, Targets},
    emitter::Emitter,
    random::{EntropySource, RandomSource},
};

mod builder;
pub mod config;
pub mod driver;
pub mod emf;
mod emitter;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod observation;
pub mod random;
pub mod transport;
