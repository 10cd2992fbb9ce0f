pub mod circuit;
pub mod registry;

pub use circuit::{BreakerError, BreakerSettings, BreakerStatus, CircuitBreaker, CircuitState};
pub use registry::BreakerRegistry;
