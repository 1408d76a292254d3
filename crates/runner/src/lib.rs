//! Node command runner implementations for stage-env.
//!
//! - [`DockerExecRunner`]: `docker exec` into node containers, JSON-RPC over HTTP
//! - [`BollardProbe`]: container state through the Docker API
//! - [`process::run_with_timeout`]: the shared spawn/timeout/kill primitive

pub mod docker;
pub mod probe;
pub mod process;

pub use docker::DockerExecRunner;
pub use probe::{BollardProbe, ContainerProbe, ContainerState};

#[cfg(any(test, feature = "test-util"))]
pub use probe::MockContainerProbe;
