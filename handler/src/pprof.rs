use async_trait::async_trait;
use egresslib::{Error, Result};
use std::time::Duration;

/// The process wide profiling facility.
#[async_trait]
pub trait Profiler: Send + Sync {
    /// Capture profile `name`. `duration` is only meaningful for sampling profiles, `debug`
    /// selects the output verbosity.
    async fn profile(&self, name: &str, duration: Duration, debug: i32) -> Result<Vec<u8>>;
}

/// Used when the process was built without a profiler.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledProfiler;

#[async_trait]
impl Profiler for DisabledProfiler {
    async fn profile(&self, name: &str, _duration: Duration, _debug: i32) -> Result<Vec<u8>> {
        Err(Error::Profiler(format!(
            "cannot capture {name} profile: profiling is disabled"
        )))
    }
}
