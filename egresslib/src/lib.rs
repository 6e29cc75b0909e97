mod fuse;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{Error, Result};
pub use fuse::Fuse;
pub use io::{IoClient, LogIoClient};
pub use pipeline::{CommandPipeline, CommandPipelineFactory, Pipeline, PipelineFactory};
pub use types::{EgressId, EgressInfo, EgressStatus, PipelineConfig, UpdateStreamRequest};
