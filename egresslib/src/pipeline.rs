mod command;

pub use command::{CommandPipeline, CommandPipelineFactory};

use crate::error::Result;
use crate::types::{EgressInfo, PipelineConfig, UpdateStreamRequest};
use async_trait::async_trait;
use std::sync::Arc;

/// The managed job the handler supervises.
///
/// The handler never mutates the descriptor; it reads snapshots through [`Pipeline::info`] and
/// receives the terminal descriptor from [`Pipeline::run`].
///
/// Starting and running to completion are one operation: `run` starts the egress and only
/// returns once it is over. An end-of-stream requested before `run` must still be honoured.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Snapshot of the current descriptor.
    fn info(&self) -> EgressInfo;

    /// Start the egress and drive it to a terminal state. Called once per pipeline.
    ///
    /// If end-of-stream was already requested the pipeline may finish without starting.
    async fn run(&self) -> EgressInfo;

    async fn update_stream(&self, req: &UpdateStreamRequest) -> Result<()>;

    /// Ask the pipeline to finish gracefully. Must not block, and repeated calls are harmless.
    fn send_eos(&self);

    /// Textual dump of the pipeline graph.
    async fn debug_dot(&self) -> String;
}

/// Builds the pipeline for an egress request.
///
/// Errors must be classified at creation: [`crate::Error::Fatal`] for infrastructure faults,
/// any other variant when the request itself is at fault.
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn build(&self, conf: &PipelineConfig) -> Result<Arc<dyn Pipeline>>;
}
