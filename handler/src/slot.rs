use egresslib::{Error, Pipeline, Result};
use std::sync::{Arc, OnceLock};

/// The pipeline, once it exists. Both server surfaces are up before the pipeline is built, so
/// every request path goes through here and gets [`Error::NotFound`] until then.
#[derive(Default)]
pub(crate) struct PipelineSlot(OnceLock<Arc<dyn Pipeline>>);

impl PipelineSlot {
    pub fn get(&self) -> Result<&Arc<dyn Pipeline>> {
        self.0.get().ok_or(Error::NotFound)
    }

    pub fn fill(&self, pipeline: Arc<dyn Pipeline>) {
        let _ = self.0.set(pipeline);
    }
}
