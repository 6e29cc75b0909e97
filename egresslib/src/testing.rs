//! In-memory collaborators for exercising the handler without a real pipeline or status service.

use crate::error::{Error, Result};
use crate::fuse::Fuse;
use crate::io::IoClient;
use crate::pipeline::{Pipeline, PipelineFactory};
use crate::types::{now_nanos, EgressInfo, EgressStatus, PipelineConfig, UpdateStreamRequest};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::Duration;

/// A pipeline that reports `Active` until it is told to finish.
pub struct FakePipeline {
    info: Mutex<EgressInfo>,
    finish: Fuse,
    final_status: Mutex<EgressStatus>,
    eos_requests: AtomicUsize,
    runs: AtomicUsize,
    finish_on_eos: bool,
    dot_delay: Duration,
    update_error: Mutex<Option<String>>,
}

impl FakePipeline {
    pub fn new(egress_id: &str) -> Self {
        let mut info = EgressInfo::new(egress_id);
        info.status = EgressStatus::Active;
        info.started_at = now_nanos();
        info.updated_at = info.started_at;
        Self {
            info: Mutex::new(info),
            finish: Fuse::new(),
            final_status: Mutex::new(EgressStatus::Complete),
            eos_requests: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
            finish_on_eos: true,
            dot_delay: Duration::ZERO,
            update_error: Mutex::new(None),
        }
    }

    /// Keep running after end-of-stream until [`FakePipeline::finish`] is called.
    pub fn ignore_eos(mut self) -> Self {
        self.finish_on_eos = false;
        self
    }

    pub fn with_dot_delay(mut self, delay: Duration) -> Self {
        self.dot_delay = delay;
        self
    }

    pub fn fail_updates(self, error: &str) -> Self {
        *self.update_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.into());
        self
    }

    /// Let `run` return with the given terminal status.
    pub fn finish(&self, status: EgressStatus) {
        *self.final_status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        self.finish.trigger();
    }

    pub fn eos_requests(&self) -> usize {
        self.eos_requests.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pipeline for FakePipeline {
    fn info(&self) -> EgressInfo {
        self.info.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn run(&self) -> EgressInfo {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.finish.watch().await;
        let status = *self.final_status.lock().unwrap_or_else(PoisonError::into_inner);
        let mut info = self.info.lock().unwrap_or_else(PoisonError::into_inner);
        let now = now_nanos();
        info.status = status;
        info.updated_at = now;
        info.ended_at = now;
        info.clone()
    }

    async fn update_stream(&self, _req: &UpdateStreamRequest) -> Result<()> {
        let error = self
            .update_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match error {
            Some(error) => Err(Error::Pipeline(error)),
            None => {
                self.info.lock().unwrap_or_else(PoisonError::into_inner).updated_at = now_nanos();
                Ok(())
            }
        }
    }

    fn send_eos(&self) {
        self.eos_requests.fetch_add(1, Ordering::SeqCst);
        if self.finish_on_eos {
            self.finish.trigger();
        }
    }

    async fn debug_dot(&self) -> String {
        tokio::time::sleep(self.dot_delay).await;
        format!("digraph {} {{}}", self.info().egress_id)
    }
}

/// Hands out a prepared pipeline, or fails with a prepared error.
pub struct FakeFactory {
    outcome: Mutex<Option<Result<Arc<FakePipeline>>>>,
}

impl FakeFactory {
    pub fn ok(pipeline: Arc<FakePipeline>) -> Self {
        Self {
            outcome: Mutex::new(Some(Ok(pipeline))),
        }
    }

    pub fn err(err: Error) -> Self {
        Self {
            outcome: Mutex::new(Some(Err(err))),
        }
    }
}

#[async_trait]
impl PipelineFactory for FakeFactory {
    async fn build(&self, _conf: &PipelineConfig) -> Result<Arc<dyn Pipeline>> {
        let outcome = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Pipeline("factory already used".into()))?;
        outcome.map(|pipeline| pipeline as Arc<dyn Pipeline>)
    }
}

/// Records every update it receives. Can be told to fail.
#[derive(Default)]
pub struct RecordingIoClient {
    updates: Mutex<Vec<EgressInfo>>,
    fail: bool,
}

impl RecordingIoClient {
    pub fn failing() -> Self {
        Self {
            updates: Mutex::default(),
            fail: true,
        }
    }

    pub fn updates(&self) -> Vec<EgressInfo> {
        self.updates.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl IoClient for RecordingIoClient {
    async fn update_egress(&self, info: EgressInfo) -> Result<()> {
        self.updates.lock().unwrap_or_else(PoisonError::into_inner).push(info);
        if self.fail {
            return Err(Error::Unavailable("io service".into()));
        }
        Ok(())
    }
}
