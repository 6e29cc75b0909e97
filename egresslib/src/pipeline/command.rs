mod actor;
mod messages;

use self::{actor::Actor, messages::PipelineMessage};
use super::{Pipeline, PipelineFactory};
use crate::error::{Error, Result};
use crate::types::{EgressInfo, PipelineConfig, UpdateStreamRequest};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};
use tokio::{
    process,
    sync::{mpsc, watch},
};
use tracing::debug;

/// A pipeline backed by an external process, e.g. `gst-launch-1.0 -e ...`.
///
/// Like the other actor handles in this crate, the struct only holds channels; the child process
/// is owned by an actor that starts when [`Pipeline::run`] is called. End-of-stream is delivered
/// as `SIGINT`, and the child is killed if it has not exited `stop_timeout` later.
pub struct CommandPipeline {
    sender: mpsc::UnboundedSender<PipelineMessage>,
    info: watch::Receiver<EgressInfo>,
    actor: Mutex<Option<Actor>>,
    tmp_dir: PathBuf,
}

impl CommandPipeline {
    pub async fn new(conf: &PipelineConfig) -> Result<Self> {
        let (program, args) = conf
            .command
            .split_first()
            .ok_or_else(|| Error::InvalidRequest("empty pipeline command".into()))?;
        tokio::fs::create_dir_all(&conf.tmp_dir)
            .await
            .map_err(Error::fatal)?;

        let mut command = process::Command::new(program);
        command
            .args(args)
            .current_dir(&conf.tmp_dir)
            .env("GST_DEBUG_DUMP_DOT_DIR", &conf.tmp_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let (sender, inbox) = mpsc::unbounded_channel();
        let (info_tx, info) = watch::channel(conf.info.clone());
        let actor = Actor::new(inbox, info_tx, command, conf.stop_timeout);
        Ok(Self {
            sender,
            info,
            actor: Mutex::new(Some(actor)),
            tmp_dir: conf.tmp_dir.clone(),
        })
    }
}

#[async_trait]
impl Pipeline for CommandPipeline {
    fn info(&self) -> EgressInfo {
        self.info.borrow().clone()
    }

    async fn run(&self) -> EgressInfo {
        let actor = self
            .actor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(actor) = actor {
            return actor.run().await;
        }

        // already running elsewhere, wait for its outcome
        let mut info = self.info.clone();
        let terminal = info
            .wait_for(|info| info.status.is_terminal())
            .await
            .map(|info| info.clone());
        terminal.unwrap_or_else(|_| self.info())
    }

    async fn update_stream(&self, _req: &UpdateStreamRequest) -> Result<()> {
        Err(Error::InvalidRequest(
            "command pipelines do not support stream updates".into(),
        ))
    }

    fn send_eos(&self) {
        let _ = self.sender.send(PipelineMessage::SendEos);
    }

    async fn debug_dot(&self) -> String {
        match newest_dot_file(&self.tmp_dir).await {
            Ok(Some(path)) => tokio::fs::read_to_string(&path).await.unwrap_or_default(),
            Ok(None) => String::new(),
            Err(err) => {
                debug!(error = %err, "failed to scan for dot dumps");
                String::new()
            }
        }
    }
}

async fn newest_dot_file(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "dot") {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Builds a [`CommandPipeline`] for each request.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandPipelineFactory;

#[async_trait]
impl PipelineFactory for CommandPipelineFactory {
    async fn build(&self, conf: &PipelineConfig) -> Result<Arc<dyn Pipeline>> {
        Ok(Arc::new(CommandPipeline::new(conf).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EgressStatus;
    use std::time::Duration;

    fn conf(dir: &Path, script: &str) -> PipelineConfig {
        let mut conf = PipelineConfig::new("EG_command", dir);
        conf.command = vec!["sh".into(), "-c".into(), script.into()];
        conf.stop_timeout = Duration::from_millis(300);
        conf
    }

    async fn wait_active(pipeline: &CommandPipeline) {
        let mut info = pipeline.info.clone();
        let _ = info.wait_for(|info| info.status == EgressStatus::Active).await;
        // give the shell time to install its traps
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test]
    async fn empty_command_is_a_user_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut conf = conf(dir.path(), "");
        conf.command.clear();
        let err = CommandPipelineFactory.build(&conf).await.err().unwrap();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn clean_exit_completes() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = CommandPipeline::new(&conf(dir.path(), "echo hello")).await.unwrap();
        let info = pipeline.run().await;
        assert_eq!(info.status, EgressStatus::Complete);
        assert!(info.ended_at >= info.started_at);
        assert_eq!(pipeline.info(), info);
    }

    #[tokio::test]
    async fn failing_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = CommandPipeline::new(&conf(dir.path(), "exit 3")).await.unwrap();
        let info = pipeline.run().await;
        assert_eq!(info.status, EgressStatus::Failed);
        assert!(info.error.unwrap().contains('3'));
    }

    #[tokio::test]
    async fn eos_interrupts_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let script = "trap 'exit 0' INT; while true; do sleep 0.1; done";
        let pipeline = Arc::new(CommandPipeline::new(&conf(dir.path(), script)).await.unwrap());

        let runner = pipeline.clone();
        let run = tokio::spawn(async move { runner.run().await });
        wait_active(&pipeline).await;

        pipeline.send_eos();
        pipeline.send_eos();
        let info = run.await.unwrap();
        assert_eq!(info.status, EgressStatus::Complete);
    }

    #[tokio::test]
    async fn eos_before_run_completes_without_starting() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("started");
        let script = format!(
            "touch {}; trap 'exit 0' INT; while true; do sleep 0.1; done",
            marker.display()
        );
        let pipeline = CommandPipeline::new(&conf(dir.path(), &script)).await.unwrap();

        pipeline.send_eos();
        let info = tokio::time::timeout(Duration::from_secs(5), pipeline.run())
            .await
            .expect("pipeline did not finish");
        assert_eq!(info.status, EgressStatus::Complete);
        assert!(info.error.is_none());
        assert!(info.ended_at > 0);
        assert!(info.ended_at >= info.started_at);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn ignored_eos_is_escalated_to_kill() {
        let dir = tempfile::tempdir().unwrap();
        let script = "trap '' INT; while true; do sleep 0.1; done";
        let pipeline = Arc::new(CommandPipeline::new(&conf(dir.path(), script)).await.unwrap());

        let runner = pipeline.clone();
        let run = tokio::spawn(async move { runner.run().await });
        wait_active(&pipeline).await;

        pipeline.send_eos();
        let info = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("pipeline was not killed")
            .unwrap();
        assert_eq!(info.status, EgressStatus::Failed);
        assert!(info.error.unwrap().contains("end of stream"));
    }

    #[tokio::test]
    async fn debug_dot_returns_newest_dump() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = CommandPipeline::new(&conf(dir.path(), "true")).await.unwrap();
        assert_eq!(pipeline.debug_dot().await, "");

        std::fs::write(dir.path().join("pipeline.dot"), "digraph pipeline {}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        assert_eq!(pipeline.debug_dot().await, "digraph pipeline {}");
    }
}
