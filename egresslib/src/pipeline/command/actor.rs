use super::messages::PipelineMessage;
use crate::types::{now_nanos, EgressInfo, EgressStatus};

use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use std::{process::ExitStatus, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    select,
    sync::{mpsc, watch},
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<PipelineMessage>,
    info: watch::Sender<EgressInfo>,
    command: Command,
    stop_timeout: Duration,
}

impl Actor {
    pub fn new(
        inbox: mpsc::UnboundedReceiver<PipelineMessage>,
        info: watch::Sender<EgressInfo>,
        command: Command,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            inbox,
            info,
            command,
            stop_timeout,
        }
    }

    pub async fn run(mut self) -> EgressInfo {
        let egress_id = self.info.borrow().egress_id.clone();

        // end-of-stream before the process exists: it never starts, nothing to interrupt
        if self.eos_pending() {
            info!(egress_id = %egress_id, "end of stream requested before start");
            self.info.send_modify(|info| {
                let now = now_nanos();
                if info.started_at == 0 {
                    info.started_at = now;
                }
                info.status = EgressStatus::Complete;
                info.updated_at = now;
                info.ended_at = now;
            });
            return self.info.borrow().clone();
        }

        let mut child = match self.command.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.info
                    .send_modify(|info| info.fail(format!("failed to start pipeline: {err}")));
                return self.info.borrow().clone();
            }
        };

        // forward the pipeline's own output to our logs
        if let Some(stdout) = child.stdout.take() {
            forward_output(egress_id.clone(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(egress_id.clone(), "stderr", stderr);
        }

        self.info.send_modify(|info| {
            let now = now_nanos();
            info.status = EgressStatus::Active;
            info.started_at = now;
            info.updated_at = now;
        });
        info!(egress_id = %egress_id, pid = child.id(), "pipeline started");

        let mut kill_at: Option<Instant> = None;
        let mut killed = false;
        let mut inbox_open = true;
        let exit_status = loop {
            select! {
                maybe_msg = self.inbox.recv(), if inbox_open => {
                    match maybe_msg {
                        Some(PipelineMessage::SendEos) => {
                            if kill_at.is_none() {
                                kill_at = Some(Instant::now() + self.stop_timeout);
                                self.end_of_stream(&child);
                            }
                        }
                        // the handle is gone, nobody can ask for EOS any more
                        None => inbox_open = false,
                    }
                }
                _ = sleep_until(kill_at.unwrap_or_else(Instant::now)), if kill_at.is_some() && !killed => {
                    warn!(egress_id = %egress_id, timeout = ?self.stop_timeout, "pipeline ignored end of stream, killing");
                    killed = true;
                    let _ = child.start_kill();
                }
                exit_status = child.wait() => break exit_status,
            }
        };

        self.info.send_modify(|info| match exit_status {
            _ if killed => info.fail(format!(
                "pipeline did not honour end of stream within {:?}",
                self.stop_timeout
            )),
            Ok(status) if status.success() => {
                let now = now_nanos();
                info.status = EgressStatus::Complete;
                info.updated_at = now;
                info.ended_at = now;
            }
            Ok(status) => info.fail(describe_exit(status)),
            Err(err) => info.fail(format!("failed waiting on pipeline: {err}")),
        });
        let info = self.info.borrow().clone();
        info!(egress_id = %egress_id, status = info.status.as_str(), "pipeline finished");
        info
    }

    fn eos_pending(&mut self) -> bool {
        let mut pending = false;
        while let Ok(msg) = self.inbox.try_recv() {
            match msg {
                PipelineMessage::SendEos => pending = true,
            }
        }
        pending
    }

    fn end_of_stream(&self, child: &Child) {
        self.info.send_modify(|info| {
            if !info.status.is_terminal() {
                info.status = EgressStatus::Ending;
                info.updated_at = now_nanos();
            }
        });
        let Some(pid) = child.id() else {
            return; // already exited
        };
        if let Err(err) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
            warn!(pid, error = %err, "failed to deliver end of stream");
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    format!("pipeline exited with {status}")
}

fn forward_output<R>(egress_id: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(egress_id = %egress_id, stream, "{}", line);
        }
    });
}
