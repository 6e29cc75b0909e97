use crate::bus::MessageBus;
use crate::ipc::{socket_address, IpcServer, IpcService};
use crate::pprof::{DisabledProfiler, Profiler};
use crate::rpc::{ControlServer, RpcService};
use crate::slot::PipelineSlot;
use egresslib::{EgressInfo, Fuse, IoClient, Pipeline, PipelineConfig, PipelineFactory, Result};
use prometheus::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tracing::{error, info, instrument, warn};

/// How long a pipeline graph dump may take before the request fails.
pub const DEBUG_DOT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HandlerOptions {
    /// Rendered by the metrics endpoint.
    pub registry: Registry,
    pub profiler: Arc<dyn Profiler>,
    pub debug_timeout: Duration,
}

/// By default the process wide registry is rendered; on Linux it carries the process collector
/// (cpu, memory, open fds) of the `prometheus` crate.
impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            registry: prometheus::default_registry().clone(),
            profiler: Arc::new(DisabledProfiler),
            debug_timeout: DEBUG_DOT_TIMEOUT,
        }
    }
}

/// Supervises exactly one egress for the lifetime of the process.
///
/// Construction brings up the control surface on the message bus, the local introspection
/// server, and then the pipeline. [`Handler::run`] drives the pipeline to completion, reports
/// the outcome and tears both surfaces down. Consuming `self` there makes a second run, or a
/// second teardown, impossible.
pub struct Handler {
    conf: PipelineConfig,
    pipeline: Arc<dyn Pipeline>,
    rpc_server: ControlServer,
    ipc_server: IpcServer,
    io_client: Arc<dyn IoClient>,
    kill: Fuse,
}

impl Handler {
    #[instrument(skip_all, fields(egress_id = %conf.egress_id()))]
    pub async fn new(
        mut conf: PipelineConfig,
        bus: Arc<dyn MessageBus>,
        io_client: Arc<dyn IoClient>,
        factory: &dyn PipelineFactory,
        options: HandlerOptions,
    ) -> Result<Self> {
        let slot = Arc::new(PipelineSlot::default());

        let rpc_server =
            ControlServer::register(bus, conf.egress_id(), RpcService::new(slot.clone()))?;

        let ipc_service = IpcService::new(
            slot.clone(),
            options.registry,
            options.profiler,
            options.debug_timeout,
        );
        let ipc_server = match IpcServer::start(&conf.tmp_dir, ipc_service).await {
            Ok(server) => server,
            Err(err) => {
                rpc_server.shutdown().await;
                return Err(err);
            }
        };

        let pipeline = match factory.build(&conf).await {
            Ok(pipeline) => pipeline,
            Err(err) => {
                if err.is_fatal() {
                    error!(error = %err, "failed to build pipeline");
                } else {
                    // the request was at fault, let the status service know
                    warn!(error = %err, "egress request rejected");
                    conf.info.fail(err.to_string());
                    report(io_client.as_ref(), conf.info.clone()).await;
                }
                rpc_server.shutdown().await;
                ipc_server.stop().await;
                return Err(err);
            }
        };
        slot.fill(pipeline.clone());
        info!("egress handler ready");

        Ok(Self {
            conf,
            pipeline,
            rpc_server,
            ipc_server,
            io_client,
            kill: Fuse::new(),
        })
    }

    pub fn egress_id(&self) -> &str {
        self.conf.egress_id()
    }

    pub fn socket_path(&self) -> PathBuf {
        socket_address(&self.conf.tmp_dir)
    }

    /// The handle external process management uses to end this egress.
    pub fn kill_switch(&self) -> Fuse {
        self.kill.clone()
    }

    pub fn kill(&self) {
        self.kill.trigger();
    }

    /// Run the egress until the pipeline reaches a terminal state and return that state.
    ///
    /// A kill asks the pipeline for end-of-stream and keeps waiting; whether and when the
    /// pipeline gives up on a stuck stream is the pipeline's call.
    #[instrument(skip_all, fields(egress_id = %self.conf.egress_id()))]
    pub async fn run(self) -> EgressInfo {
        // a kill that landed before run() reaches the pipeline before it starts
        let mut killed = self.kill.is_triggered();
        if killed {
            info!("kill signal received before start");
            self.pipeline.send_eos();
        }

        let pipeline = self.pipeline.clone();
        let mut result = tokio::spawn(async move { pipeline.run().await });

        let kill = self.kill.watch();
        tokio::pin!(kill);

        let info = loop {
            select! {
                _ = &mut kill, if !killed => {
                    info!("kill signal received");
                    killed = true;
                    self.pipeline.send_eos();
                }
                res = &mut result => {
                    break match res {
                        Ok(info) => info,
                        Err(err) => {
                            error!(error = %err, "pipeline task failed");
                            let mut info = self.pipeline.info();
                            info.fail("pipeline exited unexpectedly");
                            info
                        }
                    };
                }
            }
        };
        info!(status = info.status.as_str(), "egress finished");

        report(self.io_client.as_ref(), info.clone()).await;
        self.rpc_server.shutdown().await;
        self.ipc_server.stop().await;
        info
    }
}

/// Best effort: a status service failure is logged and otherwise ignored.
async fn report(io_client: &dyn IoClient, info: EgressInfo) {
    let status = info.status.as_str();
    if let Err(err) = io_client.update_egress(info).await {
        warn!(status, error = %err, "failed to report egress status");
    }
}
