use crate::metrics::render_metrics;
use crate::pprof::Profiler;
use crate::slot::PipelineSlot;
use egresslib::{Error, Result};
use prometheus::Registry;
use protobuf::egress_handler_server::{EgressHandler, EgressHandlerServer};
use protobuf::{
    GstPipelineDebugDotRequest, GstPipelineDebugDotResponse, MetricsRequest, MetricsResponse,
    PProfRequest, PProfResponse, SOCKET_NAME,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::UnixListener, sync::oneshot, task::JoinHandle};
use tokio_stream::wrappers::UnixListenerStream;
use tonic::{transport::Server, Request, Response, Status};
use tracing::{debug, error, info, instrument};

/// Where the introspection server of the egress using `tmp_dir` listens.
pub fn socket_address(tmp_dir: &Path) -> PathBuf {
    tmp_dir.join(SOCKET_NAME)
}

pub(crate) fn to_status(err: Error) -> Status {
    match err {
        Error::NotFound => Status::not_found(err.to_string()),
        Error::DeadlineExceeded { .. } => Status::deadline_exceeded(err.to_string()),
        Error::InvalidRequest(_) => Status::invalid_argument(err.to_string()),
        Error::Unavailable(_) => Status::unavailable(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

/// Local debugging endpoints. Every call is independent of the others and of the control surface.
pub(crate) struct IpcService {
    pipeline: Arc<PipelineSlot>,
    registry: Registry,
    profiler: Arc<dyn Profiler>,
    debug_timeout: Duration,
}

impl IpcService {
    pub fn new(
        pipeline: Arc<PipelineSlot>,
        registry: Registry,
        profiler: Arc<dyn Profiler>,
        debug_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            registry,
            profiler,
            debug_timeout,
        }
    }

    async fn pipeline_dot(&self) -> Result<String> {
        let pipeline = self.pipeline.get()?;
        // a late dump is dropped together with the timed out future
        tokio::time::timeout(self.debug_timeout, pipeline.debug_dot())
            .await
            .map_err(|_| Error::DeadlineExceeded {
                what: "requesting pipeline debug info",
                after: self.debug_timeout,
            })
    }

    async fn pprof(&self, req: PProfRequest) -> Result<Vec<u8>> {
        self.pipeline.get()?;
        let duration = Duration::from_secs(req.timeout.max(0) as u64);
        self.profiler
            .profile(&req.profile_name, duration, req.debug)
            .await
    }

    fn metrics(&self) -> Result<String> {
        self.pipeline.get()?;
        let families = self.registry.gather();
        debug!(families = families.len(), "gathering metrics");
        let (metrics, count) = render_metrics(&families)?;
        debug!(count, "metrics rendered");
        Ok(metrics)
    }
}

#[tonic::async_trait]
impl EgressHandler for IpcService {
    #[instrument(skip_all)]
    async fn get_pipeline_dot(
        &self,
        _req: Request<GstPipelineDebugDotRequest>,
    ) -> std::result::Result<Response<GstPipelineDebugDotResponse>, Status> {
        let dot_file = self.pipeline_dot().await.map_err(to_status)?;
        Ok(Response::new(GstPipelineDebugDotResponse { dot_file }))
    }

    #[instrument(skip_all, fields(profile = %req.get_ref().profile_name))]
    async fn get_p_prof(
        &self,
        req: Request<PProfRequest>,
    ) -> std::result::Result<Response<PProfResponse>, Status> {
        let pprof_file = self.pprof(req.into_inner()).await.map_err(to_status)?;
        Ok(Response::new(PProfResponse { pprof_file }))
    }

    #[instrument(skip_all)]
    async fn get_metrics(
        &self,
        _req: Request<MetricsRequest>,
    ) -> std::result::Result<Response<MetricsResponse>, Status> {
        let metrics = self.metrics().map_err(to_status)?;
        Ok(Response::new(MetricsResponse { metrics }))
    }
}

/// The introspection gRPC server, listening on a unix socket in the egress' tmp dir.
pub(crate) struct IpcServer {
    path: PathBuf,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl IpcServer {
    /// Bind the socket and start serving. Any failure here is fatal.
    pub async fn start(tmp_dir: &Path, service: IpcService) -> Result<Self> {
        tokio::fs::create_dir_all(tmp_dir)
            .await
            .map_err(Error::fatal)?;
        let path = socket_address(tmp_dir);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::fatal(err)),
        }
        let listener = UnixListener::bind(&path).map_err(Error::fatal)?;
        info!(path = %path.display(), "introspection server listening");

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let res = Server::builder()
                .add_service(EgressHandlerServer::new(service))
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = res {
                error!(error = %err, "introspection server failed");
            }
        });
        Ok(Self {
            path,
            shutdown,
            task,
        })
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            debug!(path = %self.path.display(), error = %err, "failed to remove socket");
        }
    }
}
