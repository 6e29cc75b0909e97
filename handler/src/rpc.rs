use crate::bus::{topic, BusRequest, ControlRequest, MessageBus, Method};
use crate::slot::PipelineSlot;
use egresslib::{EgressInfo, Error, Result, UpdateStreamRequest};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, instrument};

/// Answers control requests for one egress.
pub(crate) struct RpcService {
    pipeline: Arc<PipelineSlot>,
}

impl RpcService {
    pub fn new(pipeline: Arc<PipelineSlot>) -> Self {
        Self { pipeline }
    }

    async fn handle(&self, request: ControlRequest) -> Result<EgressInfo> {
        match request {
            ControlRequest::UpdateStream(req) => self.update_stream(req).await,
            ControlRequest::StopEgress => self.stop_egress(),
        }
    }

    #[instrument(skip_all, fields(egress_id = %req.egress_id))]
    async fn update_stream(&self, req: UpdateStreamRequest) -> Result<EgressInfo> {
        let pipeline = self.pipeline.get()?;
        pipeline.update_stream(&req).await?;
        Ok(pipeline.info())
    }

    /// Asks for end-of-stream and answers right away with the current, usually non-terminal,
    /// descriptor.
    #[instrument(skip_all)]
    fn stop_egress(&self) -> Result<EgressInfo> {
        let pipeline = self.pipeline.get()?;
        pipeline.send_eos();
        Ok(pipeline.info())
    }
}

/// The control surface: the egress' topics on the shared bus.
pub(crate) struct ControlServer {
    bus: Arc<dyn MessageBus>,
    topics: Vec<String>,
    loops: Vec<JoinHandle<()>>,
}

impl ControlServer {
    /// Subscribe to both control topics of `egress_id`. Any failure here is fatal.
    pub fn register(
        bus: Arc<dyn MessageBus>,
        egress_id: &str,
        service: RpcService,
    ) -> Result<Self> {
        let service = Arc::new(service);
        let mut server = Self {
            bus,
            topics: Vec::with_capacity(2),
            loops: Vec::with_capacity(2),
        };
        for method in [Method::UpdateStream, Method::StopEgress] {
            let topic = topic(egress_id, method);
            let inbox = match server.bus.subscribe(&topic) {
                Ok(inbox) => inbox,
                Err(err) => {
                    server.unsubscribe_all();
                    return Err(Error::fatal(err));
                }
            };
            server
                .loops
                .push(tokio::spawn(serve(topic.clone(), inbox, service.clone())));
            server.topics.push(topic);
        }
        Ok(server)
    }

    fn unsubscribe_all(&self) {
        for topic in &self.topics {
            self.bus.unsubscribe(topic);
        }
    }

    /// Leave the bus and wait for the dispatch loops to drain.
    pub async fn shutdown(self) {
        self.unsubscribe_all();
        for handle in self.loops {
            let _ = handle.await;
        }
    }
}

async fn serve(topic: String, mut inbox: mpsc::Receiver<BusRequest>, service: Arc<RpcService>) {
    while let Some(BusRequest { request, response }) = inbox.recv().await {
        debug!(topic = %topic, method = %request.method(), "control request");
        let service = service.clone();
        tokio::spawn(async move {
            let _ = response.send(service.handle(request).await);
        });
    }
    debug!(topic = %topic, "control topic closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ControlClient, LocalBus};
    use egresslib::testing::FakePipeline;
    use egresslib::EgressStatus;

    fn setup(egress_id: &str) -> (Arc<LocalBus>, Arc<PipelineSlot>, ControlServer) {
        let bus = Arc::new(LocalBus::default());
        let slot = Arc::new(PipelineSlot::default());
        let server =
            ControlServer::register(bus.clone(), egress_id, RpcService::new(slot.clone())).unwrap();
        (bus, slot, server)
    }

    #[tokio::test]
    async fn requests_before_pipeline_are_not_found() {
        let (bus, _slot, _server) = setup("EG_early");
        let client = ControlClient::new(bus, "EG_early");
        assert!(matches!(client.stop_egress().await, Err(Error::NotFound)));
        assert!(matches!(
            client.update_stream(UpdateStreamRequest::default()).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn stop_returns_current_descriptor() {
        let (bus, slot, _server) = setup("EG_stop");
        let pipeline = Arc::new(FakePipeline::new("EG_stop").ignore_eos());
        slot.fill(pipeline.clone());

        let info = ControlClient::new(bus, "EG_stop").stop_egress().await.unwrap();
        assert_eq!(info.status, EgressStatus::Active);
        assert_eq!(pipeline.eos_requests(), 1);
    }

    #[tokio::test]
    async fn update_errors_pass_through() {
        let (bus, slot, _server) = setup("EG_update");
        slot.fill(Arc::new(FakePipeline::new("EG_update").fail_updates("no such output")));

        let err = ControlClient::new(bus, "EG_update")
            .update_stream(UpdateStreamRequest {
                egress_id: "EG_update".into(),
                add_output_urls: vec!["rtmp://example/live".into()],
                remove_output_urls: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Pipeline(msg) if msg == "no such output"));
    }

    #[tokio::test]
    async fn second_registration_for_same_egress_is_fatal() {
        let (bus, _slot, _server) = setup("EG_dup");
        let err = ControlServer::register(
            bus.clone(),
            "EG_dup",
            RpcService::new(Arc::new(PipelineSlot::default())),
        )
        .err()
        .unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn shutdown_leaves_the_bus() {
        let (bus, slot, server) = setup("EG_gone");
        slot.fill(Arc::new(FakePipeline::new("EG_gone")));
        server.shutdown().await;

        let err = ControlClient::new(bus.clone(), "EG_gone")
            .stop_egress()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }
}
