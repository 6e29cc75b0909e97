//! The shared message bus the control surface is reachable on.
//!
//! Requests are routed by topic. Every topic has at most one subscriber, so exactly one handler
//! in the system answers for a given egress.

use async_trait::async_trait;
use egresslib::{EgressInfo, Error, Result, UpdateStreamRequest};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

const DEFAULT_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    UpdateStream,
    StopEgress,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::UpdateStream => "update_stream",
            Method::StopEgress => "stop_egress",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic for `method` scoped to a single egress.
pub fn topic(egress_id: &str, method: Method) -> String {
    format!("{egress_id}.{method}")
}

#[derive(Debug)]
pub enum ControlRequest {
    UpdateStream(UpdateStreamRequest),
    StopEgress,
}

impl ControlRequest {
    pub fn method(&self) -> Method {
        match self {
            ControlRequest::UpdateStream(_) => Method::UpdateStream,
            ControlRequest::StopEgress => Method::StopEgress,
        }
    }
}

/// A request delivered to a topic subscriber, with the channel to answer on.
#[derive(Debug)]
pub struct BusRequest {
    pub request: ControlRequest,
    pub response: oneshot::Sender<Result<EgressInfo>>,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Claim `topic`. Fails with [`Error::TopicTaken`] if someone else already holds it.
    fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusRequest>>;

    /// Release `topic`. The subscriber's receiver closes once queued requests are drained.
    fn unsubscribe(&self, topic: &str);

    async fn request(&self, topic: &str, request: ControlRequest) -> Result<EgressInfo>;
}

/// An in-process bus.
pub struct LocalBus {
    topics: Mutex<HashMap<String, mpsc::Sender<BusRequest>>>,
    capacity: usize,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalBus {
    /// `capacity` bounds the queue of undelivered requests per topic.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusRequest>> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        if topics.get(topic).map_or(false, |tx| !tx.is_closed()) {
            return Err(Error::TopicTaken(topic.to_string()));
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        topics.insert(topic.to_string(), tx);
        debug!(topic, "subscribed");
        Ok(rx)
    }

    fn unsubscribe(&self, topic: &str) {
        let removed = self
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic);
        if removed.is_some() {
            debug!(topic, "unsubscribed");
        }
    }

    async fn request(&self, topic: &str, request: ControlRequest) -> Result<EgressInfo> {
        let subscriber = self
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .ok_or_else(|| Error::Unavailable(topic.to_string()))?;

        let (tx, rx) = oneshot::channel();
        subscriber
            .send(BusRequest {
                request,
                response: tx,
            })
            .await
            .map_err(|_| Error::Unavailable(topic.to_string()))?;
        rx.await
            .map_err(|_| Error::Unavailable(topic.to_string()))?
    }
}

/// Typed client for one egress' control topics.
#[derive(Clone)]
pub struct ControlClient {
    bus: Arc<dyn MessageBus>,
    egress_id: String,
}

impl ControlClient {
    pub fn new(bus: Arc<dyn MessageBus>, egress_id: impl Into<String>) -> Self {
        Self {
            bus,
            egress_id: egress_id.into(),
        }
    }

    pub async fn update_stream(&self, req: UpdateStreamRequest) -> Result<EgressInfo> {
        let topic = topic(&self.egress_id, Method::UpdateStream);
        self.bus
            .request(&topic, ControlRequest::UpdateStream(req))
            .await
    }

    pub async fn stop_egress(&self) -> Result<EgressInfo> {
        let topic = topic(&self.egress_id, Method::StopEgress);
        self.bus.request(&topic, ControlRequest::StopEgress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn topics_are_exclusive() {
        let bus = LocalBus::default();
        let _rx = bus.subscribe("EG_a.stop_egress").unwrap();
        let err = bus.subscribe("EG_a.stop_egress").unwrap_err();
        assert!(matches!(err, Error::TopicTaken(_)));

        bus.unsubscribe("EG_a.stop_egress");
        assert!(bus.subscribe("EG_a.stop_egress").is_ok());
    }

    #[tokio::test]
    async fn request_reaches_subscriber() {
        let bus = Arc::new(LocalBus::default());
        let mut rx = bus.subscribe(&topic("EG_a", Method::StopEgress)).unwrap();
        tokio::spawn(async move {
            while let Some(BusRequest { request, response }) = rx.recv().await {
                assert_eq!(request.method(), Method::StopEgress);
                let _ = response.send(Ok(EgressInfo::new("EG_a")));
            }
        });

        let client = ControlClient::new(bus, "EG_a");
        let info = client.stop_egress().await.unwrap();
        assert_eq!(info.egress_id, "EG_a");
    }

    #[tokio::test]
    async fn unknown_topic_is_unavailable() {
        let client = ControlClient::new(Arc::new(LocalBus::default()), "EG_missing");
        let err = client.stop_egress().await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn dropped_subscriber_is_unavailable() {
        let bus = Arc::new(LocalBus::default());
        let rx = bus.subscribe(&topic("EG_a", Method::UpdateStream)).unwrap();
        drop(rx);

        let client = ControlClient::new(bus.clone(), "EG_a");
        let err = client
            .update_stream(UpdateStreamRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));

        // a closed subscription does not hold the topic hostage
        assert!(bus.subscribe(&topic("EG_a", Method::UpdateStream)).is_ok());
    }
}
