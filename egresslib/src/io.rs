use crate::error::Result;
use crate::types::EgressInfo;
use async_trait::async_trait;
use tracing::info;

/// Receives egress status updates. Delivery is best effort from the handler's point of view.
#[async_trait]
pub trait IoClient: Send + Sync {
    async fn update_egress(&self, info: EgressInfo) -> Result<()>;
}

/// An `IoClient` that only records updates in the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogIoClient;

#[async_trait]
impl IoClient for LogIoClient {
    async fn update_egress(&self, info: EgressInfo) -> Result<()> {
        info!(
            egress_id = %info.egress_id,
            status = info.status.as_str(),
            started_at = info.started_at,
            ended_at = info.ended_at,
            error = info.error.as_deref().unwrap_or_default(),
            "egress updated"
        );
        Ok(())
    }
}
