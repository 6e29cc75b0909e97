use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type EgressId = String;

/// Generate a fresh egress id.
pub fn new_egress_id() -> EgressId {
    format!("EG_{}", uuid::Uuid::new_v4().simple())
}

/// Current wall clock time as unix nanoseconds.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EgressStatus {
    #[default]
    Starting,
    Active,
    Ending,
    Complete,
    Failed,
}

impl EgressStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, EgressStatus::Complete | EgressStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EgressStatus::Starting => "starting",
            EgressStatus::Active => "active",
            EgressStatus::Ending => "ending",
            EgressStatus::Complete => "complete",
            EgressStatus::Failed => "failed",
        }
    }
}

/// The job descriptor. Written by the pipeline while it runs; the handler only reads snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EgressInfo {
    pub egress_id: EgressId,
    pub status: EgressStatus,
    pub started_at: i64,
    pub updated_at: i64,
    pub ended_at: i64,
    pub error: Option<String>,
}

impl EgressInfo {
    pub fn new(egress_id: impl Into<EgressId>) -> Self {
        Self {
            egress_id: egress_id.into(),
            ..Default::default()
        }
    }

    /// Stamp the descriptor as failed at a single instant.
    ///
    /// `started_at` is only filled in when the egress never started.
    pub fn fail(&mut self, error: impl Into<String>) {
        let now = now_nanos();
        if self.started_at == 0 {
            self.started_at = now;
        }
        self.updated_at = now;
        self.ended_at = now;
        self.status = EgressStatus::Failed;
        self.error = Some(error.into());
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateStreamRequest {
    pub egress_id: EgressId,
    pub add_output_urls: Vec<String>,
    pub remove_output_urls: Vec<String>,
}

/// Everything needed to build and supervise one egress.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub info: EgressInfo,
    /// Job scoped scratch directory; also hosts the introspection socket.
    pub tmp_dir: PathBuf,
    /// Pipeline command line, program first.
    pub command: Vec<String>,
    /// How long a pipeline may take to honour end-of-stream before it is killed.
    pub stop_timeout: Duration,
}

impl PipelineConfig {
    pub fn new(egress_id: impl Into<EgressId>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            info: EgressInfo::new(egress_id),
            tmp_dir: tmp_dir.into(),
            command: Vec::new(),
            stop_timeout: Duration::from_secs(30),
        }
    }

    pub fn egress_id(&self) -> &str {
        &self.info.egress_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_stamps_single_instant() {
        let mut info = EgressInfo::new("EG_test");
        info.fail("bad url");
        assert_eq!(info.status, EgressStatus::Failed);
        assert_eq!(info.started_at, info.ended_at);
        assert_eq!(info.updated_at, info.ended_at);
        assert_eq!(info.error.as_deref(), Some("bad url"));
    }

    #[test]
    fn fail_keeps_earlier_start() {
        let mut info = EgressInfo::new("EG_test");
        info.started_at = 1;
        info.fail("crashed");
        assert_eq!(info.started_at, 1);
        assert!(info.ended_at >= info.started_at);
    }

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = new_egress_id();
        let b = new_egress_id();
        assert!(a.starts_with("EG_"));
        assert_ne!(a, b);
    }
}
