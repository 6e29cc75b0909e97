use clap::Parser;
use egresslib::{
    types::new_egress_id, CommandPipelineFactory, EgressStatus, LogIoClient, PipelineConfig,
};
use handler::{signals::wait_for_shutdown_signal, Handler, HandlerOptions, LocalBus};
use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Run and supervise a single egress pipeline
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Egress id, generated when not given
    #[arg(long, env = "EGRESS_ID")]
    egress_id: Option<String>,

    /// Scratch directory for the egress; hosts the debug socket. Defaults to a directory named
    /// after the egress under the system temp dir
    #[arg(long, env = "EGRESS_TMP_DIR")]
    tmp_dir: Option<PathBuf>,

    /// Seconds the pipeline gets to finish after end-of-stream before it is killed
    #[arg(long, env = "EGRESS_STOP_TIMEOUT", default_value_t = 30)]
    stop_timeout: u64,

    /// The pipeline command line, e.g. `gst-launch-1.0 -e ...`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Args {
    fn into_config(self) -> PipelineConfig {
        let egress_id = self.egress_id.unwrap_or_else(new_egress_id);
        let tmp_dir = self
            .tmp_dir
            .unwrap_or_else(|| std::env::temp_dir().join(&egress_id));
        let mut conf = PipelineConfig::new(egress_id, tmp_dir);
        conf.command = self.command;
        conf.stop_timeout = Duration::from_secs(self.stop_timeout);
        conf
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let conf = Args::parse().into_config();
    info!(egress_id = %conf.egress_id(), tmp_dir = %conf.tmp_dir.display(), "starting egress handler");

    let handler = Handler::new(
        conf,
        // in-process only: nothing outside this process can reach the control topics, so this
        // binary is stopped through signals. Remote transports implement `MessageBus`.
        Arc::new(LocalBus::default()),
        Arc::new(LogIoClient),
        &CommandPipelineFactory,
        HandlerOptions::default(),
    )
    .await?;
    info!(socket = %handler.socket_path().display(), "debug socket ready");

    let kill = handler.kill_switch();
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => {
                info!("shutdown signal received");
                kill.trigger();
            }
            Err(err) => error!(error = %err, "failed to listen for shutdown signals"),
        }
    });

    let info = handler.run().await;
    if info.status == EgressStatus::Failed {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_command_keeps_its_flags() {
        let args = Args::try_parse_from([
            "handler",
            "--egress-id",
            "EG_cli",
            "--stop-timeout",
            "5",
            "gst-launch-1.0",
            "-e",
            "videotestsrc",
            "!",
            "fakesink",
        ])
        .unwrap();
        let conf = args.into_config();
        assert_eq!(conf.egress_id(), "EG_cli");
        assert_eq!(conf.stop_timeout, Duration::from_secs(5));
        assert_eq!(conf.command[0], "gst-launch-1.0");
        assert_eq!(conf.command[1], "-e");
        assert!(conf.tmp_dir.ends_with("EG_cli"));
    }

    #[test]
    fn missing_command_is_rejected() {
        assert!(Args::try_parse_from(["handler", "--egress-id", "EG_cli"]).is_err());
    }
}
