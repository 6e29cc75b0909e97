use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect a running egress handler through its local debug socket
#[derive(Debug, Parser)]
pub struct ArgParser {
    /// Path of the handler's socket
    #[arg(short = 's', long = "socket", env = "EGRESS_SOCKET", conflicts_with = "tmp_dir")]
    pub socket: Option<PathBuf>,
    /// The egress tmp dir; the socket is looked up inside it
    #[arg(short = 't', long = "tmp-dir", env = "EGRESS_TMP_DIR")]
    pub tmp_dir: Option<PathBuf>,
    /// The sub-command to use
    #[command(subcommand)]
    pub sub_command: SubCommand,
}

impl ArgParser {
    pub fn socket_path(&self) -> Option<PathBuf> {
        match (&self.socket, &self.tmp_dir) {
            (Some(socket), _) => Some(socket.clone()),
            (None, Some(tmp_dir)) => Some(tmp_dir.join(protobuf::SOCKET_NAME)),
            (None, None) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// print the pipeline graph in dot format
    Dot,
    /// capture a profile
    Pprof {
        /// name of the profile, e.g. cpu or heap
        name: String,

        #[arg(long, default_value_t = 30)]
        /// seconds to sample for, where the profile samples
        timeout: i32,

        #[arg(long, default_value_t = 0)]
        /// output verbosity
        debug: i32,

        #[arg(short, long)]
        /// write the profile here instead of stdout
        output: Option<PathBuf>,
    },
    /// print the handler's metrics
    Metrics,
}
