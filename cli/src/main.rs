mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use clap::Parser;
use client_cli::ClientCli;

#[tokio::main]
async fn main() -> Result<(), client_cli::Error> {
    let args = ArgParser::parse();
    let socket = args
        .socket_path()
        .ok_or("either --socket or --tmp-dir is required")?;
    let mut client = ClientCli::connect(&socket).await?;

    match args.sub_command {
        SubCommand::Dot => client.pipeline_dot().await,
        SubCommand::Pprof {
            name,
            timeout,
            debug,
            output,
        } => client.pprof(name, timeout, debug, output).await,
        SubCommand::Metrics => client.metrics().await,
    }
}
