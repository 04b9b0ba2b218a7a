pub mod core;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use crate::core::checks::{run_checks, system_collaborators};
use crate::core::error::ClientResult;
use crate::core::ipc::{spawn_parent_reader, Message, MessageSink, StdoutSink};
use crate::core::relay::run_relay;
use crate::core::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "racing-client", version, about = "Racing+ client child processes")]
struct Cli {
    /// Settings file. Defaults to `<config dir>/racing-client/settings.json`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Verify the mod and get the game ready for the Racing+ client.
    Checks,
    /// Relay mod traffic between the game and the parent.
    Relay,
}

impl Command {
    fn fatal(self, reason: String) -> Message {
        match self {
            Command::Checks => Message::Fatal(reason),
            Command::Relay => Message::RelayFatal(reason),
        }
    }
}

pub fn run() {
    // stdout belongs to the parent protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,racing_client_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let sink: Arc<dyn MessageSink> = Arc::new(StdoutSink);
    tracing::info!("Racing+ client starting ({:?})", cli.command);

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(crate::core::error::ClientError::from)
        .and_then(|runtime| {
            let result = runtime.block_on(execute(&cli, sink.clone()));
            // The stdin reader may still be parked on a blocking read.
            runtime.shutdown_background();
            result
        });

    if let Err(e) = result {
        tracing::error!("{}", e);
        let _ = sink.send(cli.command.fatal(e.to_string()));
        std::process::exit(1);
    }
}

async fn execute(cli: &Cli, sink: Arc<dyn MessageSink>) -> ClientResult<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let parent = spawn_parent_reader(BufReader::new(tokio::io::stdin()));

    match cli.command {
        Command::Checks => {
            let deps = system_collaborators(&settings.checks, sink.clone())?;
            run_checks(settings.checks, deps, sink, parent).await
        }
        Command::Relay => run_relay(&settings.relay, sink, parent).await,
    }
}
