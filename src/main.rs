// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use netweather_monitor::monitor::{NetworkMonitor, Resolver};
use netweather_monitor::render::TerminalSink;
use netweather_monitor::runtime::{self, Runtime};
use netweather_monitor::{Config, logging};

#[derive(Debug, Parser)]
#[command(version, about = "Network quality and public-IP weather monitor")]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Take one network sample and one weather reading, print them and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.log)?;

    let mut sampler = NetworkMonitor::from_config(&config);
    let resolver = Arc::new(Resolver::new(&config)?);
    let sink = Arc::new(TerminalSink::stdout(config.display.clone()));

    if cli.once {
        runtime::run_once(&mut sampler, resolver.as_ref(), sink.as_ref()).await;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupted, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("cannot listen for ctrl-c: {e}"),
        }
    });

    Runtime::from_config(&config, sampler, resolver, sink)
        .run(cancel)
        .await;
    Ok(())
}
