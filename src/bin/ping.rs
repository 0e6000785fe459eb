use clap::Parser;
use reachability_monitoring::{
    MonitorContext, MonitorHandle,
    config::read_config_file,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("reachability_monitoring", LevelFilter::DEBUG),
        ("guardia_ping", LevelFilter::TRACE),
        ("event_log", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let context = MonitorContext::from_config(config)?;

    // subscribe before spawning so the first lines are not missed
    let mut lines = context.event_log.subscribe();
    let viewer = tokio::spawn(async move {
        loop {
            match lines.recv().await {
                Ok(entry) => println!("{entry}"),
                Err(RecvError::Lagged(skipped)) => warn!("viewer lagged, skipped {skipped} lines"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let monitor = MonitorHandle::spawn(context);

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, stopping monitor");

    monitor.shutdown().await?;
    viewer.await?;

    Ok(())
}
