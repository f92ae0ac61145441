use clap::Parser;
use redalert_bridge::{
    config::{Config, read_config_file},
    feed::{DemoFeed, FeedClient, HttpFeedClient},
    monitor::{MonitorLoop, MonitorSettings},
    publisher::MqttBroker,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// JSON config file, the environment is used when omitted
    #[arg(short, long)]
    file: Option<String>,

    /// Publish a synthetic alert instead of polling the live feed
    #[arg(long)]
    debug: bool,

    /// Trace level logging
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("redalert_bridge", level),
        ("rumqttc", LevelFilter::WARN),
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
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let mut config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::from_env()?,
    };
    if args.debug {
        config.debug = true;
    }

    let broker = MqttBroker::new(&config.mqtt);
    let settings = MonitorSettings::from(&config);

    if config.debug {
        info!("debug mode, publishing synthetic alerts");
        monitor(DemoFeed::new(), broker, settings).await
    } else {
        monitor(HttpFeedClient::new(&config.feed)?, broker, settings).await
    }
}

async fn monitor<F>(feed: F, broker: MqttBroker, settings: MonitorSettings) -> anyhow::Result<()>
where
    F: FeedClient + 'static,
{
    let monitor = MonitorLoop::new(feed, broker, settings);

    tokio::select! {
        _ = monitor.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutdown requested, stopping monitor");
        }
    }

    Ok(())
}
