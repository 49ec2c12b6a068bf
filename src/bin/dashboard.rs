use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use plotwerk::{
    config::{Config, Overrides},
    dashboard,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "plotwerk-dashboard")]
#[command(about = "Serve the agent visualization dashboard")]
struct Args {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the scripted provider instead of a hosted model
    #[arg(long)]
    offline: bool,

    /// Model name sent to the provider
    #[arg(long)]
    model: Option<String>,

    /// Address to listen on
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,plotwerk=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    config.apply_overrides(Overrides {
        offline: args.offline,
        model: args.model,
        query: None,
        bind: args.bind,
    });

    tracing::info!(provider = %config.provider, model = %config.model, "starting dashboard");
    dashboard::serve(&config).await?;
    Ok(())
}
