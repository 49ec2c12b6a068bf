use std::path::PathBuf;

use clap::Parser;
use plotwerk::config::{Config, Overrides};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "plotwerk-report")]
#[command(about = "Run the plotting agent once and print its JSON report")]
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

    /// SQL run against the mock metrics database
    #[arg(long)]
    query: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,plotwerk=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    config.apply_overrides(Overrides {
        offline: args.offline,
        model: args.model,
        query: args.query,
        bind: None,
    });

    println!("--- Running Agent in Standalone Mode ---");
    let report = config.report_generator()?.generate().await?;

    println!("\n--- Agent Output ---");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
