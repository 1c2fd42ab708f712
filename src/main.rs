use clap::Parser;
use feedsnap::{Config, Error, Harvester, run_with_shutdown};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Fetch podcast feeds and publish one aggregated snapshot
#[derive(Parser, Debug)]
#[command(name = "feedsnap", version, about)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "feedsnap.json")]
    config: PathBuf,

    /// Skip social-data enrichment
    #[arg(long)]
    no_twitter: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Interrupted) => {
            tracing::warn!("interrupted, previous output restored");
            ExitCode::from(130)
        }
        Err(e) => {
            tracing::error!(error = %e, "harvest failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> feedsnap::Result<()> {
    let mut config = Config::from_file(&args.config)?;
    if args.no_twitter {
        config.social.enabled = false;
    }

    let harvester = Harvester::with_defaults(config)?;
    let snapshot = run_with_shutdown(&harvester).await?;

    for error in &snapshot.errors {
        tracing::warn!(key = %error.key, label = %error.label, "source skipped");
    }
    Ok(())
}
