use acme_provider::{
    BucketConfig, BucketState, Provider, Settings, StateFile, apply, plan, provider, telemetry,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::*;

#[derive(Parser)]
#[command(name = "terraform-provider-acme", version, about = "Manage acme buckets on Kubernetes")]
struct Cli {
    /// Log at debug level
    #[arg(long, env = "ACME_DEBUG")]
    debug: bool,

    /// Namespace of the buckets, overrides the settings file
    #[arg(long, short)]
    namespace: Option<String>,

    /// Where the applied state is kept
    #[arg(long, default_value = "acme_bucket.tfstate.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show what apply would do
    Plan {
        /// Resource block (YAML or JSON)
        #[arg(long, short)]
        file: PathBuf,
    },
    /// Create, update or replace the bucket and wait until it is READY
    Apply {
        /// Resource block (YAML or JSON)
        #[arg(long, short)]
        file: PathBuf,
    },
    /// Refresh the state from the cluster
    Refresh,
    /// Delete the bucket and wait until it is gone
    Destroy,
}

fn print_state(state: &BucketState) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.debug)?;

    let state_file = StateFile::new(&cli.state);
    let state = state_file.load().await?;

    if let Command::Plan { file } = &cli.command {
        let config = BucketConfig::from_file(file).await?;
        println!("{:?}", plan(&config, state.as_ref()));
        return Ok(());
    }

    let settings = Settings::new(cli.namespace)?;
    let acme = Provider::configure(&settings).await?;
    info!(
        version = provider::VERSION,
        resources = ?provider::resource_types(),
        "Configured provider {}",
        provider::TYPE_NAME
    );
    let buckets = acme.bucket();

    match cli.command {
        Command::Plan { .. } => Ok(()),
        Command::Apply { file } => {
            let config = BucketConfig::from_file(file).await?;
            let applied = apply(buckets, &state_file, state, &config).await?;
            print_state(&applied)
        }
        Command::Refresh => match state {
            Some(state) => match buckets.read(&state).await? {
                Some(refreshed) => {
                    state_file.save(&refreshed).await?;
                    print_state(&refreshed)
                }
                None => Ok(state_file.remove().await?),
            },
            None => {
                warn!("Nothing to refresh, {} is empty", cli.state.display());
                Ok(())
            }
        },
        Command::Destroy => {
            if let Some(state) = state {
                buckets.delete(&state).await?;
            }
            Ok(state_file.remove().await?)
        }
    }
}
