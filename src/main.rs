mod cache;
mod cli;
mod config;
mod error;
mod fetch;
mod http;
mod logging;
mod worker;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "cache-worker")]
#[command(about = "An offline cache that sits between an origin's clients and the network")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cache-worker/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Origin to serve; without a config file the rest is defaulted
  #[arg(short, long, global = true)]
  origin: Option<Url>,

  /// Version tag to use instead of the configured one
  #[arg(long = "version-tag", global = true)]
  version_tag: Option<String>,

  /// More logging (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: cli::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = match (config::Config::try_load(args.config.as_deref())?, &args.origin) {
    (Some(config), Some(origin)) => config::Config {
      origin: origin.clone(),
      ..config
    },
    (Some(config), None) => config,
    (None, Some(origin)) => config::Config::for_origin(origin.clone()),
    (None, None) => {
      return Err(eyre!(
        "No configuration file found. Create one at ~/.config/cache-worker/config.yaml\n\
         or pass --config or --origin."
      ))
    }
  };

  // Override version if specified on command line
  let config = if let Some(version) = args.version_tag {
    config::Config { version, ..config }
  } else {
    config
  };
  config.validate()?;

  let _log_guard = logging::init(&config.logging, args.verbose)?;

  cli::run(args.command, &config).await
}
