mod commands;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use jira_soap::{logging, Config, JiraSoapBridge};

#[derive(Parser, Debug)]
#[command(name = "jira-soap")]
#[command(about = "Work with Jira issues through its SOAP service")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/jira-soap/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Jira base url, overriding the configured one
  #[arg(long)]
  url: Option<String>,

  /// Keep the token and cache in memory only
  #[arg(long)]
  no_persist: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = logging::init(&logging::default_log_dir())?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override url if specified on command line
  let config = if let Some(url) = args.url {
    let mut config = config;
    config.jira.url = url;
    config
  } else {
    config
  };

  let mut bridge = JiraSoapBridge::connect(config, !args.no_persist).await;
  commands::run(args.command, &mut bridge).await?;

  Ok(())
}
