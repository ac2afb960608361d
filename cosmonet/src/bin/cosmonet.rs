use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use cosmonet::{config::TestnetConfig, testnet};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(about = "Start and stop local cosmos test networks")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Overrides the config's `loglevel`. `RUST_LOG` wins over both.
    #[clap(long, global = true)]
    log_level: Option<String>,

    #[clap(long, global = true, default_value = "false")]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bootstrap every network and relayer of a config, then bring them up
    Start(ConfigArg),
    /// Bring a testnet down, removing its volumes
    Stop(ConfigArg),
}

#[derive(Args, Debug)]
struct ConfigArg {
    /// Config file, TOML or JSON
    config: PathBuf,

    /// Where the compose file lives. Defaults to the current directory.
    #[clap(long)]
    workdir: Option<PathBuf>,
}

impl ConfigArg {
    fn workdir(&self) -> Result<PathBuf> {
        match &self.workdir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

fn init_logging(cli: &Cli, config: &TestnetConfig) {
    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(config.log_level())
        .to_string();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cosmonet={level}")));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_line_number(true)
        .with_ansi(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Start(arg) => {
            let config = TestnetConfig::from_file(&arg.config).await?;
            init_logging(&cli, &config);
            println!("{}", "Starting".yellow());
            let testnet = testnet::Testnet::launch(config, &arg.workdir()?).await?;
            for (network, ports) in testnet.ports() {
                println!(
                    "{} rpc {} rest {} grpc {}",
                    network.bold(),
                    ports.rpc,
                    ports.rest,
                    ports.grpc
                );
            }
            println!("{}", "Done".green());
        }
        Commands::Stop(arg) => {
            let config = TestnetConfig::from_file(&arg.config).await?;
            init_logging(&cli, &config);
            println!("{}", "Stopping".yellow());
            testnet::teardown(&config, &arg.workdir()?).await?;
            println!("{}", "Stopped".green());
        }
    }
    Ok(())
}
