//! Chain bootstrap and lifecycle.
//!
//! A [`Chain`] is either a self-bootstrapped validator set ([`StandardChain`]) or a single
//! consumer node ([`IcsChain`]). Both bootstrap through one-off containers that share the
//! compose service's volume, then leave the real start to `docker compose up`.
mod cli;
mod ics;
mod standard;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use futures::future::try_join_all;
use serde_json::{Value, json};
use tracing::{debug, info};

pub use cli::ChainCli;
pub use ics::IcsChain;
pub use standard::StandardChain;

use crate::{
    commands::CommandOutput,
    compose::{REST_PORT, RPC_PORT},
    config::{NetworkConfig, NetworkKind, Wallet},
    error::TestnetError,
    node::NodeHandle,
    overrides,
    runtime::{ContainerRuntime, ExecTarget},
};

const GENESIS: &str = "genesis.json";
const CONFIG_TOML: &str = "config.toml";
const APP_TOML: &str = "app.toml";

/// What every chain is seeded with.
#[derive(Debug, Clone, Copy)]
pub struct Seed<'a> {
    pub master_mnemonic: &'a str,
    /// User wallets plus relayer wallets.
    pub wallets: &'a BTreeMap<String, Wallet>,
    /// Root under which per-network staging directories are created.
    pub staging_root: &'a Path,
    /// Compose project name, used to keep staging directories of parallel testnets apart.
    pub project: &'a str,
}

impl Seed<'_> {
    pub fn staging_dir(&self, network: &str) -> PathBuf {
        self.staging_root
            .join("cosmonet")
            .join(format!("{network}_{}", self.project))
    }
}

pub enum Chain {
    Standard(StandardChain),
    Ics(IcsChain),
}

impl Chain {
    pub fn new(network: &str, config: NetworkConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        match config.kind {
            NetworkKind::Default => Chain::Standard(StandardChain::new(network, config, runtime)),
            NetworkKind::Ics => Chain::Ics(IcsChain::new(network, config, runtime)),
        }
    }

    fn parts(&self) -> (&str, &NetworkConfig, &Arc<dyn ContainerRuntime>) {
        match self {
            Chain::Standard(chain) => (&chain.network, &chain.config, &chain.runtime),
            Chain::Ics(chain) => (&chain.network, &chain.config, &chain.runtime),
        }
    }

    pub fn name(&self) -> &str {
        self.parts().0
    }

    pub fn config(&self) -> &NetworkConfig {
        self.parts().1
    }

    /// Take fresh containers to an initialised, stopped network.
    pub async fn bootstrap(&self, seed: &Seed<'_>) -> Result<()> {
        info!(network = self.name(), kind = %self.config().kind, "bootstrapping network");
        match self {
            Chain::Standard(chain) => chain.bootstrap(seed).await,
            Chain::Ics(chain) => chain.bootstrap(seed).await,
        }?;
        info!(network = self.name(), "network bootstrapped");
        Ok(())
    }

    async fn for_each_service(&self, op: ServiceOp) -> Result<()> {
        let (network, config, runtime) = self.parts();
        for service in config.services(network) {
            debug!(network, %service, ?op, "service operation");
            match op {
                ServiceOp::Start => runtime.start(&service).await?,
                ServiceOp::Stop => runtime.stop(&service).await?,
                ServiceOp::Restart => runtime.restart(&service).await?,
                ServiceOp::Pause => runtime.pause(&service).await?,
                ServiceOp::Unpause => runtime.unpause(&service).await?,
            }
        }
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.for_each_service(ServiceOp::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.for_each_service(ServiceOp::Stop).await
    }

    pub async fn restart(&self) -> Result<()> {
        self.for_each_service(ServiceOp::Restart).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.for_each_service(ServiceOp::Pause).await
    }

    pub async fn unpause(&self) -> Result<()> {
        self.for_each_service(ServiceOp::Unpause).await
    }

    /// (Re)start validator `index` (0-based).
    pub async fn start_validator(&self, index: usize) -> Result<()> {
        match self {
            Chain::Standard(chain) => chain.start_validator(index).await,
            Chain::Ics(chain) => Err(chain.no_validators("start_validator")),
        }
    }

    pub async fn stop_validator(&self, index: usize) -> Result<()> {
        match self {
            Chain::Standard(chain) => chain.stop_validator(index).await,
            Chain::Ics(chain) => Err(chain.no_validators("stop_validator")),
        }
    }

    /// Run `command` in the node that answers for the network.
    pub async fn exec_somewhere(&self, command: &str) -> Result<CommandOutput> {
        let (network, config, runtime) = self.parts();
        let service = config.primary_service(network);
        debug!(network, %service, command, "exec");
        let output = runtime
            .exec(&ExecTarget::Service(service.clone()), command)
            .await?;
        if !output.success {
            return Err(TestnetError::CommandFailed {
                target: service,
                command: command.to_string(),
                code: output.status_code,
                output: output.combined(),
            }
            .into());
        }
        Ok(output)
    }
}

#[derive(Debug, Clone, Copy)]
enum ServiceOp {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
}

/// Remove leftovers of an earlier run and create the staging directory. Failures are
/// ignored: a concurrent run may be doing the same.
async fn prepare_staging(dir: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(dir).await {
        debug!(dir = %dir.display(), %err, "staging directory not removed");
    }
    if let Err(err) = tokio::fs::create_dir_all(dir).await {
        debug!(dir = %dir.display(), %err, "staging directory not created");
    }
}

/// Import a key and add its genesis account, in order, in one container.
async fn seed_account(
    node: &NodeHandle,
    cli: &ChainCli<'_>,
    name: &str,
    mnemonic: &str,
    account: Option<usize>,
    balance: &str,
) -> Result<()> {
    node.exec(&cli.recover_key(name, mnemonic, account)).await?;
    node.exec(&cli.add_genesis_account(name, balance)).await?;
    Ok(())
}

async fn seed_wallets(
    node: &NodeHandle,
    cli: &ChainCli<'_>,
    wallets: &BTreeMap<String, Wallet>,
) -> Result<()> {
    for (name, wallet) in wallets {
        seed_account(node, cli, name, &wallet.mnemonic, None, &wallet.balance).await?;
    }
    Ok(())
}

fn config_path(file: &str) -> String {
    format!("{}/{file}", cli::CONFIG_DIR)
}

async fn pull_configs(node: &NodeHandle, staging: &Path) -> Result<()> {
    try_join_all(
        [GENESIS, CONFIG_TOML, APP_TOML]
            .map(|file| async move { node.copy_out(&config_path(file), &staging.join(file)).await }),
    )
    .await?;
    Ok(())
}

/// Apply the configured overrides to the staged files. `peers` is set as the persistent
/// peer list when present.
async fn patch_configs(config: &NetworkConfig, staging: &Path, peers: Option<String>) -> Result<()> {
    overrides::patch_json_file(&staging.join(GENESIS), &config.genesis_opts).await?;

    let mut node_config: BTreeMap<String, Value> = BTreeMap::new();
    if let Some(peers) = peers {
        node_config.insert("p2p.persistent_peers".to_string(), json!(peers));
    }
    node_config.insert("rpc.laddr".to_string(), json!(format!("tcp://0.0.0.0:{RPC_PORT}")));
    node_config.insert(
        "api.address".to_string(),
        json!(format!("tcp://0.0.0.0:{REST_PORT}")),
    );
    node_config.extend(config.config_opts.clone());
    overrides::patch_toml_file(&staging.join(CONFIG_TOML), &node_config).await?;

    overrides::patch_toml_file(&staging.join(APP_TOML), &config.app_opts).await?;
    Ok(())
}

async fn push_configs(node: &NodeHandle, staging: &Path) -> Result<()> {
    try_join_all(
        [GENESIS, CONFIG_TOML, APP_TOML]
            .map(|file| async move { node.copy_in(&staging.join(file), &config_path(file)).await }),
    )
    .await?;
    Ok(())
}

/// Upload host files to `/opt`, then run the post-init commands.
async fn run_extras(node: &NodeHandle, config: &NetworkConfig) -> Result<()> {
    for path in &config.upload {
        node.copy_in(Path::new(path), &format!("{}/", cli::HOME))
            .await?;
    }
    node.exec_all(&config.post_init).await
}
