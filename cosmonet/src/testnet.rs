//! The testnet orchestrator: from a config to a running set of networks and relayers.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Result, anyhow};
use futures::future::try_join_all;
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::{
    chain::{Chain, Seed},
    commands::CommandOutput,
    compose::{ComposeFile, NetworkPorts, check_ports, network_ports},
    config::{RelayerKind, TestnetConfig},
    error::TestnetError,
    liveness::{self, FIRST_BLOCK_TIMEOUT, HttpStatusProbe, POLL_INTERVAL, StatusProbe},
    mutex::InstanceSlot,
    relayer::Relayer,
    runtime::{ComposeProject, ContainerRuntime, DockerCompose},
};

const DOWN_FLAGS: [&str; 2] = ["-v", "--remove-orphans"];

pub struct Testnet {
    config: TestnetConfig,
    runtime: Arc<dyn ContainerRuntime>,
    project: ComposeProject,
    staging_root: PathBuf,
    offset: u32,
    ports: BTreeMap<String, NetworkPorts>,
    chains: BTreeMap<String, Chain>,
    relayers: Vec<Relayer>,
    _slot: Option<InstanceSlot>,
}

impl Testnet {
    /// Validate `config` and lay out the testnet. Nothing is started.
    ///
    /// The port offset comes from the config when set, else from `slot`.
    pub fn new(
        config: TestnetConfig,
        runtime: Arc<dyn ContainerRuntime>,
        project: ComposeProject,
        staging_root: PathBuf,
        slot: Option<InstanceSlot>,
    ) -> Result<Self> {
        config.validate()?;
        let offset = config
            .port_offset
            .or(slot.as_ref().map(InstanceSlot::port_offset))
            .unwrap_or(0);
        let ports = network_ports(&config, offset);
        check_ports(&ports)?;
        let chains = config
            .networks
            .iter()
            .map(|(name, network)| {
                (
                    name.clone(),
                    Chain::new(name, network.clone(), runtime.clone()),
                )
            })
            .collect();
        let relayers = config
            .relayers
            .iter()
            .enumerate()
            .map(|(index, relayer)| Relayer::new(index, relayer.clone(), runtime.clone()))
            .collect();
        Ok(Self {
            config,
            runtime,
            project,
            staging_root,
            offset,
            ports,
            chains,
            relayers,
            _slot: slot,
        })
    }

    /// Start a docker-backed testnet described by `config`, writing its compose file into
    /// `workdir`.
    pub async fn launch(config: TestnetConfig, workdir: &Path) -> Result<Self> {
        config.validate()?;
        let slot = InstanceSlot::acquire()?;
        info!(slot = slot.index(), "acquired instance slot");
        let project = ComposeProject::for_context(config.context.as_deref(), workdir);
        let runtime = Arc::new(DockerCompose::new(project.clone()));
        let testnet = Self::new(config, runtime, project, std::env::temp_dir(), Some(slot))?;
        testnet.start(&HttpStatusProbe::new()).await?;
        Ok(testnet)
    }

    /// Bring the testnet up: compose file, network and relayer bootstraps, `up`, then the
    /// optional first block wait and the post-start hooks.
    pub async fn start(&self, probe: &dyn StatusProbe) -> Result<()> {
        let context = self.project.name.as_str();
        info!(context, "starting testnet");
        self.check_compose_version().await?;
        if tokio::fs::try_exists(&self.project.file).await? {
            self.remove_stale_stack().await?;
        }

        let compose = ComposeFile::generate(&self.config, self.offset)?;
        compose.write(&self.project.file).await?;
        debug!(file = %self.project.file.display(), "compose file written");
        // Volumes of an earlier run with the same project name would shadow fresh state.
        if let Err(err) = self.runtime.down(&DOWN_FLAGS).await {
            debug!(%err, "nothing to bring down");
        }

        let wallets = self.config.merged_wallets();
        let seed = Seed {
            master_mnemonic: &self.config.master_mnemonic,
            wallets: &wallets,
            staging_root: &self.staging_root,
            project: context,
        };
        try_join_all(self.chains.values().map(|chain| chain.bootstrap(&seed))).await?;
        for relayer in &self.relayers {
            relayer.bootstrap(&seed, &self.config.networks).await?;
        }

        info!(context, "bringing the stack up");
        self.runtime.up().await?;

        if self.config.await_first_block {
            liveness::await_first_block(
                probe,
                &self.rpc_ports(),
                FIRST_BLOCK_TIMEOUT,
                POLL_INTERVAL,
            )
            .await?;
        }

        for chain in self.chains.values() {
            for command in &chain.config().post_start {
                debug!(network = chain.name(), %command, "post start");
                chain.exec_somewhere(command).await?;
            }
        }
        info!(context, "testnet started");
        Ok(())
    }

    async fn check_compose_version(&self) -> Result<()> {
        let version = self.runtime.version().await?;
        let re = Regex::new(r"^v?(\d+)\.")?;
        let major = re
            .captures(&version)
            .and_then(|c| c[1].parse::<u32>().ok())
            .unwrap_or(0);
        if major < 2 {
            error!(%version, "unsupported docker compose");
            return Err(TestnetError::ComposeVersion(version).into());
        }
        debug!(%version, "docker compose version is ok");
        Ok(())
    }

    /// A compose file from an earlier run is present. Bring its stack down, stopping
    /// stragglers by hand if `down` alone fails.
    async fn remove_stale_stack(&self) -> Result<()> {
        if let Err(err) = self.runtime.down(&DOWN_FLAGS).await {
            warn!(%err, "docker compose down failed, stopping containers first");
            let containers = self.runtime.list_containers().await?;
            debug!(?containers, "containers to stop");
            self.runtime.stop_containers(&containers).await?;
            self.runtime.down(&DOWN_FLAGS).await?;
        }
        Ok(())
    }

    pub fn config(&self) -> &TestnetConfig {
        &self.config
    }

    pub fn ports(&self) -> &BTreeMap<String, NetworkPorts> {
        &self.ports
    }

    pub fn rpc_ports(&self) -> BTreeMap<String, u32> {
        self.ports
            .iter()
            .map(|(name, ports)| (name.clone(), ports.rpc))
            .collect()
    }

    pub fn chain(&self, network: &str) -> Result<&Chain> {
        self.chains
            .get(network)
            .ok_or_else(|| TestnetError::UnknownNetwork(network.to_string()).into())
    }

    fn relayer(&self, kind: RelayerKind, index: usize) -> Result<&Relayer> {
        let service = format!("relayer_{kind}{index}");
        self.relayers
            .iter()
            .find(|r| r.service() == service)
            .ok_or_else(|| TestnetError::UnknownRelayer(service).into())
    }

    pub async fn pause_relayer(&self, kind: RelayerKind, index: usize) -> Result<()> {
        self.relayer(kind, index)?.pause().await
    }

    pub async fn resume_relayer(&self, kind: RelayerKind, index: usize) -> Result<()> {
        self.relayer(kind, index)?.unpause().await
    }

    pub async fn restart_relayer(&self, kind: RelayerKind, index: usize) -> Result<()> {
        self.relayer(kind, index)?.restart().await
    }

    pub async fn stop_relayer(&self, kind: RelayerKind, index: usize) -> Result<()> {
        self.relayer(kind, index)?.stop().await
    }

    pub async fn execute_in_relayer(
        &self,
        kind: RelayerKind,
        index: usize,
        command: &str,
    ) -> Result<CommandOutput> {
        self.relayer(kind, index)?.exec(command).await
    }

    pub async fn pause_network(&self, network: &str) -> Result<()> {
        self.chain(network)?.pause().await
    }

    pub async fn resume_network(&self, network: &str) -> Result<()> {
        self.chain(network)?.unpause().await
    }

    pub async fn restart_network(&self, network: &str) -> Result<()> {
        self.chain(network)?.restart().await
    }

    pub async fn start_validator(&self, network: &str, index: usize) -> Result<()> {
        self.chain(network)?.start_validator(index).await
    }

    pub async fn stop_validator(&self, network: &str, index: usize) -> Result<()> {
        self.chain(network)?.stop_validator(index).await
    }

    pub async fn execute_in_network(&self, network: &str, command: &str) -> Result<CommandOutput> {
        self.chain(network)?.exec_somewhere(command).await
    }

    /// Bring everything down, volumes included, and release the instance slot.
    pub async fn stop(self) -> Result<()> {
        info!(context = %self.project.name, "stopping testnet");
        self.runtime.down(&["-v", "--remove-orphans", "-t0"]).await?;
        info!(context = %self.project.name, "testnet stopped");
        Ok(())
    }
}

/// Bring down the stack of `config` started by another process.
pub async fn teardown(config: &TestnetConfig, workdir: &Path) -> Result<()> {
    config.validate()?;
    let project = ComposeProject::for_context(config.context.as_deref(), workdir);
    if !tokio::fs::try_exists(&project.file).await? {
        return Err(anyhow!(
            "{} does not exist, nothing to stop",
            project.file.display()
        ));
    }
    let runtime = DockerCompose::new(project.clone());
    runtime.down(&["-v", "--remove-orphans", "-t0"]).await?;
    info!(context = %project.name, "testnet stopped");
    Ok(())
}
