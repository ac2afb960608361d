use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures::future::try_join_all;
use itertools::Itertools;
use tracing::{debug, info};

use super::{ChainCli, Seed, cli, patch_configs, prepare_staging, pull_configs, push_configs};
use crate::{
    compose::P2P_PORT,
    config::{NetworkConfig, validator_service},
    node::NodeHandle,
    runtime::ContainerRuntime,
};

/// A network whose genesis validator set is built from gentxs of its own validators.
pub struct StandardChain {
    pub(super) network: String,
    pub(super) config: NetworkConfig,
    pub(super) runtime: Arc<dyn ContainerRuntime>,
}

impl StandardChain {
    pub fn new(network: &str, config: NetworkConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            network: network.to_string(),
            config,
            runtime,
        }
    }

    pub(super) async fn bootstrap(&self, seed: &Seed<'_>) -> Result<()> {
        let count = self.config.validator_count();
        if count == 0 {
            return Err(anyhow!("network {} has no validators", self.network));
        }
        let cli = ChainCli::new(&self.config);
        let staging = seed.staging_dir(&self.network);
        prepare_staging(&staging).await;

        let nodes = try_join_all((0..count).map(|i| {
            let runtime = self.runtime.clone();
            async move { NodeHandle::provision(runtime, &validator_service(&self.network, i)).await }
        }))
        .await?;
        let first = &nodes[0];

        debug!(network = %self.network, "initialising validators");
        try_join_all(nodes.iter().enumerate().map(|(i, node)| {
            let moniker = format!("val{}{i}", self.network);
            let cli = &cli;
            async move { node.exec(&cli.init(&moniker)).await }
        }))
        .await?;

        // Every container builds its own draft genesis holding every account, so that
        // each can sign a gentx against it.
        debug!(network = %self.network, "seeding validator keys and accounts");
        try_join_all(nodes.iter().map(|node| {
            let cli = &cli;
            async move {
                for v in 0..count {
                    super::seed_account(
                        node,
                        cli,
                        &format!("val{}", v + 1),
                        seed.master_mnemonic,
                        Some(v + 1),
                        self.config.validator_balance(v)?,
                    )
                    .await?;
                }
                super::seed_wallets(node, cli, seed.wallets).await
            }
        }))
        .await?;

        debug!(network = %self.network, "creating gentxs");
        try_join_all(nodes.iter().enumerate().map(|(i, node)| {
            let cli = &cli;
            async move {
                node.exec(&cli.gentx(&format!("val{}", i + 1), self.config.validator_balance(i)?))
                    .await
            }
        }))
        .await?;

        debug!(network = %self.network, "collecting gentxs");
        let gentx_dir = format!("{}/gentx", cli::CONFIG_DIR);
        try_join_all(nodes.iter().map(|node| node.copy_out(&gentx_dir, &staging))).await?;
        first
            .copy_in(&staging.join("gentx"), &format!("{}/", cli::CONFIG_DIR))
            .await?;

        let show_node_id = cli.show_node_id();
        let node_ids = try_join_all(nodes.iter().map(|node| node.exec(&show_node_id))).await?;
        let peers = node_ids
            .iter()
            .zip(&nodes)
            .map(|(id, node)| format!("{}@{}:{P2P_PORT}", id.sanitise_stdout(), node.service()))
            .join(",");
        debug!(network = %self.network, %peers, "harvested peers");

        first.exec(&cli.collect_gentxs()).await?;

        pull_configs(first, &staging).await?;
        patch_configs(&self.config, &staging, Some(peers)).await?;
        try_join_all(nodes.iter().map(|node| push_configs(node, &staging))).await?;

        super::run_extras(first, &self.config).await?;

        try_join_all(nodes.iter().map(NodeHandle::stop)).await?;
        info!(network = %self.network, validators = count, "validator set initialised");
        Ok(())
    }

    pub(super) async fn start_validator(&self, index: usize) -> Result<()> {
        let service = self.validator(index)?;
        info!(network = %self.network, %service, "starting validator");
        self.runtime.restart(&service).await
    }

    pub(super) async fn stop_validator(&self, index: usize) -> Result<()> {
        let service = self.validator(index)?;
        info!(network = %self.network, %service, "stopping validator");
        self.runtime.stop(&service).await
    }

    fn validator(&self, index: usize) -> Result<String> {
        if index >= self.config.validator_count() {
            return Err(anyhow!(
                "network {} has {} validators, there is no validator {}",
                self.network,
                self.config.validator_count(),
                index + 1
            ));
        }
        Ok(validator_service(&self.network, index))
    }
}
