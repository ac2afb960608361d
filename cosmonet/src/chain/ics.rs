use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use super::{ChainCli, Seed, patch_configs, prepare_staging, pull_configs, push_configs};
use crate::{
    config::{NetworkConfig, ics_service},
    error::TestnetError,
    node::NodeHandle,
    runtime::ContainerRuntime,
};

/// A single consumer node. Its validator set is taken from the provider chain by
/// `add-consumer-section`.
pub struct IcsChain {
    pub(super) network: String,
    pub(super) config: NetworkConfig,
    pub(super) runtime: Arc<dyn ContainerRuntime>,
}

impl IcsChain {
    pub fn new(network: &str, config: NetworkConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            network: network.to_string(),
            config,
            runtime,
        }
    }

    pub(super) async fn bootstrap(&self, seed: &Seed<'_>) -> Result<()> {
        let cli = ChainCli::new(&self.config);
        let staging = seed.staging_dir(&self.network);
        prepare_staging(&staging).await;

        let node =
            NodeHandle::provision(self.runtime.clone(), &ics_service(&self.network)).await?;
        node.exec(&cli.init(&self.network)).await?;
        super::seed_wallets(&node, &cli, seed.wallets).await?;

        pull_configs(&node, &staging).await?;
        patch_configs(&self.config, &staging, None).await?;
        push_configs(&node, &staging).await?;

        // The consumer section is written over the patched genesis, once the node state
        // is reset.
        debug!(network = %self.network, "linking consumer chain");
        node.exec(&cli.unsafe_reset_all()).await?;
        node.exec(&cli.add_consumer_section()).await?;

        super::run_extras(&node, &self.config).await?;
        node.stop().await?;
        info!(network = %self.network, "consumer chain initialised");
        Ok(())
    }

    pub(super) fn no_validators(&self, operation: &'static str) -> anyhow::Error {
        TestnetError::Unsupported {
            network: self.network.clone(),
            operation,
            reason: "consumer chains have no validators of their own",
        }
        .into()
    }
}
