//! Relayers between the networks of a testnet.
//!
//! Hermes needs a bootstrap container to write its config and start script. Sidecars
//! are configured entirely through the environment of their compose service.
pub mod hermes;

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use tracing::{debug, info};

pub use hermes::HermesRelayer;

use crate::{
    chain::Seed,
    commands::CommandOutput,
    config::{NetworkConfig, RelayerConfig, RelayerKind},
    error::TestnetError,
    runtime::{ContainerRuntime, ExecTarget},
};

/// An environment-configured sidecar, the query relayer or its coordinator.
pub struct SidecarRelayer {
    service: String,
    config: RelayerConfig,
    runtime: Arc<dyn ContainerRuntime>,
}

pub enum Relayer {
    Hermes(HermesRelayer),
    Sidecar(SidecarRelayer),
}

impl Relayer {
    pub fn new(index: usize, config: RelayerConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let service = config.service_name(index);
        match config.kind {
            RelayerKind::Hermes => Relayer::Hermes(HermesRelayer {
                service,
                config,
                runtime,
            }),
            RelayerKind::Neutron | RelayerKind::Coordinator => Relayer::Sidecar(SidecarRelayer {
                service,
                config,
                runtime,
            }),
        }
    }

    fn parts(&self) -> (&str, &Arc<dyn ContainerRuntime>) {
        match self {
            Relayer::Hermes(r) => (&r.service, &r.runtime),
            Relayer::Sidecar(r) => (&r.service, &r.runtime),
        }
    }

    pub fn service(&self) -> &str {
        self.parts().0
    }

    pub async fn bootstrap(
        &self,
        seed: &Seed<'_>,
        networks: &BTreeMap<String, NetworkConfig>,
    ) -> Result<()> {
        match self {
            Relayer::Hermes(relayer) => relayer.bootstrap(seed, networks).await,
            Relayer::Sidecar(relayer) => {
                info!(relayer = %relayer.service, kind = %relayer.config.kind, "sidecar is configured by its environment");
                Ok(())
            }
        }
    }

    pub async fn pause(&self) -> Result<()> {
        let (service, runtime) = self.parts();
        runtime.pause(service).await
    }

    pub async fn unpause(&self) -> Result<()> {
        let (service, runtime) = self.parts();
        runtime.unpause(service).await
    }

    pub async fn restart(&self) -> Result<()> {
        let (service, runtime) = self.parts();
        runtime.restart(service).await
    }

    pub async fn stop(&self) -> Result<()> {
        let (service, runtime) = self.parts();
        runtime.stop(service).await
    }

    /// Run `command` in the running relayer container.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let (service, runtime) = self.parts();
        debug!(relayer = service, command, "exec");
        let output = runtime
            .exec(&ExecTarget::Service(service.to_string()), command)
            .await?;
        if !output.success {
            return Err(TestnetError::CommandFailed {
                target: service.to_string(),
                command: command.to_string(),
                code: output.status_code,
                output: output.combined(),
            }
            .into());
        }
        Ok(output)
    }
}
