use std::{path::Path, sync::Arc};

use anyhow::{Context as _, Result};
use tracing::debug;

use crate::{
    commands::CommandOutput,
    error::TestnetError,
    runtime::{ContainerRuntime, ExecTarget},
};

/// One bootstrap container, started with its entrypoint replaced by `sleep infinity`.
#[derive(Clone)]
pub struct NodeHandle {
    runtime: Arc<dyn ContainerRuntime>,
    service: String,
    container: String,
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("service", &self.service)
            .field("container", &self.container)
            .finish()
    }
}

impl NodeHandle {
    pub async fn provision(runtime: Arc<dyn ContainerRuntime>, service: &str) -> Result<Self> {
        let container = runtime
            .run_detached(service)
            .await
            .with_context(|| format!("Cannot provision {service}"))?;
        debug!(service, container = %container, "provisioned bootstrap container");
        Ok(Self {
            runtime,
            service: service.to_string(),
            container,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Run `command` in the container. A non-zero exit becomes
    /// [`TestnetError::CommandFailed`] carrying the captured output.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let output = self
            .runtime
            .exec(&ExecTarget::Container(self.container.clone()), command)
            .await?;
        if !output.success {
            return Err(TestnetError::CommandFailed {
                target: self.service.clone(),
                command: command.to_string(),
                code: output.status_code,
                output: output.combined(),
            }
            .into());
        }
        Ok(output)
    }

    /// Run each command in turn, stopping at the first failure.
    pub async fn exec_all(&self, commands: &[String]) -> Result<()> {
        for command in commands {
            self.exec(command).await?;
        }
        Ok(())
    }

    pub async fn copy_out(&self, src: &str, dst: &Path) -> Result<()> {
        self.runtime
            .copy_out(&self.container, src, dst)
            .await
            .with_context(|| format!("Cannot copy {src} out of {}", self.service))
    }

    pub async fn copy_in(&self, src: &Path, dst: &str) -> Result<()> {
        self.runtime
            .copy_in(src, &self.container, dst)
            .await
            .with_context(|| format!("Cannot copy {} into {}", src.display(), self.service))
    }

    pub async fn stop(&self) -> Result<()> {
        self.runtime
            .stop_container(&self.container)
            .await
            .with_context(|| format!("Cannot stop the bootstrap container of {}", self.service))
    }
}
