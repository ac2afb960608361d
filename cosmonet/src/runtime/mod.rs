//! The container runtime seam.
//!
//! Everything the bootstrappers and the orchestrator need from docker goes through
//! [`ContainerRuntime`], so whole bootstraps can be exercised against an in-memory
//! implementation.
mod docker;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

pub use docker::DockerCompose;

use crate::commands::CommandOutput;

/// Where a command runs: a container started for bootstrap, or a compose service
/// of the running stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecTarget {
    Container(String),
    Service(String),
}

/// The compose project every runtime call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    /// Project name, used as `docker compose -p`. Also namespaces staging directories.
    pub name: String,
    /// The generated compose file.
    pub file: PathBuf,
}

impl ComposeProject {
    pub fn new(name: &str, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            file: file.into(),
        }
    }

    /// Compose file name for a context, placed in `workdir`.
    pub fn for_context(context: Option<&str>, workdir: &Path) -> Self {
        match context {
            Some(context) => Self::new(
                context,
                workdir.join(format!("docker-compose-{context}.yml")),
            ),
            None => Self::new(crate::config::DEFAULT_CONTEXT, workdir.join("docker-compose.yml")),
        }
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// The compose version string, e.g. `2.27.0`.
    async fn version(&self) -> Result<String>;

    /// Start a one-off, detached container for `service` whose entrypoint is replaced by
    /// `sleep infinity`. Returns the container id.
    async fn run_detached(&self, service: &str) -> Result<String>;

    /// Run `command` through `sh -c`. A non-zero exit is not an error at this level.
    async fn exec(&self, target: &ExecTarget, command: &str) -> Result<CommandOutput>;

    /// Copy `container:src` to the host path `dst`.
    async fn copy_out(&self, container: &str, src: &str, dst: &Path) -> Result<()>;

    /// Copy the host path `src` to `container:dst`.
    async fn copy_in(&self, src: &Path, container: &str, dst: &str) -> Result<()>;

    async fn stop_container(&self, container: &str) -> Result<()>;

    async fn stop(&self, service: &str) -> Result<()>;
    async fn start(&self, service: &str) -> Result<()>;
    async fn restart(&self, service: &str) -> Result<()>;
    async fn pause(&self, service: &str) -> Result<()>;
    async fn unpause(&self, service: &str) -> Result<()>;

    /// Bring the whole project up, detached.
    async fn up(&self) -> Result<()>;

    /// Bring the project down with extra flags such as `-v`.
    async fn down(&self, flags: &[&str]) -> Result<()>;

    /// Names of all containers, running or not, that belong to the project.
    async fn list_containers(&self) -> Result<Vec<String>>;

    async fn stop_containers(&self, containers: &[String]) -> Result<()>;
}
