use std::path::Path;

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;

use super::{ComposeProject, ContainerRuntime, ExecTarget};
use crate::commands::{CommandBuilder, CommandOutput};

/// Drives the `docker` and `docker compose` CLIs for one compose project.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    project: ComposeProject,
}

impl DockerCompose {
    pub fn new(project: ComposeProject) -> Self {
        Self { project }
    }

    fn file_str(&self) -> Result<&str> {
        self.project
            .file
            .to_str()
            .ok_or(anyhow!("Cannot convert path to string"))
    }

    fn compose(&self, args: &[&str]) -> Result<CommandBuilder> {
        let mut builder = CommandBuilder::new();
        builder
            .cmd(
                "docker",
                &["compose", "-p", &self.project.name, "-f", self.file_str()?],
            )
            .more_args(args);
        Ok(builder)
    }

    async fn compose_service(&self, action: &str, service: &str) -> Result<()> {
        self.compose(&[action, service])?
            .run_for_output()
            .await
            .with_context(|| format!("docker compose {action} {service}"))?;
        Ok(())
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or(anyhow!("Cannot convert path to string"))
}

#[async_trait]
impl ContainerRuntime for DockerCompose {
    async fn version(&self) -> Result<String> {
        let output = CommandBuilder::new()
            .cmd("docker", &["compose", "version", "--short"])
            .silent()
            .run_for_output()
            .await?;
        Ok(output.sanitise_stdout())
    }

    async fn run_detached(&self, service: &str) -> Result<String> {
        let output = self
            .compose(&[
                "run",
                "--rm",
                "-d",
                "--entrypoint",
                "sleep",
                service,
                "infinity",
            ])?
            .run_for_output()
            .await
            .with_context(|| format!("Cannot start a container for {service}"))?;
        let container = output.sanitise_stdout();
        if container.is_empty() {
            return Err(anyhow!("docker compose run returned no container for {service}"));
        }
        Ok(container)
    }

    async fn exec(&self, target: &ExecTarget, command: &str) -> Result<CommandOutput> {
        let mut builder = match target {
            ExecTarget::Container(id) => {
                let mut builder = CommandBuilder::new();
                builder.cmd("docker", &["exec", id]);
                builder
            }
            ExecTarget::Service(service) => self.compose(&["exec", "-T", service])?,
        };
        builder
            .more_args(&["sh", "-c", command])
            .ignore_failures()
            .run_for_output()
            .await
    }

    async fn copy_out(&self, container: &str, src: &str, dst: &Path) -> Result<()> {
        CommandBuilder::new()
            .cmd("docker", &["cp", &format!("{container}:{src}"), path_str(dst)?])
            .run_for_output()
            .await?;
        Ok(())
    }

    async fn copy_in(&self, src: &Path, container: &str, dst: &str) -> Result<()> {
        CommandBuilder::new()
            .cmd("docker", &["cp", path_str(src)?, &format!("{container}:{dst}")])
            .run_for_output()
            .await?;
        Ok(())
    }

    async fn stop_container(&self, container: &str) -> Result<()> {
        CommandBuilder::new()
            .cmd("docker", &["stop", "-t", "0", container])
            .run_for_output()
            .await?;
        Ok(())
    }

    async fn stop(&self, service: &str) -> Result<()> {
        self.compose_service("stop", service).await
    }

    async fn start(&self, service: &str) -> Result<()> {
        self.compose_service("start", service).await
    }

    async fn restart(&self, service: &str) -> Result<()> {
        self.compose_service("restart", service).await
    }

    async fn pause(&self, service: &str) -> Result<()> {
        self.compose_service("pause", service).await
    }

    async fn unpause(&self, service: &str) -> Result<()> {
        self.compose_service("unpause", service).await
    }

    async fn up(&self) -> Result<()> {
        self.compose(&["up", "-d"])?.run_for_output().await?;
        Ok(())
    }

    async fn down(&self, flags: &[&str]) -> Result<()> {
        let mut builder = self.compose(&["down"])?;
        builder.more_args(flags).run_for_output().await?;
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let output = self
            .compose(&["ps", "-a", "--format", "{{.Name}}"])?
            .run_for_output()
            .await?;
        Ok(output
            .sanitise_stdout()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn stop_containers(&self, containers: &[String]) -> Result<()> {
        if containers.is_empty() {
            return Ok(());
        }
        let mut builder = CommandBuilder::new();
        builder
            .cmd("docker", &["stop", "-t", "0"])
            .more_args(containers)
            .run_for_output()
            .await?;
        Ok(())
    }
}
