use anyhow::{Result, anyhow};
use tokio::process::Command;

use crate::error::TestnetError;

/// Get a string from a u8
pub fn string_or_empty_from_u8(in_val: &[u8]) -> String {
    let result: &str = if let Ok(val) = std::str::from_utf8(in_val) {
        val
    } else {
        "<not_representable>"
    };
    result.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub status_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn fake(ok: bool) -> Self {
        Self {
            status_code: if ok { 0 } else { 1 },
            success: ok,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.as_bytes().to_vec();
        self
    }

    pub fn sanitise_stdout(&self) -> String {
        string_or_empty_from_u8(&self.stdout).trim().to_string()
    }

    pub fn sanitise_stderr(&self) -> String {
        string_or_empty_from_u8(&self.stderr).trim().to_string()
    }

    /// Both streams, for error payloads.
    pub fn combined(&self) -> String {
        let output = self.sanitise_stdout();
        let error = self.sanitise_stderr();
        match (output.is_empty(), error.is_empty()) {
            (true, _) => error,
            (false, true) => output,
            (false, false) => format!("{output}\n{error}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    cmd: Option<String>,
    args: Vec<String>,
    throw_on_failure: bool,
    display_command: bool,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuilder {
    pub fn new() -> Self {
        CommandBuilder {
            cmd: None,
            args: Vec::new(),
            throw_on_failure: true,
            display_command: true,
        }
    }

    pub fn ignore_failures(&mut self) -> &mut Self {
        self.throw_on_failure = false;
        self
    }

    pub fn silent(&mut self) -> &mut Self {
        self.display_command = false;
        self
    }

    pub fn cmd(&mut self, cmd: &str, args: &[&str]) -> &mut Self {
        self.cmd = Some(cmd.to_string());
        self.args = args.iter().map(|x| x.to_string()).collect();
        self
    }

    pub fn more_args<S: AsRef<str>>(&mut self, args: &[S]) -> &mut Self {
        self.args
            .extend(args.iter().map(|x| x.as_ref().to_string()));
        self
    }

    pub fn describe_command(&self) -> Result<String> {
        let cmd_name = self.cmd.as_ref().ok_or(anyhow!("No command specified"))?;
        if self.args.is_empty() {
            Ok(cmd_name.clone())
        } else {
            Ok(format!("{cmd_name} {0}", self.args.join(" ")))
        }
    }

    fn make_command(&self) -> Result<Command> {
        let cmd_name = self.cmd.as_ref().ok_or(anyhow!("No command specified"))?;
        let mut cmd = Command::new(cmd_name);
        if self.display_command {
            tracing::debug!("$ {0}", self.describe_command()?);
        }
        cmd.args(&self.args);
        cmd.kill_on_drop(true);
        Ok(cmd)
    }

    pub async fn run_for_output(&self) -> Result<CommandOutput> {
        let mut cmd = self.make_command()?;
        let out = cmd.output().await?;
        let result_code = out.status.code().unwrap_or(-1);
        let output = CommandOutput {
            success: out.status.success(),
            status_code: result_code,
            stdout: out.stdout,
            stderr: out.stderr,
        };
        if self.throw_on_failure && !output.success {
            return Err(TestnetError::CommandFailed {
                target: "host".to_string(),
                command: self.describe_command()?,
                code: result_code,
                output: output.combined(),
            }
            .into());
        }
        Ok(output)
    }
}
