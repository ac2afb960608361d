use std::time::Duration;

use thiserror::Error;

/// Errors a caller may want to tell apart from generic failures.
///
/// Everything else travels as a plain `anyhow::Error`; these are constructed with
/// `.into()` and can be recovered with `err.downcast_ref::<TestnetError>()`.
#[derive(Debug, Error)]
pub enum TestnetError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("`{command}` failed in {target} with exit code {code}\n{output}")]
    CommandFailed {
        target: String,
        command: String,
        code: i32,
        output: String,
    },
    #[error("timed out after {0:?} waiting for the first block")]
    FirstBlockTimeout(Duration),
    #[error("{operation} is not supported for network {network}: {reason}")]
    Unsupported {
        network: String,
        operation: &'static str,
        reason: &'static str,
    },
    #[error("network {0} is not part of this testnet")]
    UnknownNetwork(String),
    #[error("relayer {0} is not part of this testnet")]
    UnknownRelayer(String),
    #[error("no free instance slot between ports {first} and {last}")]
    NoFreeSlot { first: u16, last: u16 },
    #[error("docker compose version should be 2 or higher, found {0}")]
    ComposeVersion(String),
}

impl TestnetError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TestnetError::InvalidConfig(message.into())
    }
}
