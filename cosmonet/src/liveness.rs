//! Waiting for the networks of a fresh testnet to produce their first block.
use std::{collections::BTreeMap, time::Duration};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::TestnetError;

pub const FIRST_BLOCK_TIMEOUT: Duration = Duration::from_secs(30);
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Latest block height reported by the node whose RPC is published on `rpc_port`.
    async fn latest_height(&self, rpc_port: u32) -> Result<u64>;
}

/// Queries the tendermint `/status` endpoint on loopback.
#[derive(Debug, Clone, Default)]
pub struct HttpStatusProbe {
    client: reqwest::Client,
}

impl HttpStatusProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn parse_height(status: &Value) -> Result<u64> {
    let height = &status["result"]["sync_info"]["latest_block_height"];
    match height {
        Value::String(s) => Ok(s.parse()?),
        Value::Number(n) => n.as_u64().ok_or_else(|| anyhow!("bad block height {n}")),
        _ => Err(anyhow!("status carries no block height")),
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn latest_height(&self, rpc_port: u32) -> Result<u64> {
        let status: Value = self
            .client
            .get(format!("http://127.0.0.1:{rpc_port}/status"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_height(&status)
    }
}

/// Poll every network until all of them report a height above zero in the same pass.
/// A failed query counts as not ready yet.
pub async fn await_first_block(
    probe: &dyn StatusProbe,
    rpc_ports: &BTreeMap<String, u32>,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let poll = async {
        loop {
            let ready = join_all(rpc_ports.iter().map(|(network, port)| async move {
                match probe.latest_height(*port).await {
                    Ok(height) => {
                        debug!(%network, height, "status");
                        height > 0
                    }
                    Err(err) => {
                        debug!(%network, %err, "status not available yet");
                        false
                    }
                }
            }))
            .await;
            if ready.iter().all(|r| *r) {
                return;
            }
            tokio::time::sleep(interval).await;
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| TestnetError::FirstBlockTimeout(timeout))?;
    info!("first block produced on every network");
    Ok(())
}
