//! The hermes IBC relayer: config generation, key import and the channel start script.
use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context as _, Result};
use serde::Serialize;
use serde_json::{Value, json};
use tera::{Context, Tera};
use tracing::{debug, info};

use crate::{
    chain::Seed,
    compose::{GRPC_PORT, RPC_PORT},
    config::{NetworkConfig, NetworkKind, RelayerConfig},
    error::TestnetError,
    node::NodeHandle,
    overrides,
    runtime::ContainerRuntime,
};

const HERMES_HOME: &str = "/root/.hermes";
const START_SCRIPT: &str = "/root/start.sh";
const MNEMONIC_FILE: &str = "/root/mnemonic.txt";

pub struct HermesRelayer {
    pub(super) service: String,
    pub(super) config: RelayerConfig,
    pub(super) runtime: Arc<dyn ContainerRuntime>,
}

/// Chain section for a consumer chain.
fn consumer_chain_profile() -> Value {
    json!({
        "id": "",
        "rpc_addr": "",
        "grpc_addr": "",
        "websocket_addr": "",
        "rpc_timeout": "10s",
        "account_prefix": "",
        "key_name": "",
        "store_prefix": "ibc",
        "default_gas": 3000000,
        "max_gas": 5000000,
        "gas_price": { "price": 0.005, "denom": "" },
        "gas_multiplier": 1.1,
        "max_msg_num": 20,
        "max_tx_size": 180000,
        "clock_drift": "15s",
        "max_block_time": "30s",
        "trusting_period": "320hours",
        "trust_threshold": { "numerator": "1", "denominator": "3" },
        "address_type": { "derivation": "cosmos" },
        "unbonding_period": "20days",
        "packet_filter": { "policy": "allow", "list": [["*", "*"]] },
    })
}

fn standard_chain_profile() -> Value {
    json!({
        "id": "",
        "rpc_addr": "",
        "grpc_addr": "",
        "websocket_addr": "",
        "rpc_timeout": "10s",
        "account_prefix": "",
        "key_name": "",
        "store_prefix": "ibc",
        "default_gas": 5000000,
        "max_gas": 15000000,
        "gas_price": { "price": 0.007, "denom": "" },
        "gas_multiplier": 1.1,
        "max_msg_num": 30,
        "max_tx_size": 2097152,
        "clock_drift": "20s",
        "max_block_time": "10s",
        "trusting_period": "14days",
        "unbonding_period": "504h0m0s",
        "trust_threshold": { "numerator": "1", "denominator": "3" },
        "address_type": { "derivation": "cosmos" },
        "packet_filter": { "policy": "allow", "list": [["*", "*"]] },
    })
}

fn base_config(log_level: &str) -> Value {
    json!({
        "global": { "log_level": log_level },
        "mode": {
            "clients": { "enabled": true, "refresh": true, "misbehaviour": true },
            "connections": { "enabled": true },
            "channels": { "enabled": true },
            "packets": {
                "enabled": true,
                "clear_interval": 100,
                "clear_on_start": true,
                "tx_confirmation": true,
            },
        },
        "rest": { "enabled": true, "host": "127.0.0.1", "port": 3000 },
        "telemetry": { "enabled": true, "host": "0.0.0.0", "port": 3001 },
        "chains": [],
    })
}

fn chain_section(network: &str, config: &NetworkConfig) -> Value {
    let mut section = match config.kind {
        NetworkKind::Ics => consumer_chain_profile(),
        NetworkKind::Default => standard_chain_profile(),
    };
    let node = config.primary_service(network);
    section["id"] = json!(config.chain_id);
    section["rpc_addr"] = json!(format!("http://{node}:{RPC_PORT}"));
    section["grpc_addr"] = json!(format!("http://{node}:{GRPC_PORT}"));
    section["websocket_addr"] = json!(format!("ws://{node}:{RPC_PORT}/websocket"));
    section["account_prefix"] = json!(config.prefix);
    section["key_name"] = json!(key_name(network));
    section["gas_price"]["denom"] = json!(config.denom);
    section
}

fn key_name(network: &str) -> String {
    format!("key-{network}")
}

fn network<'a>(
    networks: &'a BTreeMap<String, NetworkConfig>,
    name: &str,
) -> Result<&'a NetworkConfig> {
    networks
        .get(name)
        .ok_or_else(|| TestnetError::UnknownNetwork(name.to_string()).into())
}

/// The relayer config document, before serialisation to TOML.
pub fn relayer_config(
    relayer: &RelayerConfig,
    networks: &BTreeMap<String, NetworkConfig>,
) -> Result<Value> {
    let mut config = base_config(&relayer.log_level);
    let chains = relayer
        .networks
        .iter()
        .map(|name| Ok(chain_section(name, network(networks, name)?)))
        .collect::<Result<Vec<_>>>()?;
    config["chains"] = Value::Array(chains);
    overrides::apply(&mut config, &relayer.config)?;
    Ok(config)
}

#[derive(Serialize)]
struct Channel<'a> {
    a_chain: &'a str,
    b_chain: &'a str,
}

/// The container start script: open each channel, retrying as the policy allows, then
/// relay.
pub fn start_script(
    relayer: &RelayerConfig,
    networks: &BTreeMap<String, NetworkConfig>,
) -> Result<String> {
    let template = include_str!("../../resources/hermes_start.tera.sh");
    let channels = relayer
        .connections
        .iter()
        .map(|(a, b)| {
            Ok(Channel {
                a_chain: &network(networks, a)?.chain_id,
                b_chain: &network(networks, b)?.chain_id,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut ctx = Context::new();
    ctx.insert("binary", &relayer.binary);
    ctx.insert("channels", &channels);
    ctx.insert("backoff_secs", &relayer.channel_retry.backoff_secs);
    ctx.insert("max_attempts", &relayer.channel_retry.max_attempts);
    Ok(Tera::one_off(template, &ctx, false)?)
}

impl HermesRelayer {
    pub(super) async fn bootstrap(
        &self,
        seed: &Seed<'_>,
        networks: &BTreeMap<String, NetworkConfig>,
    ) -> Result<()> {
        let staging = seed.staging_dir(&self.service);
        if let Err(err) = tokio::fs::remove_dir_all(&staging).await {
            debug!(dir = %staging.display(), %err, "staging directory not removed");
        }
        tokio::fs::create_dir_all(&staging)
            .await
            .with_context(|| format!("Cannot create {}", staging.display()))?;

        let config_file = staging.join("config.toml");
        let config = overrides::to_toml_string(relayer_config(&self.config, networks)?)?;
        tokio::fs::write(&config_file, config)
            .await
            .with_context(|| format!("Cannot write {}", config_file.display()))?;
        let script_file = staging.join("start.sh");
        tokio::fs::write(&script_file, start_script(&self.config, networks)?)
            .await
            .with_context(|| format!("Cannot write {}", script_file.display()))?;

        let node = NodeHandle::provision(self.runtime.clone(), &self.service).await?;
        node.exec(&format!("mkdir -p {HERMES_HOME}")).await?;
        node.copy_in(&config_file, &format!("{HERMES_HOME}/config.toml"))
            .await?;
        node.exec(&format!("echo \"{}\" > {MNEMONIC_FILE}", self.config.mnemonic))
            .await?;
        for name in &self.config.networks {
            node.exec(&format!(
                "{} keys add --key-name {} --chain {} --mnemonic-file {MNEMONIC_FILE}",
                self.config.binary,
                key_name(name),
                network(networks, name)?.chain_id
            ))
            .await?;
        }
        node.copy_in(&script_file, START_SCRIPT).await?;
        node.exec(&format!("chmod +x {START_SCRIPT}")).await?;
        node.stop().await?;

        if let Err(err) = tokio::fs::remove_dir_all(&staging).await {
            debug!(dir = %staging.display(), %err, "staging directory not removed");
        }
        info!(relayer = %self.service, "hermes configured");
        Ok(())
    }
}
