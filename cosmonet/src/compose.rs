//! Generation of the compose document describing the whole testnet.
use std::{collections::BTreeMap, path::Path};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    config::{NetworkConfig, RelayerConfig, RelayerKind, TestnetConfig},
    error::TestnetError,
};

pub const RPC_PORT: u32 = 26657;
pub const REST_PORT: u32 = 1317;
pub const GRPC_PORT: u32 = 9090;
pub const P2P_PORT: u32 = 26656;

/// Host ports published by the first node of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkPorts {
    pub rpc: u32,
    pub rest: u32,
    pub grpc: u32,
}

impl NetworkPorts {
    /// Ports for the `index`th declared network of an instance at `offset`.
    pub fn new(offset: u32, index: u32) -> Self {
        let base = offset + index;
        Self {
            rpc: base + RPC_PORT,
            rest: base + REST_PORT,
            grpc: base + GRPC_PORT,
        }
    }

    fn published(&self, public: bool) -> Vec<String> {
        let interface = if public { "" } else { "127.0.0.1:" };
        [
            (self.rpc, RPC_PORT),
            (self.rest, REST_PORT),
            (self.grpc, GRPC_PORT),
        ]
        .into_iter()
        .map(|(host, container)| format!("{interface}{host}:{container}"))
        .collect()
    }
}

/// Reject a layout whose ports do not fit in `u16`, e.g. from a large `port_offset`.
pub fn check_ports(ports: &BTreeMap<String, NetworkPorts>) -> Result<()> {
    for (network, ports) in ports {
        for port in [ports.rpc, ports.rest, ports.grpc] {
            if u16::try_from(port).is_err() {
                return Err(TestnetError::invalid(format!(
                    "network {network} would publish port {port}, lower the port offset"
                ))
                .into());
            }
        }
    }
    Ok(())
}

/// Ports of every network, keyed by network name. Networks are numbered in name order.
pub fn network_ports(config: &TestnetConfig, offset: u32) -> BTreeMap<String, NetworkPorts> {
    config
        .networks
        .keys()
        .zip(0u32..)
        .map(|(name, index)| (name.clone(), NetworkPorts::new(offset, index)))
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Service {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ComposeFile {
    pub services: BTreeMap<String, Service>,
    /// Named volumes. They carry no options, so every value is `null`.
    pub volumes: BTreeMap<String, Option<Value>>,
}

impl ComposeFile {
    pub fn generate(config: &TestnetConfig, offset: u32) -> Result<Self> {
        let mut compose = ComposeFile::default();
        let ports = network_ports(config, offset);

        for (name, network) in &config.networks {
            for (index, service) in network.services(name).into_iter().enumerate() {
                let published = if index == 0 {
                    ports[name].published(network.public)
                } else {
                    Vec::new()
                };
                compose.add_volume(&service);
                compose.services.insert(
                    service.clone(),
                    node_service(network, &service, config.log_level(), published),
                );
            }
        }

        let mut hermes_connections: Vec<(String, String)> = Vec::new();
        for (index, relayer) in config.relayers.iter().enumerate() {
            let name = relayer.service_name(index);
            let depends_on = relayer
                .networks
                .iter()
                .filter_map(|n| config.networks.get(n).map(|c| c.primary_service(n)))
                .collect();
            match relayer.kind {
                RelayerKind::Hermes => {
                    compose.add_volume(&name);
                    compose.services.insert(
                        name.clone(),
                        Service {
                            image: relayer.image.clone(),
                            command: vec!["-c".to_string(), "/root/start.sh".to_string()],
                            entrypoint: vec!["/bin/bash".to_string()],
                            volumes: vec![format!("{name}:/root")],
                            depends_on,
                            ..Default::default()
                        },
                    );
                    hermes_connections.extend(relayer.connections.iter().cloned());
                }
                RelayerKind::Neutron | RelayerKind::Coordinator => {
                    let (hub, _) = relayer.hub_and_target(&config.networks)?;
                    let hub_home = config.network(hub)?.primary_service(hub);
                    let environment =
                        sidecar_environment(config, relayer, index, &hermes_connections)?;
                    compose.services.insert(
                        name,
                        Service {
                            image: relayer.image.clone(),
                            entrypoint: vec!["./run.sh".to_string()],
                            volumes: vec![format!("{hub_home}:/data")],
                            depends_on,
                            environment: render_environment(&environment),
                            ..Default::default()
                        },
                    );
                }
            }
        }

        for container in &config.custom_containers {
            compose.services.insert(
                container.name.clone(),
                Service {
                    image: container.image.clone(),
                    entrypoint: container
                        .entrypoint
                        .as_deref()
                        .map(|e| e.split_whitespace().map(str::to_string).collect())
                        .unwrap_or_default(),
                    ports: container.ports.clone(),
                    depends_on: container.depends_on.clone(),
                    volumes: container.volumes.clone(),
                    environment: container.environment.clone(),
                    ..Default::default()
                },
            );
        }
        Ok(compose)
    }

    fn add_volume(&mut self, name: &str) {
        self.volumes.insert(name.to_string(), None);
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub async fn write(&self, file: &Path) -> Result<()> {
        tokio::fs::write(file, self.to_yaml()?)
            .await
            .with_context(|| format!("Cannot write {}", file.display()))
    }
}

fn node_service(
    network: &NetworkConfig,
    service: &str,
    default_log_level: &str,
    ports: Vec<String>,
) -> Service {
    let mut command = vec![
        "start".to_string(),
        "--home=/opt".to_string(),
        "--pruning=nothing".to_string(),
        "--log_format=json".to_string(),
        format!(
            "--log_level={}",
            network.loglevel.as_deref().unwrap_or(default_log_level)
        ),
    ];
    if network.trace {
        command.push("--trace".to_string());
    }
    Service {
        image: network.image.clone(),
        command,
        entrypoint: vec![network.binary.clone()],
        volumes: vec![format!("{service}:/opt")],
        ports,
        ..Default::default()
    }
}

/// Best-effort IBC connection index of the hub-target link: hermes connections declared
/// earlier are opened in order, and each one touching the hub takes the next index on
/// the hub. Nothing checks this against the chain.
pub fn connection_index(previous: &[(String, String)], hub: &str, target: &str) -> usize {
    let mut id = 0;
    for (a, b) in previous {
        if (a == hub && b == target) || (a == target && b == hub) {
            break;
        }
        if a == hub || b == hub {
            id += 1;
        }
    }
    id
}

fn sidecar_environment(
    config: &TestnetConfig,
    relayer: &RelayerConfig,
    index: usize,
    previous: &[(String, String)],
) -> Result<BTreeMap<String, Value>> {
    let (hub, target) = relayer.hub_and_target(&config.networks)?;
    let hub_config = config.network(hub)?;
    let target_config = config.network(target)?;
    let hub_node = hub_config.primary_service(hub);
    let target_node = target_config.primary_service(target);
    let connection = connection_index(previous, hub, target);

    let mut env: BTreeMap<String, Value> = serde_json::from_value(json!({
        "NODE": hub_node,
        "LOGGER_LEVEL": relayer.log_level,
        "RELAYER_NEUTRON_CHAIN_CHAIN_PREFIX": hub_config.prefix,
        "RELAYER_NEUTRON_CHAIN_RPC_ADDR": format!("tcp://{hub_node}:{RPC_PORT}"),
        "RELAYER_NEUTRON_CHAIN_REST_ADDR": format!("http://{hub_node}:{REST_PORT}"),
        "RELAYER_NEUTRON_CHAIN_HOME_DIR": "/data",
        "RELAYER_NEUTRON_CHAIN_SIGN_KEY_NAME": RelayerConfig::wallet_name(index),
        "RELAYER_NEUTRON_CHAIN_GAS_PRICES": format!("0.5{}", hub_config.denom),
        "RELAYER_NEUTRON_CHAIN_GAS_ADJUSTMENT": 1.5,
        "RELAYER_NEUTRON_CHAIN_DENOM": hub_config.denom,
        "RELAYER_NEUTRON_CHAIN_MAX_GAS_PRICE": 1000,
        "RELAYER_NEUTRON_CHAIN_GAS_PRICE_MULTIPLIER": 1.1,
        "RELAYER_NEUTRON_CHAIN_CONNECTION_ID": format!("connection-{connection}"),
        "RELAYER_NEUTRON_CHAIN_DEBUG": true,
        "RELAYER_NEUTRON_CHAIN_ACCOUNT_PREFIX": hub_config.prefix,
        "RELAYER_NEUTRON_CHAIN_KEYRING_BACKEND": "test",
        "RELAYER_TARGET_CHAIN_RPC_ADDR": format!("tcp://{target_node}:{RPC_PORT}"),
        "RELAYER_TARGET_CHAIN_REST_ADDR": format!("http://{target_node}:{REST_PORT}"),
        "RELAYER_TARGET_CHAIN_DENOM": target_config.denom,
        "RELAYER_TARGET_CHAIN_GAS_PRICES": format!("0.5{}", target_config.denom),
        "RELAYER_TARGET_CHAIN_ACCOUNT_PREFIX": target_config.prefix,
        "RELAYER_TARGET_CHAIN_VALIDATOR_ACCOUNT_PREFIX": format!("{}valoper", target_config.prefix),
        "RELAYER_TARGET_CHAIN_DEBUG": true,
        "RELAYER_ALLOW_KV_CALLBACKS": true,
    }))?;
    let extra = match relayer.kind {
        RelayerKind::Coordinator => json!({
            "COORDINATOR_MNEMONIC": relayer.mnemonic,
            "COORDINATOR_LOG_LEVEL": "debug",
            "ICQ_RUN_COMMAND": "neutron_query_relayer run",
            "COORDINATOR_CHECKS_PERIOD": 5,
        }),
        _ => json!({
            "RELAYER_REGISTRY_ADDRESSES": "",
            "RELAYER_ALLOW_TX_QUERIES": true,
            "RELAYER_STORAGE_PATH": "/data/relayer/storage/leveldb",
            "RELAYER_LISTEN_ADDR": "0.0.0.0:9999",
        }),
    };
    env.extend(serde_json::from_value::<BTreeMap<String, Value>>(extra)?);
    env.extend(relayer.environment.clone());
    Ok(env)
}

fn render_environment(env: &BTreeMap<String, Value>) -> Vec<String> {
    env.iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect()
}
