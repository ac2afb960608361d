use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use anyhow::{Context as _, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::Display;

use crate::{error::TestnetError, overrides};

pub const DEFAULT_CONTEXT: &str = "cosmonet";

/// Account prefix that marks a sidecar relayer's hub when no ICS network does.
const NEUTRON_PREFIX: &str = "neutron";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// The whole testnet: networks, relayers and the accounts to fund.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestnetConfig {
    /// Namespaces the compose project and its files so several testnets can share a host.
    #[serde(default)]
    pub context: Option<String>,
    /// Fixed port offset; when absent it comes from the acquired instance slot.
    #[serde(default, alias = "portOffset")]
    pub port_offset: Option<u32>,
    #[serde(default)]
    pub loglevel: Option<String>,
    #[serde(default, alias = "awaitFirstBlock")]
    pub await_first_block: bool,
    /// Validator keys are derived from this mnemonic, one account index per validator.
    pub master_mnemonic: String,
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub relayers: Vec<RelayerConfig>,
    #[serde(default)]
    pub wallets: BTreeMap<String, Wallet>,
    #[serde(default)]
    pub custom_containers: Vec<CustomContainer>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NetworkKind {
    /// A self-bootstrapped validator set.
    #[default]
    Default,
    /// A single consumer node whose validator set comes from a provider chain.
    Ics,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ValidatorBalances {
    Uniform(String),
    PerValidator(Vec<String>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub image: String,
    pub binary: String,
    pub chain_id: String,
    pub prefix: String,
    pub denom: String,
    #[serde(default, rename = "type")]
    pub kind: NetworkKind,
    #[serde(default)]
    pub validators: Option<usize>,
    #[serde(default)]
    pub validators_balance: Option<ValidatorBalances>,
    #[serde(default)]
    pub genesis_opts: BTreeMap<String, Value>,
    #[serde(default)]
    pub config_opts: BTreeMap<String, Value>,
    #[serde(default)]
    pub app_opts: BTreeMap<String, Value>,
    /// Host paths copied into `/opt` of the first node after init.
    #[serde(default)]
    pub upload: Vec<String>,
    #[serde(default)]
    pub post_init: Vec<String>,
    #[serde(default)]
    pub post_start: Vec<String>,
    #[serde(default)]
    pub commands: ChainCommands,
    /// Publish ports on every interface instead of loopback only.
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub loglevel: Option<String>,
    #[serde(default)]
    pub trace: bool,
}

impl NetworkConfig {
    pub fn validator_count(&self) -> usize {
        match self.kind {
            NetworkKind::Default => self.validators.unwrap_or(0),
            NetworkKind::Ics => 1,
        }
    }

    /// Balance, and stake, of validator `index` (0-based).
    pub fn validator_balance(&self, index: usize) -> Result<&str> {
        match &self.validators_balance {
            Some(ValidatorBalances::Uniform(balance)) => Ok(balance),
            Some(ValidatorBalances::PerValidator(balances)) => balances
                .get(index)
                .map(String::as_str)
                .ok_or_else(|| anyhow!("no balance for validator {}", index + 1)),
            None => Err(anyhow!("validators_balance is not set")),
        }
    }

    /// The service that answers for the whole network: validator 1, or the ICS node.
    pub fn primary_service(&self, network: &str) -> String {
        match self.kind {
            NetworkKind::Default => validator_service(network, 0),
            NetworkKind::Ics => ics_service(network),
        }
    }

    /// Every compose service this network owns.
    pub fn services(&self, network: &str) -> Vec<String> {
        match self.kind {
            NetworkKind::Default => (0..self.validator_count())
                .map(|i| validator_service(network, i))
                .collect(),
            NetworkKind::Ics => vec![ics_service(network)],
        }
    }
}

pub fn validator_service(network: &str, index: usize) -> String {
    format!("{network}_val{}", index + 1)
}

pub fn ics_service(network: &str) -> String {
    format!("{network}_ics")
}

/// Subcommand names of the chain binary. Binaries built on different SDK versions spell
/// some of these differently, e.g. `genesis add-genesis-account`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChainCommands {
    pub init: String,
    pub keys_add: String,
    pub add_genesis_account: String,
    pub gentx: String,
    pub collect_gentxs: String,
    pub show_node_id: String,
    pub unsafe_reset_all: String,
    pub add_consumer_section: String,
}

impl Default for ChainCommands {
    fn default() -> Self {
        Self {
            init: "init".to_string(),
            keys_add: "keys add".to_string(),
            add_genesis_account: "add-genesis-account".to_string(),
            gentx: "gentx".to_string(),
            collect_gentxs: "collect-gentxs".to_string(),
            show_node_id: "tendermint show-node-id".to_string(),
            unsafe_reset_all: "tendermint unsafe-reset-all".to_string(),
            add_consumer_section: "add-consumer-section".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Wallet {
    pub mnemonic: String,
    pub balance: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RelayerKind {
    /// Templated IBC relay client.
    Hermes,
    /// Interchain query relayer sidecar.
    Neutron,
    /// Sidecar that runs and supervises the query relayer.
    Coordinator,
}

impl RelayerKind {
    pub fn is_sidecar(&self) -> bool {
        matches!(self, RelayerKind::Neutron | RelayerKind::Coordinator)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerConfig {
    #[serde(rename = "type")]
    pub kind: RelayerKind,
    pub networks: Vec<String>,
    #[serde(default)]
    pub connections: Vec<(String, String)>,
    pub image: String,
    #[serde(default = "default_relayer_binary")]
    pub binary: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub mnemonic: String,
    pub balance: String,
    /// Dotted-path overrides for the generated relayer config.
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    /// Extra environment for sidecar relayers, applied over the generated one.
    #[serde(default)]
    pub environment: BTreeMap<String, Value>,
    /// The distinguished network of a sidecar relayer. Defaults to the ICS network.
    #[serde(default)]
    pub hub: Option<String>,
    #[serde(default)]
    pub channel_retry: ChannelRetry,
}

fn default_relayer_binary() -> String {
    "hermes".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RelayerConfig {
    pub fn service_name(&self, index: usize) -> String {
        format!("relayer_{}{index}", self.kind)
    }

    pub fn wallet_name(index: usize) -> String {
        format!("relayer_{index}")
    }

    /// For sidecars: the hub network and the other side. The hub is the explicit `hub`,
    /// else the only ICS network, else the only network with the `neutron` prefix.
    pub fn hub_and_target<'a>(
        &'a self,
        networks: &BTreeMap<String, NetworkConfig>,
    ) -> Result<(&'a str, &'a str)> {
        let hub = match &self.hub {
            Some(hub) => self
                .networks
                .iter()
                .find(|n| *n == hub)
                .ok_or_else(|| {
                    TestnetError::invalid(format!(
                        "relayer {} hub {hub} is not one of its networks",
                        self.kind
                    ))
                })?,
            None => {
                let only = |wanted: &dyn Fn(&NetworkConfig) -> bool| {
                    let found = self
                        .networks
                        .iter()
                        .filter(|n| networks.get(*n).is_some_and(wanted))
                        .collect::<Vec<_>>();
                    match found.as_slice() {
                        [one] => Some(*one),
                        _ => None,
                    }
                };
                only(&|c: &NetworkConfig| c.kind == NetworkKind::Ics)
                    .or_else(|| only(&|c: &NetworkConfig| c.prefix == NEUTRON_PREFIX))
                    .ok_or_else(|| {
                        TestnetError::invalid(format!(
                            "relayer {} cannot tell its hub: link one ics or one neutron network, or name the hub",
                            self.kind
                        ))
                    })?
            }
        };
        let target = self
            .networks
            .iter()
            .find(|n| *n != hub)
            .ok_or_else(|| {
                TestnetError::invalid(format!("relayer {} has no target network", self.kind))
            })?;
        Ok((hub.as_str(), target.as_str()))
    }
}

/// How hard the relayer start script tries to open each channel.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelRetry {
    pub backoff_secs: u64,
    /// `None` retries for as long as it takes: channels can only be created once both
    /// chains produce blocks, which is outside our control.
    pub max_attempts: Option<u32>,
}

impl Default for ChannelRetry {
    fn default() -> Self {
        Self {
            backoff_secs: 5,
            max_attempts: None,
        }
    }
}

/// A container added to the compose file as-is.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomContainer {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub environment: Vec<String>,
}

impl TestnetConfig {
    pub async fn from_file(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref();
        let contents = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Cannot read {}", file.display()))?;
        match file.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&contents).with_context(|| {
                format!("{} does not contain a valid TOML testnet config", file.display())
            }),
            Some("json") => Self::from_json_str(&contents).with_context(|| {
                format!("{} does not contain a valid JSON testnet config", file.display())
            }),
            _ => Err(TestnetError::invalid(format!(
                "unknown config format for {}, expected .toml or .json",
                file.display()
            ))
            .into()),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn context(&self) -> &str {
        self.context.as_deref().unwrap_or(DEFAULT_CONTEXT)
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig> {
        self.networks
            .get(name)
            .ok_or_else(|| TestnetError::UnknownNetwork(name.to_string()).into())
    }

    pub fn log_level(&self) -> &str {
        self.loglevel.as_deref().unwrap_or("info")
    }

    /// User wallets plus one funded wallet per relayer. Relayer wallets win on a name
    /// clash.
    pub fn merged_wallets(&self) -> BTreeMap<String, Wallet> {
        let mut wallets = self.wallets.clone();
        for (index, relayer) in self.relayers.iter().enumerate() {
            let name = RelayerConfig::wallet_name(index);
            let wallet = Wallet {
                mnemonic: relayer.mnemonic.clone(),
                balance: relayer.balance.clone(),
            };
            if wallets.insert(name.clone(), wallet).is_some() {
                tracing::warn!(wallet = %name, "relayer wallet replaces a user wallet of the same name");
            }
        }
        wallets
    }

    /// Checks everything that can be checked without touching a container.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(TestnetError::InvalidConfig(msg).into()) };
        let digits = Regex::new(r"^[0-9]+$")?;
        let context_re = Regex::new(r"^[a-z0-9]+$")?;
        let name_re = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$")?;
        // Mnemonics end up inside double quotes in shell commands.
        let mnemonic_re = Regex::new(r"^[a-zA-Z0-9 ]+$")?;

        if let Some(context) = &self.context {
            if !context_re.is_match(context) {
                return fail("context should be lowercase alphanumeric".to_string());
            }
        }
        if let Some(level) = &self.loglevel {
            if !LOG_LEVELS.contains(&level.as_str()) {
                return fail(format!(
                    "log level should be one of {}",
                    LOG_LEVELS.join(", ")
                ));
            }
        }
        if self.networks.is_empty() {
            return fail("at least one network must be declared".to_string());
        }
        if !mnemonic_re.is_match(&self.master_mnemonic) {
            return fail("master_mnemonic should be space separated words".to_string());
        }

        for (key, network) in &self.networks {
            if !name_re.is_match(key) {
                return fail(format!("network name {key} cannot be used as a service name"));
            }
            for path in network
                .genesis_opts
                .keys()
                .chain(network.config_opts.keys())
                .chain(network.app_opts.keys())
            {
                overrides::parse_path(path)?;
            }
            for (path, value) in network.config_opts.iter().chain(&network.app_opts) {
                if overrides::contains_null(value) {
                    return fail(format!("network {key} override {path} is null, TOML has no null"));
                }
            }
            // Consumer chains take their validator set from the provider.
            if network.kind == NetworkKind::Ics {
                continue;
            }
            let validators = match network.validators {
                None | Some(0) => {
                    return fail(format!("network {key} does not have validators number"));
                }
                Some(n) => n,
            };
            match &network.validators_balance {
                None => return fail(format!("network {key} does not have validators_balance")),
                Some(ValidatorBalances::Uniform(balance)) => {
                    if !digits.is_match(balance) {
                        return fail(format!("network {key} validators_balance is of wrong type"));
                    }
                }
                Some(ValidatorBalances::PerValidator(balances)) => {
                    if balances.len() < validators {
                        return fail(format!(
                            "network {key} does not have validators_balance for all validators"
                        ));
                    }
                    if let Some(bad) = balances.iter().find(|b| !digits.is_match(b)) {
                        return fail(format!("network {key} has a malformed balance {bad}"));
                    }
                }
            }
        }

        for (name, wallet) in &self.wallets {
            if !name_re.is_match(name) {
                return fail(format!("wallet name {name} cannot be used as a key name"));
            }
            if !digits.is_match(&wallet.balance) {
                return fail(format!("wallet {name} balance is wrong"));
            }
            if !mnemonic_re.is_match(&wallet.mnemonic) {
                return fail(format!("wallet {name} mnemonic should be space separated words"));
            }
        }

        let networks: BTreeSet<&String> = self.networks.keys().collect();
        for relayer in &self.relayers {
            for network in &relayer.networks {
                if !networks.contains(network) {
                    return fail(format!(
                        "relayer is linked to the network {network} which is not defined"
                    ));
                }
            }
            if !digits.is_match(&relayer.balance) {
                return fail(format!("relayer {} balance is wrong", relayer.kind));
            }
            if !mnemonic_re.is_match(&relayer.mnemonic) {
                return fail(format!(
                    "relayer {} mnemonic should be space separated words",
                    relayer.kind
                ));
            }
            for (path, value) in &relayer.config {
                overrides::parse_path(path)?;
                if overrides::contains_null(value) {
                    return fail(format!(
                        "relayer {} override {path} is null, TOML has no null",
                        relayer.kind
                    ));
                }
            }
            match relayer.kind {
                RelayerKind::Hermes => {
                    if relayer.connections.is_empty() {
                        return fail("relayer hermes should have connections".to_string());
                    }
                    for (a, b) in &relayer.connections {
                        if !relayer.networks.contains(a) || !relayer.networks.contains(b) {
                            return fail(format!(
                                "relayer hermes connection {a}<->{b} uses a network it does not bridge"
                            ));
                        }
                    }
                }
                RelayerKind::Neutron | RelayerKind::Coordinator => {
                    if relayer.networks.len() != 2 {
                        return fail(format!(
                            "relayer {} should be linked to 2 networks",
                            relayer.kind
                        ));
                    }
                    relayer.hub_and_target(&self.networks)?;
                }
            }
        }
        Ok(())
    }
}
