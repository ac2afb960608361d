//! Command lines for a cosmos-sdk chain binary. Every command works on the home directory
//! `/opt` and the `test` keyring.
use crate::config::{ChainCommands, NetworkConfig};

pub const HOME: &str = "/opt";
pub const CONFIG_DIR: &str = "/opt/config";

pub struct ChainCli<'a> {
    binary: &'a str,
    commands: &'a ChainCommands,
    chain_id: &'a str,
    denom: &'a str,
}

impl<'a> ChainCli<'a> {
    pub fn new(config: &'a NetworkConfig) -> Self {
        Self {
            binary: &config.binary,
            commands: &config.commands,
            chain_id: &config.chain_id,
            denom: &config.denom,
        }
    }

    pub fn init(&self, moniker: &str) -> String {
        format!(
            "{} {} {moniker} --chain-id={} --home={HOME}",
            self.binary, self.commands.init, self.chain_id
        )
    }

    /// Import a key from `mnemonic`. `account` selects the HD account index.
    pub fn recover_key(&self, name: &str, mnemonic: &str, account: Option<usize>) -> String {
        let account = account
            .map(|a| format!(" --account={a}"))
            .unwrap_or_default();
        format!(
            "echo \"{mnemonic}\" | {} {} {name} --home={HOME} --recover{account} --keyring-backend=test",
            self.binary, self.commands.keys_add
        )
    }

    pub fn add_genesis_account(&self, name: &str, amount: &str) -> String {
        format!(
            "{} {} {name} {amount}{} --home={HOME} --keyring-backend=test",
            self.binary, self.commands.add_genesis_account, self.denom
        )
    }

    pub fn gentx(&self, name: &str, amount: &str) -> String {
        format!(
            "{} {} {name} {amount}{} --home={HOME} --keyring-backend=test --chain-id={}",
            self.binary, self.commands.gentx, self.denom, self.chain_id
        )
    }

    pub fn collect_gentxs(&self) -> String {
        format!("{} {} --home={HOME}", self.binary, self.commands.collect_gentxs)
    }

    pub fn show_node_id(&self) -> String {
        format!("{} {} --home={HOME}", self.binary, self.commands.show_node_id)
    }

    pub fn unsafe_reset_all(&self) -> String {
        format!("{} {} --home={HOME}", self.binary, self.commands.unsafe_reset_all)
    }

    pub fn add_consumer_section(&self) -> String {
        format!(
            "{} {} --home={HOME}",
            self.binary, self.commands.add_consumer_section
        )
    }
}
