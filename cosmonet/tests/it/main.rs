use std::{path::Path, sync::Arc};

use cosmonet::{Testnet, config::TestnetConfig, runtime::ComposeProject};
use fake::FakeRuntime;

mod hermes;
mod orchestrator;

pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// One standard network called `gaia` with `validators` validators.
pub fn gaia(validators: usize) -> String {
    format!(
        r#"
master_mnemonic = "{MNEMONIC}"

[networks.gaia]
image = "gaia:v15"
binary = "gaiad"
chain_id = "test-1"
prefix = "cosmos"
denom = "stake"
validators = {validators}
validators_balance = "1000000"
"#
    )
}

pub const ICS_AND_GAIA: &str = r#"
master_mnemonic = "abandon abandon about"

[networks.gaia]
image = "gaia:v15"
binary = "gaiad"
chain_id = "test-1"
prefix = "cosmos"
denom = "stake"
validators = 2
validators_balance = ["1000000", "2000000"]

[networks.neutron]
type = "ics"
image = "neutron:v3"
binary = "neutrond"
chain_id = "ntrn-1"
prefix = "neutron"
denom = "untrn"
genesis_opts = { "app_state.interchainqueries.params.query_deposit" = [] }

[[relayers]]
type = "hermes"
image = "hermes:1.8"
networks = ["gaia", "neutron"]
connections = [["gaia", "neutron"]]
mnemonic = "relayer words"
balance = "1000000000"
"#;

pub fn config(toml: &str) -> TestnetConfig {
    TestnetConfig::from_toml_str(toml).unwrap()
}

/// A testnet on a fake runtime, with its files under `dir`.
pub fn testnet(config: TestnetConfig, runtime: &Arc<FakeRuntime>, dir: &Path) -> Testnet {
    let project = ComposeProject::for_context(config.context.as_deref(), dir);
    Testnet::new(config, runtime.clone(), project, dir.join("tmp"), None).unwrap()
}
