use std::sync::Arc;

use cosmonet::{TestnetError, config::RelayerKind};

use crate::{
    ICS_AND_GAIA, config,
    fake::{Event, FakeRuntime, FixedHeight},
    testnet,
};

const RELAYER: &str = "relayer_hermes0";

fn chain<'a>(config: &'a toml::Table, id: &str) -> &'a toml::Value {
    config["chains"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["id"].as_str() == Some(id))
        .unwrap_or_else(|| panic!("no chain {id}"))
}

#[tokio::test]
async fn hermes_is_configured_for_both_chains() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let net = testnet(config(ICS_AND_GAIA), &runtime, dir.path());
    net.start(&FixedHeight(1)).await.unwrap();

    let config: toml::Table =
        toml::from_str(&runtime.file(RELAYER, "/root/.hermes/config.toml").unwrap()).unwrap();
    assert_eq!(config["global"]["log_level"].as_str(), Some("info"));
    assert_eq!(config["chains"].as_array().unwrap().len(), 2);

    let gaia = chain(&config, "test-1");
    assert_eq!(gaia["trusting_period"].as_str(), Some("14days"));
    assert_eq!(gaia["rpc_addr"].as_str(), Some("http://gaia_val1:26657"));
    assert_eq!(gaia["key_name"].as_str(), Some("key-gaia"));
    assert_eq!(gaia["gas_price"]["denom"].as_str(), Some("stake"));

    let neutron = chain(&config, "ntrn-1");
    assert_eq!(neutron["trusting_period"].as_str(), Some("320hours"));
    assert_eq!(neutron["grpc_addr"].as_str(), Some("http://neutron_ics:9090"));
    assert_eq!(neutron["account_prefix"].as_str(), Some("neutron"));

    assert_eq!(
        runtime.files_under(RELAYER, "/root/.hermes/keys"),
        vec![
            "/root/.hermes/keys/key-gaia".to_string(),
            "/root/.hermes/keys/key-neutron".to_string(),
        ]
    );
    assert_eq!(
        runtime.file(RELAYER, "/root/mnemonic.txt").as_deref(),
        Some("relayer words")
    );
}

#[tokio::test]
async fn start_script_opens_the_channel_then_relays() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let net = testnet(config(ICS_AND_GAIA), &runtime, dir.path());
    net.start(&FixedHeight(1)).await.unwrap();

    let script = runtime.file(RELAYER, "/root/start.sh").unwrap();
    assert!(script.starts_with("#!/bin/bash"));
    assert_eq!(script.matches("create channel").count(), 1);
    assert!(script.contains("--a-chain test-1 --b-chain ntrn-1"));
    assert!(script.trim_end().ends_with("exec hermes start"));

    let commands = runtime.commands(RELAYER);
    assert_eq!(commands.last().map(String::as_str), Some("chmod +x /root/start.sh"));
}

#[tokio::test]
async fn relayer_bootstraps_after_the_networks() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let net = testnet(config(ICS_AND_GAIA), &runtime, dir.path());
    net.start(&FixedHeight(1)).await.unwrap();

    let events = runtime.events();
    let relayer = events
        .iter()
        .position(|e| *e == Event::Provision(RELAYER.to_string()))
        .unwrap();
    let last_chain_stop = events
        .iter()
        .rposition(|e| matches!(e, Event::StopContainer(s) if s != RELAYER))
        .unwrap();
    assert!(last_chain_stop < relayer);

    // The relayer account exists on both chains.
    for (service, coins) in [
        ("gaia_val1", "1000000000stake"),
        ("neutron_ics", "1000000000untrn"),
    ] {
        let balances = runtime.genesis(service)["app_state"]["bank"]["balances"].clone();
        assert!(
            balances
                .as_array()
                .unwrap()
                .iter()
                .any(|b| b["address"] == "relayer_0" && b["coins"] == coins),
            "{service}: {balances}"
        );
    }

    let compose: serde_yaml::Value =
        serde_yaml::from_str(&std::fs::read_to_string(dir.path().join("docker-compose.yml")).unwrap())
            .unwrap();
    let service = &compose["services"][RELAYER];
    assert_eq!(service["entrypoint"][0].as_str(), Some("/bin/bash"));
    assert_eq!(service["volumes"][0].as_str(), Some("relayer_hermes0:/root"));
    let depends_on: Vec<&str> = service["depends_on"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(depends_on, vec!["gaia_val1", "neutron_ics"]);
}

#[tokio::test]
async fn relayers_are_addressed_by_kind_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let net = testnet(config(ICS_AND_GAIA), &runtime, dir.path());

    net.pause_relayer(RelayerKind::Hermes, 0).await.unwrap();
    net.resume_relayer(RelayerKind::Hermes, 0).await.unwrap();
    net.restart_relayer(RelayerKind::Hermes, 0).await.unwrap();
    net.stop_relayer(RelayerKind::Hermes, 0).await.unwrap();
    let ops: Vec<&'static str> = runtime
        .events()
        .into_iter()
        .map(|e| match e {
            Event::Service { op, service } if service == RELAYER => op,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(ops, vec!["pause", "unpause", "restart", "stop"]);

    for err in [
        net.pause_relayer(RelayerKind::Hermes, 1).await.unwrap_err(),
        net.pause_relayer(RelayerKind::Neutron, 0).await.unwrap_err(),
    ] {
        assert!(matches!(
            err.downcast_ref::<TestnetError>(),
            Some(TestnetError::UnknownRelayer(_))
        ));
    }
}

#[tokio::test]
async fn commands_run_inside_the_relayer() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new().failing_on("query channels"));
    let net = testnet(config(ICS_AND_GAIA), &runtime, dir.path());

    let output = net
        .execute_in_relayer(RelayerKind::Hermes, 0, "hermes version")
        .await
        .unwrap();
    assert!(output.success);
    assert_eq!(
        runtime.events(),
        vec![Event::Exec {
            service: RELAYER.to_string(),
            command: "hermes version".to_string()
        }]
    );

    let err = net
        .execute_in_relayer(RelayerKind::Hermes, 0, "hermes query channels --chain test-1")
        .await
        .unwrap_err();
    match err.downcast_ref::<TestnetError>() {
        Some(TestnetError::CommandFailed { target, output, .. }) => {
            assert_eq!(target, RELAYER);
            assert_eq!(output, "boom");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(
        net.execute_in_relayer(RelayerKind::Coordinator, 0, "ls")
            .await
            .is_err()
    );
}
