use std::sync::Arc;

use cosmonet::{Testnet, TestnetError, runtime::ComposeProject};

use crate::{
    config,
    fake::{Event, FakeRuntime, FixedHeight},
    gaia, testnet,
};

const DOWN: [&str; 2] = ["-v", "--remove-orphans"];

fn down(flags: &[&str]) -> Event {
    Event::Down(flags.iter().map(|f| f.to_string()).collect())
}

fn error_of(err: &anyhow::Error) -> &TestnetError {
    err.downcast_ref::<TestnetError>()
        .unwrap_or_else(|| panic!("not a testnet error: {err:#}"))
}

#[tokio::test]
async fn invalid_config_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let mut config = config(&gaia(2));
    config.networks.get_mut("gaia").unwrap().validators_balance = Some(
        cosmonet::config::ValidatorBalances::PerValidator(vec!["1000000".to_string()]),
    );
    let project = ComposeProject::for_context(None, dir.path());
    let err = Testnet::new(config, runtime.clone(), project, dir.path().join("tmp"), None)
        .err()
        .unwrap();
    assert!(matches!(error_of(&err), TestnetError::InvalidConfig(_)));
    assert!(runtime.events().is_empty());
    assert!(!dir.path().join("docker-compose.yml").exists());
}

#[tokio::test]
async fn stack_comes_up_after_every_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let mut config = config(&gaia(2));
    config.networks.get_mut("gaia").unwrap().post_start =
        vec!["gaiad tx bank send val1 val2 1stake".to_string()];
    let net = testnet(config, &runtime, dir.path());
    net.start(&FixedHeight(1)).await.unwrap();

    let events = runtime.events();
    assert_eq!(events[0], Event::Version);
    // No compose file yet, so only the best effort clean up runs.
    assert_eq!(events[1], down(&DOWN));
    assert!(!events.contains(&Event::ListContainers));

    let up = events.iter().position(|e| *e == Event::Up).unwrap();
    let last_bootstrap = events
        .iter()
        .rposition(|e| matches!(e, Event::StopContainer(_)))
        .unwrap();
    assert!(last_bootstrap < up);
    assert_eq!(
        &events[up + 1..],
        &[Event::Exec {
            service: "gaia_val1".to_string(),
            command: "gaiad tx bank send val1 val2 1stake".to_string(),
        }]
    );

    let compose: serde_yaml::Value = serde_yaml::from_str(
        &std::fs::read_to_string(dir.path().join("docker-compose.yml")).unwrap(),
    )
    .unwrap();
    let val1 = &compose["services"]["gaia_val1"];
    assert_eq!(val1["ports"][0].as_str(), Some("127.0.0.1:26657:26657"));
    assert_eq!(val1["volumes"][0].as_str(), Some("gaia_val1:/opt"));
    assert!(compose["services"]["gaia_val2"]["ports"].is_null());
    assert!(compose["volumes"]["gaia_val2"].is_null());
    assert!(
        compose["volumes"]
            .as_mapping()
            .unwrap()
            .contains_key("gaia_val2")
    );
}

#[tokio::test]
async fn stale_stack_is_stopped_by_hand_when_down_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
    let runtime = Arc::new(FakeRuntime::new().with_failing_downs(1));
    let net = testnet(config(&gaia(1)), &runtime, dir.path());
    net.start(&FixedHeight(1)).await.unwrap();

    let events = runtime.events();
    assert_eq!(
        &events[..6],
        &[
            Event::Version,
            down(&DOWN),
            Event::ListContainers,
            Event::StopContainers(vec!["cosmonet-gaia_val1-1".to_string()]),
            down(&DOWN),
            down(&DOWN),
        ]
    );
}

#[tokio::test]
async fn old_compose_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new().with_version("1.29.2"));
    let net = testnet(config(&gaia(1)), &runtime, dir.path());
    let err = net.start(&FixedHeight(1)).await.unwrap_err();
    assert!(matches!(error_of(&err), TestnetError::ComposeVersion(v) if v == "1.29.2"));
    assert_eq!(runtime.events(), vec![Event::Version]);

    let runtime = Arc::new(FakeRuntime::new().with_version("v2.20.3"));
    let net = testnet(config(&gaia(1)), &runtime, dir.path());
    net.start(&FixedHeight(1)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn silent_networks_time_out() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let mut config = config(&gaia(1));
    config.await_first_block = true;
    let net = testnet(config, &runtime, dir.path());
    let err = net.start(&FixedHeight(0)).await.unwrap_err();
    assert!(matches!(
        error_of(&err),
        TestnetError::FirstBlockTimeout(_)
    ));
    assert_eq!(runtime.events().last(), Some(&Event::Up));
}

#[tokio::test]
async fn networks_can_be_controlled_and_queried() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let net = testnet(config(&gaia(2)), &runtime, dir.path());

    net.pause_network("gaia").await.unwrap();
    net.restart_network("gaia").await.unwrap();
    let output = net.execute_in_network("gaia", "gaiad status").await.unwrap();
    assert!(output.success);
    assert_eq!(
        runtime.events(),
        vec![
            Event::Service {
                op: "pause",
                service: "gaia_val1".to_string()
            },
            Event::Service {
                op: "pause",
                service: "gaia_val2".to_string()
            },
            Event::Service {
                op: "restart",
                service: "gaia_val1".to_string()
            },
            Event::Service {
                op: "restart",
                service: "gaia_val2".to_string()
            },
            Event::Exec {
                service: "gaia_val1".to_string(),
                command: "gaiad status".to_string()
            },
        ]
    );
    assert!(matches!(
        error_of(&net.pause_network("osmosis").await.unwrap_err()),
        TestnetError::UnknownNetwork(name) if name == "osmosis"
    ));
}

#[tokio::test]
async fn failing_network_command_reports_its_output() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new().failing_on("status"));
    let net = testnet(config(&gaia(1)), &runtime, dir.path());
    let err = net.execute_in_network("gaia", "gaiad status").await.unwrap_err();
    match error_of(&err) {
        TestnetError::CommandFailed { target, output, .. } => {
            assert_eq!(target, "gaia_val1");
            assert_eq!(output, "boom");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn ports_follow_the_offset() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let mut config = config(&format!(
        "{}\n[networks.osmosis]\nimage = \"osmosis\"\nbinary = \"osmosisd\"\nchain_id = \"osmo-1\"\nprefix = \"osmo\"\ndenom = \"uosmo\"\nvalidators = 1\nvalidators_balance = \"100\"\n",
        gaia(1)
    ));
    config.port_offset = Some(100);
    let net = testnet(config, &runtime, dir.path());

    let rpc = net.rpc_ports();
    assert_eq!(rpc["gaia"], 26757);
    assert_eq!(rpc["osmosis"], 26758);
    assert_eq!(net.ports()["osmosis"].rest, 1418);
}

#[tokio::test]
async fn offsets_past_the_port_range_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let mut config = config(&gaia(1));
    config.port_offset = Some(40000);
    let project = ComposeProject::for_context(None, dir.path());
    let err = Testnet::new(config, runtime.clone(), project, dir.path().join("tmp"), None)
        .err()
        .unwrap();
    assert!(matches!(error_of(&err), TestnetError::InvalidConfig(m) if m.contains("66657")));
    assert!(runtime.events().is_empty());
}

#[tokio::test]
async fn stop_removes_volumes() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let net = testnet(config(&gaia(1)), &runtime, dir.path());
    net.stop().await.unwrap();
    assert_eq!(runtime.events(), vec![down(&["-v", "--remove-orphans", "-t0"])]);
}

#[tokio::test]
async fn chains_start_and_stop_every_service() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let net = testnet(config(&gaia(2)), &runtime, dir.path());
    let chain = net.chain("gaia").unwrap();
    assert_eq!(chain.name(), "gaia");
    assert_eq!(chain.config().chain_id, "test-1");

    chain.stop().await.unwrap();
    chain.start().await.unwrap();
    let ops: Vec<(&'static str, String)> = runtime
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Service { op, service } => Some((op, service)),
            _ => None,
        })
        .collect();
    assert_eq!(
        ops,
        vec![
            ("stop", "gaia_val1".to_string()),
            ("stop", "gaia_val2".to_string()),
            ("start", "gaia_val1".to_string()),
            ("start", "gaia_val2".to_string()),
        ]
    );
}
