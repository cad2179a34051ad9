//! End-to-end: remote client against a live dispatch server, plain and
//! encrypted, sharing one backing file.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use trialdb_aggregators::{Aggregate, Aggregator};
use trialdb_client::{open, RemoteClient};
use trialdb_query::Predicate;
use trialdb_server::{ServerConfig, ServerHandle, StoreServer};
use trialdb_store::{FileProtocol, Protocol, StoreError, StoreOptions, RUNTIME_CHRONO};
use trialdb_transport::SecurityLayer;
use trialdb_types::{MetricColumn, Params, Project, Status, Trial, TrialGroup};

fn params(pairs: &[(&str, Value)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn fields(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    params(pairs)
}

fn start_server(dir: &tempfile::TempDir, security: SecurityLayer) -> ServerHandle {
    let protocol =
        FileProtocol::open(dir.path().join("db.json"), StoreOptions::default()).unwrap();
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        security,
    };
    StoreServer::new(protocol, config).start().unwrap()
}

fn connect(handle: &ServerHandle, security: SecurityLayer) -> RemoteClient {
    let addr = handle.local_addr();
    RemoteClient::connect(&addr.ip().to_string(), addr.port(), security).unwrap()
}

fn full_session(client: &mut dyn Protocol) {
    let project = client.new_project(&Project::new("e2e")).unwrap();
    let group = client
        .new_trial_group(&TrialGroup::new("sweep").with_project(project.id()))
        .unwrap();

    let trial = client
        .new_trial(
            &Trial::new(params(&[("lr", json!(0.1))]))
                .with_project(project.id())
                .with_group(group.id()),
        )
        .unwrap();

    let trial = client.log_trial_start(&trial).unwrap();
    let trial = client
        .log_trial_metrics(&trial, Some(1), None, fields(&[("loss", json!(0.8))]))
        .unwrap();
    let trial = client
        .log_trial_metrics(&trial, Some(2), None, fields(&[("loss", json!(0.4))]))
        .unwrap();
    let trial = client
        .log_trial_metadata(&trial, None, fields(&[("host", json!("worker-3"))]))
        .unwrap();
    let trial = client
        .add_trial_tags(&trial, fields(&[("suite", json!("e2e"))]))
        .unwrap();
    let trial = client.log_trial_finish(&trial).unwrap();
    let trial = client
        .set_trial_status(&trial, Status::Finished, None)
        .unwrap();

    assert_eq!(trial.status, Status::Finished);
    let Some(MetricColumn::Stepped(loss)) = trial.metrics.get("loss") else {
        panic!("expected step-keyed loss column");
    };
    assert_eq!(loss.get(&2), Some(&json!(0.4)));
    let Some(Aggregator::Value(runtime)) = trial.chronos.get(RUNTIME_CHRONO) else {
        panic!("expected runtime chronometer");
    };
    assert!(runtime.value().and_then(|v| v.as_f64()).unwrap() >= 0.0);

    let finished = client
        .fetch_trials(&Predicate::new().eq("status", "finished"))
        .unwrap();
    assert_eq!(finished.len(), 1);

    let projects = client.fetch_projects(&Predicate::new().eq("name", "e2e")).unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].trials.len(), 1);
}

#[test]
fn plain_client_runs_a_full_session() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&dir, SecurityLayer::None);
    let mut client = connect(&handle, SecurityLayer::None);
    full_session(&mut client);
    handle.shutdown();
}

#[test]
fn encrypted_client_runs_a_full_session() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&dir, SecurityLayer::Aes);
    let mut client = connect(&handle, SecurityLayer::Aes);
    full_session(&mut client);
    handle.shutdown();
}

#[test]
fn uri_selector_reaches_both_backends() {
    // file:// resolves to the in-process store.
    let dir = tempfile::tempdir().unwrap();
    let file_uri = format!("file://{}", dir.path().join("db.json").display());
    let mut store = open(&file_uri).unwrap();
    full_session(store.as_mut());

    // socket:// resolves to the remote stub, against a fresh server.
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&dir, SecurityLayer::Aes);
    let addr = handle.local_addr();
    let socket_uri = format!("socket://{}:{}?security_layer=AES", addr.ip(), addr.port());
    let mut client = open(&socket_uri).unwrap();
    full_session(client.as_mut());
    handle.shutdown();
}

#[test]
fn concurrent_write_detection_crosses_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&dir, SecurityLayer::None);

    let mut writer_a = connect(&handle, SecurityLayer::None);
    let mut writer_b = connect(&handle, SecurityLayer::None);

    let project = writer_a.new_project(&Project::new("race")).unwrap();
    let stale = writer_a
        .new_trial(&Trial::new(params(&[("seed", json!(7))])).with_project(project.id()))
        .unwrap();

    // B finalizes first; A's copy is now stale.
    writer_b
        .set_trial_status(&stale, Status::Finished, None)
        .unwrap();

    let err = writer_a
        .set_trial_status(&stale, Status::Errored, Some("late".into()))
        .unwrap_err();
    match err {
        StoreError::ConcurrentWrite { ours, theirs } => {
            assert_eq!(ours, 0);
            assert_eq!(theirs, 1);
        }
        other => panic!("expected ConcurrentWrite, got {other}"),
    }

    // Non-atomic writes from the stale copy still go through, against
    // the fresh version.
    let merged = writer_a
        .add_trial_tags(&stale, fields(&[("retried", json!(true))]))
        .unwrap();
    assert_eq!(merged.status, Status::Finished);

    handle.shutdown();
}

#[test]
fn revision_bumps_are_visible_remotely() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&dir, SecurityLayer::None);
    let mut client = connect(&handle, SecurityLayer::None);

    let project = client.new_project(&Project::new("rev")).unwrap();
    let first = client
        .new_trial(&Trial::new(params(&[("cfg", json!("x"))])).with_project(project.id()))
        .unwrap();
    let second = client
        .new_trial(&Trial::new(params(&[("cfg", json!("x"))])).with_project(project.id()))
        .unwrap();

    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.revision, 0);
    assert_eq!(second.revision, 1);

    let revisions = client.get_trial(&first).unwrap();
    assert_eq!(revisions.len(), 2);

    handle.shutdown();
}

#[test]
fn remote_and_local_share_one_backing_file() {
    let dir = tempfile::tempdir().unwrap();
    let handle = start_server(&dir, SecurityLayer::None);
    let mut remote = connect(&handle, SecurityLayer::None);

    let project = remote.new_project(&Project::new("shared")).unwrap();
    remote
        .new_trial(&Trial::new(params(&[("a", json!(1))])).with_project(project.id()))
        .unwrap();

    // A second, direct-file store sees the same state through the lock
    // and reload path.
    let mut local =
        FileProtocol::open(dir.path().join("db.json"), StoreOptions::default()).unwrap();
    let trials = local.fetch_trials(&Predicate::new()).unwrap();
    assert_eq!(trials.len(), 1);

    handle.shutdown();
}
