//! Failure quarantine behavior.
//!
//! A failed deployment quarantines the artifact until its backing files
//! change; a successful deployment clears the record.

mod common;

use common::{write_app_archive, write_exploded, RecordingListener, Script, TestHarness};
use filetime::{set_file_mtime, FileTime};
use hangar::deploy::DeployError;
use std::path::Path;

fn touch(path: &Path, secs: i64) {
    set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

#[tokio::test]
async fn corrupt_archive_is_quarantined_until_it_changes() {
    let harness = TestHarness::new();
    let archive = harness.apps_dir().join("broken.tgz");
    std::fs::write(&archive, b"definitely not a gzip stream").unwrap();
    touch(&archive, 1_000_000);

    // first attempt fails and records the quarantine
    let result = harness.applications.deploy_packaged_artifact(&archive, None).await;
    assert!(matches!(result, Err(DeployError::Install { .. })));
    assert!(!harness.applications.is_updated_zombie_artifact("broken"));

    // unchanged archive: skipped silently, no second attempt
    let skipped = harness
        .applications
        .deploy_packaged_artifact(&archive, None)
        .await
        .unwrap();
    assert!(skipped.is_none());

    // touching the archive makes it eligible again
    touch(&archive, 1_000_001);
    assert!(harness.applications.is_updated_zombie_artifact("broken"));
    let result = harness.applications.deploy_packaged_artifact(&archive, None).await;
    assert!(matches!(result, Err(DeployError::Install { .. })));

    // deleting the archive also lifts the quarantine
    std::fs::remove_file(&archive).unwrap();
    assert!(harness.applications.is_updated_zombie_artifact("broken"));
}

#[tokio::test]
async fn start_failure_quarantines_exploded_artifact() {
    let harness = TestHarness::new();
    harness.apps_factory.script("app1", Script { fail_start: true, ..Default::default() });
    let location = write_exploded(&harness.apps_dir(), "app1", None);
    let descriptor = location.join("hangar-artifact.yaml");
    touch(&descriptor, 1_000_000);

    let result = harness.applications.deploy_exploded_artifact("app1", None).await;
    assert!(matches!(result, Err(DeployError::Start { .. })));
    assert_eq!(harness.apps_factory.starts_of("app1"), 1);

    // quarantined: the next attempt is a silent no-op
    let skipped = harness
        .applications
        .deploy_exploded_artifact("app1", None)
        .await
        .unwrap();
    assert!(skipped.is_none());
    assert_eq!(harness.apps_factory.starts_of("app1"), 1);

    // fix the artifact and touch its descriptor: eligible again, and a
    // success clears the quarantine
    harness.apps_factory.script("app1", Script::default());
    touch(&descriptor, 1_000_001);
    assert!(harness.applications.is_updated_zombie_artifact("app1"));

    let deployed = harness
        .applications
        .deploy_exploded_artifact("app1", None)
        .await
        .unwrap();
    assert!(deployed.is_some());
    assert!(harness.applications.zombie_resources().is_empty());

    // live and healthy: not an update candidate anymore
    assert!(!harness.applications.is_updated_zombie_artifact("app1"));
}

#[tokio::test]
async fn successful_deploy_is_not_a_zombie() {
    let harness = TestHarness::new();
    let archive = write_app_archive(&harness.apps_dir(), "app1", None);

    let deployed = harness
        .applications
        .deploy_packaged_artifact(&archive, None)
        .await
        .unwrap();
    assert!(deployed.is_some());
    assert!(harness.applications.zombie_resources().is_empty());
    assert!(!harness.applications.is_updated_zombie_artifact("app1"));
}

#[tokio::test]
async fn undeploy_of_live_quarantined_artifact_is_a_noop() {
    let harness = TestHarness::new();
    let listener = RecordingListener::new();
    harness.applications.add_listener(listener.clone());

    harness.apps_factory.script("app1", Script { fail_start: true, ..Default::default() });
    write_exploded(&harness.apps_dir(), "app1", None);
    let _ = harness.applications.deploy_exploded_artifact("app1", None).await;

    // quarantine files still on disk: undeploy silently declines
    harness.applications.undeploy_artifact("app1").await.unwrap();
    assert_eq!(listener.count_of("undeployment_start:app1"), 0);
    assert!(harness.applications.find_artifact("app1").is_some());

    // once the files are gone the record is dropped and undeploy proceeds
    std::fs::remove_dir_all(harness.apps_dir().join("app1")).unwrap();
    harness.applications.undeploy_artifact("app1").await.unwrap();
    assert_eq!(listener.count_of("undeployment_success:app1"), 1);
    assert!(harness.applications.find_artifact("app1").is_none());
    assert!(harness.applications.zombie_resources().is_empty());
}

#[tokio::test]
async fn fresh_deployer_has_no_quarantine_memory() {
    let harness = TestHarness::new();
    let archive = harness.apps_dir().join("broken.tgz");
    std::fs::write(&archive, b"not a gzip stream").unwrap();

    let _ = harness.applications.deploy_packaged_artifact(&archive, None).await;
    assert!(!harness.applications.is_updated_zombie_artifact("broken"));

    // a restarted orchestrator re-attempts previously failed artifacts once
    let restarted = TestHarness::new();
    assert!(restarted.applications.is_updated_zombie_artifact("broken"));
}
