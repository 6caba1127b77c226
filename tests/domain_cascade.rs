//! Domain undeploys cascade to dependent applications.

mod common;

use common::{write_exploded, RecordingListener, Script, TestHarness};
use hangar::deploy::DeployError;

async fn deploy_domain_and_apps(harness: &TestHarness) {
    write_exploded(&harness.domains_dir(), "core", None);
    harness
        .domain_deployer
        .deploy_exploded_artifact("core", None)
        .await
        .unwrap();

    for (app, domain) in [
        ("billing", Some("core")),
        ("reports", Some("core")),
        ("standalone", None),
    ] {
        write_exploded(&harness.apps_dir(), app, domain);
        harness
            .applications
            .deploy_exploded_artifact(app, None)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn domain_undeploy_cascades_to_dependent_applications() {
    let harness = TestHarness::new();
    let app_listener = RecordingListener::new();
    let domain_listener = RecordingListener::new();
    harness.applications.add_listener(app_listener.clone());
    harness.domains.add_listener(domain_listener.clone());

    deploy_domain_and_apps(&harness).await;
    assert_eq!(
        harness.domain_deployer.dependent_applications("core"),
        vec!["billing", "reports"]
    );

    harness.domain_deployer.undeploy_artifact("core").await.unwrap();

    // both dependent applications were fully undeployed before the domain
    let app_events = app_listener.events();
    let domain_events = domain_listener.events();
    assert_eq!(app_listener.count_of("undeployment_success:billing"), 1);
    assert_eq!(app_listener.count_of("undeployment_success:reports"), 1);
    assert_eq!(domain_listener.count_of("undeployment_success:core"), 1);

    let domain_done = domain_events
        .iter()
        .position(|e| e == "undeployment_success:core")
        .unwrap();
    assert_eq!(domain_done, domain_events.len() - 1);
    assert!(app_events
        .iter()
        .filter(|e| e.starts_with("undeployment_success"))
        .count()
        >= 2);

    // the independent application is untouched
    assert_eq!(app_listener.count_of("undeployment_start:standalone"), 0);
    assert_eq!(harness.applications.registry().names(), vec!["standalone"]);
    assert!(harness.domains.registry().is_empty());
}

#[tokio::test]
async fn failing_application_undeploy_does_not_stop_the_cascade() {
    let harness = TestHarness::new();
    let app_listener = RecordingListener::new();
    harness.applications.add_listener(app_listener.clone());

    harness.apps_factory.script("billing", Script { fail_stop: true, ..Default::default() });
    deploy_domain_and_apps(&harness).await;

    let result = harness.domain_deployer.undeploy_artifact("core").await;

    // the first failure is surfaced after every attempt has been made
    assert!(matches!(result, Err(DeployError::Stop { .. })));
    assert_eq!(app_listener.count_of("undeployment_failure:billing"), 1);
    assert_eq!(app_listener.count_of("undeployment_success:reports"), 1);
    assert!(harness.domains.registry().is_empty());
}

#[tokio::test]
async fn domains_bypass_quarantine() {
    let harness = TestHarness::new();
    harness.domains_factory.script("core", Script { fail_start: true, ..Default::default() });
    write_exploded(&harness.domains_dir(), "core", None);

    let result = harness
        .domain_deployer
        .deploy_exploded_artifact("core", None)
        .await;
    assert!(matches!(result, Err(DeployError::Start { .. })));

    // a failing domain is always eligible for another attempt
    assert!(harness.domain_deployer.is_updated_zombie_artifact("core"));
    assert!(harness.domains.zombie_resources().is_empty());
}

#[tokio::test]
async fn cascade_order_is_independent_of_deploy_order() {
    let harness = TestHarness::new();
    let app_listener = RecordingListener::new();
    harness.applications.add_listener(app_listener.clone());

    // applications deployed before their domain
    for app in ["zeta", "alpha"] {
        write_exploded(&harness.apps_dir(), app, Some("core"));
        harness.applications.deploy_exploded_artifact(app, None).await.unwrap();
    }
    write_exploded(&harness.domains_dir(), "core", None);
    harness
        .domain_deployer
        .deploy_exploded_artifact("core", None)
        .await
        .unwrap();

    harness.domain_deployer.undeploy_artifact("core").await.unwrap();

    assert_eq!(app_listener.count_of("undeployment_success:zeta"), 1);
    assert_eq!(app_listener.count_of("undeployment_success:alpha"), 1);
    assert!(harness.applications.registry().is_empty());
}
