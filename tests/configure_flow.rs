//! End-to-end Configure runs against the in-memory Vault.

mod common;

use common::{Bundle, FakeFactory, FakeVault, AWS_MOUNT};
use std::fs;
use std::sync::Arc;
use vault_armor::configure::{ConfigAction, ConfigRequest, ConfigureError, Configurator};
use vault_armor::{ConfigOptions, ProxyError, ProxyService, Service};

fn service(vault: &Arc<FakeVault>, bundle: &Bundle) -> (ProxyService, FakeFactory) {
    let factory = FakeFactory::new(vault.clone());
    let svc = ProxyService::new(
        Arc::new(factory.clone()),
        Configurator::new(Some(bundle.staging_root())),
    );
    (svc, factory)
}

const POSTGRES: &str =
    r#"{"type":"postgresql","config":{"default_lease_ttl":"7h","max_lease_ttl":"21h"}}"#;
const AWS: &str = r#"{"type":"aws","config":{"default_lease_ttl":"8h","max_lease_ttl":"24h"}}"#;

#[tokio::test]
async fn mounts_are_listed_from_vault_after_adding() {
    common::init_logging();
    let vault = FakeVault::fresh();
    let bundle = Bundle::new()
        .file("sys/mounts/postgresql/postgresql.json", POSTGRES)
        .file("sys/mounts/aws/aws.json", AWS);
    let (svc, factory) = service(&vault, &bundle);

    let state = svc
        .configure(ConfigOptions::new(bundle.url(), "s.token"))
        .await
        .unwrap();

    let mounts = state.mounts.unwrap();
    assert_eq!(
        mounts.keys().collect::<Vec<_>>(),
        vec!["aws/", "postgresql/"]
    );
    assert_eq!(mounts["postgresql/"].mount_type, "postgresql");
    assert_eq!(mounts["postgresql/"].config.default_lease_ttl, 25200);
    assert_eq!(mounts["postgresql/"].config.max_lease_ttl, 75600);
    assert_eq!(mounts["aws/"].config.default_lease_ttl, 28800);
    assert_eq!(mounts["aws/"].config.max_lease_ttl, 86400);
    assert!(state.auths.is_none());
    assert!(state.policies.is_none());

    // The request ID names the staging directory the bundle was fetched into.
    let staged = bundle.staged();
    assert_eq!(staged.len(), 1);
    assert_eq!(
        staged[0].file_name().unwrap().to_string_lossy(),
        state.config_id
    );
    assert_eq!(factory.tokens(), vec![Some("s.token".to_string())]);
    assert_eq!(
        vault.calls(),
        vec!["mount aws", "mount postgresql", "list_mounts"]
    );
}

#[tokio::test]
async fn tune_only_bundle_leaves_other_namespaces_unset() {
    let vault = FakeVault::dev();
    let first = Bundle::new().file("sys/mounts/postgresql/postgresql.json", POSTGRES);
    let (svc, _) = service(&vault, &first);
    svc.configure(ConfigOptions::new(first.url(), "t"))
        .await
        .unwrap();

    let second = Bundle::new().file(
        "sys/mounts/postgresql/tune/postgresql.json",
        r#"{"default_lease_ttl":"1h","max_lease_ttl":"2h"}"#,
    );
    let (svc, _) = service(&vault, &second);
    let state = svc
        .configure(ConfigOptions::new(second.url(), "t"))
        .await
        .unwrap();

    assert!(state.auths.is_none());
    assert!(state.policies.is_none());
    let mounts = state.mounts.unwrap();
    assert!(mounts.contains_key("secret/"));
    assert_eq!(mounts["postgresql/"].config.default_lease_ttl, 3600);
    assert_eq!(mounts["postgresql/"].config.max_lease_ttl, 7200);
    assert!(vault.calls().contains(&"tune_mount postgresql".to_string()));
}

#[tokio::test]
async fn auth_disable_ignores_file_content() {
    let vault = FakeVault::dev();
    vault.insert_auth("userpass/", "userpass");
    let bundle = Bundle::new().file("sys/auth/userpass/disable/userpass.json", "not json at all");
    let (svc, _) = service(&vault, &bundle);

    let state = svc
        .configure(ConfigOptions::new(bundle.url(), "t"))
        .await
        .unwrap();

    let auths = state.auths.unwrap();
    assert!(!auths.contains_key("userpass/"));
    assert!(auths.contains_key("token/"));
    assert!(state.mounts.is_none());
}

#[tokio::test]
async fn namespaces_run_mounts_then_auths_then_policies() {
    let vault = FakeVault::dev();
    let bundle = Bundle::new()
        .file(
            "sys/policy/reader/reader.json",
            r#"{"rules":"path \"secret/*\" { capabilities = [\"read\"] }"}"#,
        )
        .file("sys/policy/default/disable/default.json", "")
        .file("sys/auth/approle/approle.json", r#"{"type":"approle","description":"apps"}"#)
        .file("sys/mounts/cdw/mans/xyzinc/app1/prod/db/db.json", AWS_MOUNT);
    let (svc, _) = service(&vault, &bundle);

    let state = svc
        .configure(ConfigOptions::new(bundle.url(), "t"))
        .await
        .unwrap();

    assert_eq!(
        vault.calls(),
        vec![
            "mount cdw/mans/xyzinc/app1/prod/db",
            "list_mounts",
            "enable_auth approle",
            "list_auth",
            "put_policy reader",
            "delete_policy default",
            "list_policies",
        ]
    );
    assert!(state.mounts.unwrap().contains_key("cdw/mans/xyzinc/app1/prod/db/"));
    assert_eq!(state.policies.unwrap(), vec!["reader", "root"]);
}

#[tokio::test]
async fn missing_data_dir_never_reaches_vault() {
    let vault = FakeVault::dev();
    let bundle = Bundle::without_data().raw_file("sys/mounts/aws/aws.json", AWS);
    let (svc, factory) = service(&vault, &bundle);

    let err = svc
        .configure(ConfigOptions::new(bundle.url(), "t"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProxyError::Configure(ConfigureError::SrcMalformed)
    ));
    assert!(err.is_client_error());
    assert!(vault.calls().is_empty());
    assert!(factory.tokens().is_empty());
}

#[tokio::test]
async fn unrecognized_paths_are_an_empty_request() {
    let vault = FakeVault::dev();
    let bundle = Bundle::new()
        .file("sys/leases/lookup.json", "{}")
        .file("secret/data/app.json", "{}")
        .file("sys/mounts/aws/aws.yaml", "type: aws");
    let (svc, _) = service(&vault, &bundle);

    let err = svc
        .configure(ConfigOptions::new(bundle.url(), "t"))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "no valid vault configuration files were found in source directory submitted"
    );
    assert!(vault.calls().is_empty());
}

#[tokio::test]
async fn mount_disable_and_auth_tune_are_skipped() {
    let vault = FakeVault::dev();
    let bundle = Bundle::new()
        .file("sys/mounts/secret/disable/secret.json", "{}")
        .file("sys/auth/token/tune/token.json", "{}");
    let (svc, _) = service(&vault, &bundle);

    let err = svc
        .configure(ConfigOptions::new(bundle.url(), "t"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProxyError::Configure(ConfigureError::SrcReqEmpty)
    ));
}

#[tokio::test]
async fn first_vault_failure_aborts_without_rollback() {
    let vault = FakeVault::fresh();
    vault.fail_on("mount postgresql");
    let bundle = Bundle::new()
        .file("sys/mounts/aws/aws.json", AWS)
        .file("sys/mounts/postgresql/postgresql.json", POSTGRES)
        .file("sys/policy/reader/reader.json", r#"{"rules":""}"#);
    let (svc, _) = service(&vault, &bundle);

    let err = svc
        .configure(ConfigOptions::new(bundle.url(), "t"))
        .await
        .unwrap_err();

    assert!(!err.is_client_error());
    assert_eq!(vault.calls(), vec!["mount aws"]);
    assert!(vault.state.lock().unwrap().mounts.contains_key("aws/"));
}

#[tokio::test]
async fn malformed_add_file_is_a_decode_error() {
    let vault = FakeVault::fresh();
    let bundle = Bundle::new().file("sys/mounts/aws/aws.json", "{\"type\": ");
    let (svc, _) = service(&vault, &bundle);

    let err = svc
        .configure(ConfigOptions::new(bundle.url(), "t"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProxyError::Configure(ConfigureError::Deserialize { .. })
    ));
    assert!(vault.calls().is_empty());
}

#[tokio::test]
async fn staging_root_must_exist() {
    let vault = FakeVault::fresh();
    let bundle = Bundle::new().file("sys/mounts/aws/aws.json", AWS);
    let missing = bundle.staging_root().join("nope");
    let svc = ProxyService::new(
        Arc::new(FakeFactory::new(vault.clone())),
        Configurator::new(Some(missing)),
    );

    let err = svc
        .configure(ConfigOptions::new(bundle.url(), "t"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProxyError::Configure(ConfigureError::DestDoesNotExist(_))
    ));
    assert!(!err.is_client_error());
}

#[tokio::test]
async fn missing_source_names_the_path() {
    let vault = FakeVault::fresh();
    let bundle = Bundle::new();
    let (svc, _) = service(&vault, &bundle);
    let source = bundle.source.path().join("absent");

    let err = svc
        .configure(ConfigOptions::new(source.display().to_string(), "t"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("{}: no such file or directory", source.display())
    );
}

#[test]
fn classification_is_idempotent() {
    let bundle = Bundle::new()
        .file("sys/mounts/postgresql/postgresql.json", POSTGRES)
        .file("sys/mounts/postgresql/tune/postgresql.json", "{}")
        .file("sys/auth/userpass/disable/userpass.json", "")
        .file("sys/policy/reader/reader.json", r#"{"rules":""}"#);
    let data = bundle.source.path().join("data");

    let first = ConfigRequest::scan("id", "t", &data);
    let second = ConfigRequest::scan("id", "t", &data);
    assert_eq!(first, second);
    assert_eq!(
        first.actions,
        vec![
            ConfigAction::MountAdd,
            ConfigAction::MountTune,
            ConfigAction::AuthDisable,
            ConfigAction::PolicyAdd,
        ]
    );
    assert_eq!(first.mount_add["postgresql"].vault_end_point, "/sys/mounts/");
    assert_eq!(first.auth_disable["userpass"].file, "userpass.json");

    // Nothing under the bundle was consumed.
    assert!(data.join("sys/auth/userpass/disable/userpass.json").exists());
    assert_eq!(
        fs::read_to_string(data.join("sys/mounts/postgresql/postgresql.json")).unwrap(),
        POSTGRES
    );
}

#[tokio::test]
async fn empty_add_maps_are_reported_per_namespace() {
    let vault = FakeVault::dev();
    let request = ConfigRequest::default();

    let err = request.add_mounts(&*vault).await.unwrap_err();
    assert!(matches!(
        err,
        ConfigureError::RequestMapEmpty(ConfigAction::MountAdd)
    ));
    assert_eq!(
        err.to_string(),
        "no valid vault configuration requests submitted for adding /sys/mounts/"
    );

    let err = request.add_auths(&*vault).await.unwrap_err();
    assert!(matches!(
        err,
        ConfigureError::RequestMapEmpty(ConfigAction::AuthAdd)
    ));
    assert_eq!(
        err.to_string(),
        "no valid vault configuration requests submitted for adding /sys/auth/"
    );

    assert!(vault.calls().is_empty());
}

#[tokio::test]
async fn staging_root_that_is_not_a_directory_fails_stat() {
    let vault = FakeVault::fresh();
    let bundle = Bundle::new().file("sys/mounts/aws/aws.json", AWS);
    let file = bundle.staging_root().join("staging.txt");
    fs::write(&file, "").unwrap();

    for root in [file.clone(), file.join("nested")] {
        let svc = ProxyService::new(
            Arc::new(FakeFactory::new(vault.clone())),
            Configurator::new(Some(root)),
        );
        let err = svc
            .configure(ConfigOptions::new(bundle.url(), "t"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Configure(ConfigureError::DestStatFail { .. })
        ));
        assert!(err
            .to_string()
            .starts_with("policy download dest failed being stat'd"));
        assert!(!err.is_client_error());
    }
    assert!(vault.calls().is_empty());
}

#[tokio::test]
async fn staging_root_inside_the_source_is_rejected() {
    let vault = FakeVault::fresh();
    let bundle = Bundle::new().file("sys/mounts/aws/aws.json", AWS);
    let staging = bundle.source.path().join("staging");
    fs::create_dir(&staging).unwrap();
    let svc = ProxyService::new(
        Arc::new(FakeFactory::new(vault.clone())),
        Configurator::new(Some(staging.clone())),
    );

    let err = svc
        .configure(ConfigOptions::new(bundle.url(), "t"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProxyError::Configure(ConfigureError::SrcContainsDest { .. })
    ));
    assert!(err.is_client_error());
    assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    assert!(vault.calls().is_empty());
}
