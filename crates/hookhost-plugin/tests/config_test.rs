//! Integration tests for per-plugin configuration through the capability object.

mod helpers;

use serde_json::json;

use hookhost_plugin::ConfigUpdate;

use helpers::TestHost;

#[tokio::test]
async fn test_documents_live_beside_the_plugin_directory() {
    let host = TestHost::new();
    let store = host.manager.config_store();

    store
        .set("a", ConfigUpdate::Key("retries".into(), json!(3)))
        .await
        .unwrap();

    assert_eq!(host.config_dir(), host.plugins.parent().unwrap().join("config"));
    assert!(host.config_dir().join("a.json").is_file());
    assert_eq!(store.get("a", Some("retries")).await, Some(json!(3)));
    assert_eq!(store.get("b", None).await, None);
}

#[tokio::test]
async fn test_corrupt_document_reads_as_empty() {
    let host = TestHost::new();
    std::fs::create_dir_all(host.config_dir()).unwrap();
    std::fs::write(host.config_dir().join("a.json"), "{{{").unwrap();

    let store = host.manager.config_store();
    assert_eq!(store.get("a", None).await, None);
    assert_eq!(store.get("a", Some("k")).await, None);
}

#[tokio::test]
async fn test_configured_directory_is_used() {
    let custom = tempfile::tempdir().unwrap();
    let path = custom.path().to_path_buf();
    let host = TestHost::with_settings(move |settings| {
        settings.hot_reload = false;
        settings.config_directory = Some(path.to_string_lossy().into_owned());
    });

    host.manager
        .config_store()
        .set("a", ConfigUpdate::Key("k".into(), json!("v")))
        .await
        .unwrap();

    assert!(custom.path().join("a.json").is_file());
}
