//! Direct mode: sources travel with every call and nothing is registered.

use std::sync::Arc;

use lua_loader::{Error, ExecutionMode, LoaderOptions, MemoryStore, ScriptLoadState, ScriptLoader};
use serde_json::json;

use crate::fixture::{next_error, script_dir, wait_ready, DEFAULT_SCRIPTS};

#[tokio::test]
async fn test_direct_mode_keeps_source_in_memory() {
    let dir = script_dir(&[("return_one.lua", "return 1")]);
    let store = Arc::new(MemoryStore::connected());
    let loader = ScriptLoader::builder(store.clone())
        .src(dir.path())
        .mode(ExecutionMode::Direct)
        .spawn();
    wait_ready(&loader).await;

    std::fs::remove_file(dir.path().join("return_one.lua")).unwrap();

    assert_eq!(loader.invoke("returnOne", vec![]).await.unwrap(), json!(1));
    assert_eq!(loader.sha("returnOne"), None);
    assert_eq!(loader.source("returnOne").as_deref(), Some("return 1"));
    assert_eq!(store.registrations(), 0);
    assert_eq!(store.invocations(), 1);
}

#[tokio::test]
async fn test_direct_mode_survives_flush() {
    let dir = script_dir(&[("return_one.lua", "return 1")]);
    let store = Arc::new(MemoryStore::connected());
    let loader = ScriptLoader::builder(store.clone())
        .src(dir.path())
        .preload(false)
        .spawn();
    wait_ready(&loader).await;

    store.flush();
    let script = loader.get("returnOne").unwrap();
    assert_eq!(script.mode(), ExecutionMode::Direct);
    assert_eq!(script.invoke(vec![]).await.unwrap(), json!(1));
}

#[tokio::test]
async fn test_options_from_json_file() {
    let dir = script_dir(&DEFAULT_SCRIPTS);
    let config = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        config.path(),
        json!({ "src": dir.path(), "preload": false }).to_string(),
    )
    .unwrap();

    let options = LoaderOptions::from_json_file(config.path()).unwrap();
    assert_eq!(options.effective_mode(), ExecutionMode::Direct);

    let store = Arc::new(MemoryStore::connected());
    let loader = ScriptLoader::spawn(store.clone(), options);
    wait_ready(&loader).await;

    assert_eq!(loader.len(), DEFAULT_SCRIPTS.len());
    assert_eq!(
        loader.invoke("getKeys", vec![json!(1), json!("user:1")]).await.unwrap(),
        json!([1, "user:1"])
    );
    assert_eq!(store.registrations(), 0);
}

#[tokio::test]
async fn test_empty_script_is_not_listed() {
    let dir = script_dir(&[("empty.lua", ""), ("one.lua", "return 1")]);
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected()))
        .mode(ExecutionMode::Direct)
        .build();
    let mut events = loader.subscribe();

    let report = loader.load_all(&[dir.path().to_path_buf()]).await;
    assert_eq!(report.loaded, 1);
    assert_eq!(report.failed, 1);

    let err = next_error(&mut events).await;
    assert!(matches!(err.as_ref(), Error::NoSource(name) if name == "empty"));

    assert_eq!(loader.names(), vec!["one"]);
    assert_eq!(loader.len(), 1);
    assert_eq!(loader.status("empty"), Some(ScriptLoadState::Failed));
    assert!(loader.get("empty").is_none());
    assert!(loader.source("empty").is_none());
}

#[tokio::test]
async fn test_unknown_name_in_direct_mode() {
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected()))
        .mode(ExecutionMode::Direct)
        .spawn();
    wait_ready(&loader).await;

    let err = loader.wrap("foobar").unwrap_err();
    assert!(err.is_usage());
    assert_eq!(err.to_string(), "No code found for script `foobar`");
}
