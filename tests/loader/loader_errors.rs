//! Conflicts, rejected scripts, usage errors and failed invocations.

use std::sync::Arc;

use lua_loader::{
    Error, LoaderEvent, MemoryStore, NameResolver, RemoteError, ScriptError, ScriptLoadState,
    ScriptLoader,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::fixture::{errors_until_ready, next_error, script_dir, wait_ready, DEFAULT_SCRIPTS};

const BAD_JSON: &str = "local data = cjson.decode(ARGV[1])\n\
                        if not data then error('invalid json') end\n\
                        return data\n";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_name_in_two_directories_conflicts() {
    let first = script_dir(&[("return_one.lua", "return 1")]);
    let second = script_dir(&[("return-one.lua", "return 2"), ("other.lua", "return 3")]);
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected()))
        .dirs([first.path(), second.path()])
        .build();
    let mut events = loader.subscribe();
    loader.start();

    let errors = errors_until_ready(&mut events).await;
    assert_eq!(errors.len(), 1, "errors: {errors:?}");
    match errors[0].as_ref() {
        Error::Conflict { name, .. } => assert_eq!(name, "returnOne"),
        other => panic!("expected conflict, got {other}"),
    }
    assert_eq!(errors[0].to_string(), "Script naming conflict for `returnOne`.");

    // Exactly one callable, backed by whichever file claimed the name first.
    assert_eq!(loader.names(), vec!["other", "returnOne"]);
    let value = loader.invoke("returnOne", vec![]).await.unwrap();
    assert!(value == json!(1) || value == json!(2));
}

#[tokio::test]
async fn test_index_file_conflicts_with_sibling() {
    let dir = script_dir(&[("foo.lua", "return 1"), ("foo/index.lua", "return 2")]);
    let resolver = NameResolver::new("strip_index", |path: &str| {
        path.trim_end_matches("/index").replace('/', "_")
    });
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected()))
        .namespace(true)
        .resolver(resolver)
        .build();

    let report = loader.load_all(&[dir.path().to_path_buf()]).await;
    assert_eq!(report.loaded, 1);
    assert_eq!(report.conflicts, 1);
    assert_eq!(loader.names(), vec!["foo"]);
}

#[tokio::test]
async fn test_bad_scripts_report_errors_and_still_ready() {
    let dir = script_dir(&[
        ("broken.lua", "local x = syntax error"),
        ("fine.lua", "return 1"),
    ]);
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected()))
        .src(dir.path())
        .build();
    let mut events = loader.subscribe();
    loader.start();

    let errors = errors_until_ready(&mut events).await;
    assert_eq!(errors.len(), 1);
    match errors[0].as_ref() {
        Error::Registration { name, source } => {
            assert_eq!(name, "broken");
            assert!(matches!(source, RemoteError::Script(_)));
        }
        other => panic!("expected registration error, got {other}"),
    }
    assert!(errors[0]
        .to_string()
        .starts_with("Unable to load script: `broken` - "));

    assert_eq!(loader.status("broken"), Some(ScriptLoadState::Failed));
    assert!(loader.get("broken").is_none());
    assert!(loader.get("fine").is_some());
}

#[tokio::test]
async fn test_unknown_name_fails_before_remote_call() {
    let dir = script_dir(&DEFAULT_SCRIPTS);
    let store = Arc::new(MemoryStore::connected());
    let loader = ScriptLoader::builder(store.clone()).src(dir.path()).spawn();
    wait_ready(&loader).await;

    let err = loader.wrap("foobar").unwrap_err();
    assert!(err.is_usage());
    assert_eq!(err.to_string(), "Script name `foobar` not loaded.");

    assert!(loader.call("foobar", vec![], None).is_err());
    assert!(matches!(
        loader.invoke("foobar", vec![]).await,
        Err(Error::NotLoaded(_))
    ));
    assert_eq!(store.invocations(), 0);
}

#[tokio::test]
async fn test_invocation_error_carries_source_and_sha() {
    let dir = script_dir(&[("bad-json.lua", BAD_JSON)]);
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected()))
        .src(dir.path())
        .spawn();
    wait_ready(&loader).await;

    let (tx, rx) = oneshot::channel();
    loader
        .call(
            "badJson",
            vec![json!(1), json!("{hi}")],
            Some(Box::new(move |result: Result<Value, ScriptError>| {
                let _ = tx.send(result);
            })),
        )
        .unwrap();

    let err = rx.await.unwrap().unwrap_err();
    let on_disk = std::fs::read_to_string(dir.path().join("bad-json.lua")).unwrap();
    assert_eq!(err.source_code(), Some(on_disk.as_str()));
    assert_eq!(err.sha.as_deref(), loader.sha("badJson").as_deref());
    assert!(err.sha.is_some());
    assert_eq!(
        err.to_string(),
        "Error running lua script: `badJson`. ERR user_script:1: if not data then error('invalid json') end"
    );
}

#[tokio::test]
async fn test_unhandled_invocation_error_is_published() {
    let dir = script_dir(&[("bad-json.lua", BAD_JSON)]);
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected()))
        .src(dir.path())
        .build();
    let mut events = loader.subscribe();
    loader.start();
    assert!(errors_until_ready(&mut events).await.is_empty());

    loader.call("badJson", vec![json!(1), json!("{hi}")], None).unwrap();

    let err = next_error(&mut events).await;
    match err.as_ref() {
        Error::Invocation(script_err) => {
            assert_eq!(script_err.name, "badJson");
            assert_eq!(script_err.source_code(), Some(BAD_JSON));
        }
        other => panic!("expected invocation error, got {other}"),
    }
}

#[tokio::test]
async fn test_flushed_store_reports_noscript() {
    let dir = script_dir(&[("return_one.lua", "return 1")]);
    let store = Arc::new(MemoryStore::connected());
    let loader = ScriptLoader::builder(store.clone()).src(dir.path()).spawn();
    wait_ready(&loader).await;

    store.flush();
    let err = loader.invoke("returnOne", vec![]).await.unwrap_err();
    match err {
        Error::Invocation(script_err) => {
            assert!(matches!(script_err.remote, RemoteError::NoScript(_)));
            assert_eq!(script_err.sha, loader.sha("returnOne"));
        }
        other => panic!("expected invocation error, got {other}"),
    }
}

#[tokio::test]
async fn test_missing_directory_does_not_block_others() {
    let dir = script_dir(&[("return_one.lua", "return 1")]);
    let missing = dir.path().join("does-not-exist");
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected()))
        .dirs([missing.clone(), dir.path().to_path_buf()])
        .build();
    let mut events = loader.subscribe();
    loader.start();

    let errors = errors_until_ready(&mut events).await;
    assert_eq!(errors.len(), 1);
    match errors[0].as_ref() {
        Error::Discovery { path, .. } => assert_eq!(path, &missing),
        other => panic!("expected discovery error, got {other}"),
    }
    assert!(loader.get("returnOne").is_some());
}

#[tokio::test]
async fn test_unreadable_file_does_not_block_siblings() {
    let dir = script_dir(&[("return_one.lua", "return 1")]);
    let bad = dir.path().join("bad.lua");
    std::fs::write(&bad, [0xff, 0xfe, 0x00, 0x80]).unwrap();
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected()))
        .src(dir.path())
        .build();
    let mut events = loader.subscribe();
    loader.start();

    let errors = errors_until_ready(&mut events).await;
    assert_eq!(errors.len(), 1, "errors: {errors:?}");
    match errors[0].as_ref() {
        Error::Discovery { path, .. } => assert_eq!(path, &bad),
        other => panic!("expected discovery error, got {other}"),
    }
    assert!(loader.is_ready());
    assert_eq!(loader.names(), vec!["returnOne"]);
    assert_eq!(loader.invoke("returnOne", vec![]).await.unwrap(), json!(1));
}

#[tokio::test]
async fn test_failed_name_is_not_taken_over_by_later_scan() {
    let first = script_dir(&[("foo.lua", "local x = syntax error")]);
    let second = script_dir(&[("foo.lua", "return 1")]);
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected())).build();

    let report = loader.load_all(&[first.path().to_path_buf()]).await;
    assert_eq!(report.failed, 1);

    let report = loader.load_all(&[second.path().to_path_buf()]).await;
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.loaded, 0);
    assert_eq!(loader.status("foo"), Some(ScriptLoadState::Failed));
    assert!(loader.get("foo").is_none());

    loader.load_script("foo", "return 1").await.unwrap();
    assert_eq!(loader.invoke("foo", vec![]).await.unwrap(), json!(1));
}

#[tokio::test]
async fn test_empty_loader_publishes_only_ready() {
    let loader = ScriptLoader::builder(Arc::new(MemoryStore::connected())).build();
    let mut events = loader.subscribe();
    loader.start();

    let event = tokio::time::timeout(crate::fixture::TIMEOUT, events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, LoaderEvent::Ready));
    assert!(event.as_error().is_none());
}
