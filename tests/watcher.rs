// tests/watcher.rs

mod common;
use crate::common::{RecordingChangeHandler, SlowChangeHandler, TestResult, init_tracing, with_timeout};

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use pipedag::watch::{FileWatcher, WatchBinding};

const DEBOUNCE: Duration = Duration::from_millis(50);

/// Poll `cond` every 10ms until it holds.
async fn wait_until(cond: impl Fn() -> bool) {
    with_timeout(async {
        while !cond() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

/// Nothing else arrives within `window`.
async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>, window: Duration) {
    if let Ok(Some(extra)) = timeout(window, rx.recv()).await {
        panic!("unexpected extra batch: {extra:?}");
    }
}

#[tokio::test]
async fn bindings_fire_independently() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let (handler, mut rx) = RecordingChangeHandler::new();
    let mut watcher = FileWatcher::new(dir.path(), handler).with_debounce(DEBOUNCE);
    watcher.watch("sass/*.scss", "build-css")?;
    watcher.watch("js/*.js", "build-js")?;
    watcher.watch_reload("*.html")?;
    let handle = watcher.start()?;

    handle.trigger_path("sass/main.scss");

    let (binding, paths) = with_timeout(rx.recv()).await.expect("a batch");
    assert_eq!(binding.run.as_deref(), Some("build-css"));
    assert_eq!(paths, vec![handle.root().join("sass/main.scss")]);
    assert_quiet(&mut rx, Duration::from_millis(200)).await;

    handle.trigger_path("index.html");
    let (binding, _) = with_timeout(rx.recv()).await.expect("a batch");
    assert!(binding.reload);
    assert_eq!(binding.run, None);
    Ok(())
}

#[tokio::test]
async fn unmatched_paths_are_ignored() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let (handler, mut rx) = RecordingChangeHandler::new();
    let mut watcher = FileWatcher::new(dir.path(), handler).with_debounce(DEBOUNCE);
    watcher.watch("js/*.js", "build-js")?;
    let handle = watcher.start()?;

    handle.trigger_path("build/js/app.min.js");
    handle.trigger_path("js/nested/deep.js");
    handle.trigger_path("/somewhere/else/js/app.js");

    assert_quiet(&mut rx, Duration::from_millis(300)).await;
    Ok(())
}

#[tokio::test]
async fn bursts_coalesce_into_one_batch() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let (handler, mut rx) = RecordingChangeHandler::new();
    let mut watcher = FileWatcher::new(dir.path(), handler).with_debounce(Duration::from_millis(150));
    watcher.watch("sass/*.scss", "build-css")?;
    let handle = watcher.start()?;

    for name in ["b.scss", "a.scss", "b.scss", "c.scss", "a.scss"] {
        handle.trigger_path(format!("sass/{name}"));
    }

    let (_, paths) = with_timeout(rx.recv()).await.expect("a batch");
    let expected: Vec<PathBuf> = ["a.scss", "b.scss", "c.scss"]
        .iter()
        .map(|n| handle.root().join("sass").join(n))
        .collect();
    assert_eq!(paths, expected);
    assert_quiet(&mut rx, Duration::from_millis(400)).await;
    Ok(())
}

#[tokio::test]
async fn real_file_changes_are_detected() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("js"))?;
    let (handler, mut rx) = RecordingChangeHandler::new();
    let mut watcher = FileWatcher::new(dir.path(), handler).with_debounce(DEBOUNCE);
    watcher.watch("js/*.js", "build-js")?;
    let handle = watcher.start()?;

    sleep(Duration::from_millis(100)).await;
    fs::write(dir.path().join("js/app.js"), "console.log(1);")?;

    let (binding, paths) = with_timeout(rx.recv()).await.expect("a batch");
    assert_eq!(binding.run.as_deref(), Some("build-js"));
    assert!(paths.contains(&handle.root().join("js/app.js")), "paths: {paths:?}");
    Ok(())
}

#[tokio::test]
async fn use_hash_skips_unchanged_content() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("sass"))?;
    fs::write(dir.path().join("sass/main.scss"), "a { color: red; }")?;

    let (handler, mut rx) = RecordingChangeHandler::new();
    let mut watcher = FileWatcher::new(dir.path(), handler).with_debounce(DEBOUNCE);
    watcher.bind(WatchBinding::task("sass/*.scss", "build-css").with_hash(true))?;
    let handle = watcher.start()?;

    // Let the worker record the initial content hash.
    sleep(Duration::from_millis(100)).await;

    handle.trigger_path("sass/main.scss");
    assert_quiet(&mut rx, Duration::from_millis(300)).await;

    fs::write(dir.path().join("sass/main.scss"), "a { color: blue; }")?;
    handle.trigger_path("sass/main.scss");

    let (binding, _) = with_timeout(rx.recv()).await.expect("a batch");
    assert!(binding.use_hash);
    Ok(())
}

#[tokio::test]
async fn dropping_the_handle_stops_delivery() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let (handler, mut rx) = RecordingChangeHandler::new();
    let mut watcher = FileWatcher::new(dir.path(), handler).with_debounce(DEBOUNCE);
    watcher.watch("*.html", "noop")?;
    let handle = watcher.start()?;
    drop(handle);

    // Every worker holding the handler is gone, so the channel closes.
    let next = timeout(Duration::from_secs(2), rx.recv()).await?;
    assert!(next.is_none());
    Ok(())
}

#[tokio::test]
async fn bindings_for_the_same_task_share_one_run() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let handler = SlowChangeHandler::new(Duration::from_millis(300));
    let mut watcher = FileWatcher::new(dir.path(), handler.clone()).with_debounce(DEBOUNCE);
    watcher.watch("sass/*.scss", "build-css")?;
    watcher.watch("sass/**/*.scss", "build-css")?;
    let handle = watcher.start()?;

    handle.trigger_path("sass/a.scss");

    wait_until(|| handler.calls() == 1).await;
    sleep(Duration::from_millis(600)).await;
    assert_eq!(handler.calls(), 1);
    assert_eq!(handler.max_in_flight(), 1);
    Ok(())
}

#[tokio::test]
async fn shared_task_batches_merge_paths_from_every_binding() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let (handler, mut rx) = RecordingChangeHandler::new();
    let mut watcher = FileWatcher::new(dir.path(), handler).with_debounce(Duration::from_millis(150));
    watcher.watch("sass/*.scss", "build-css")?;
    watcher.bind(WatchBinding::task("vendor/**/*.scss", "build-css").and_reload())?;
    let handle = watcher.start()?;

    handle.trigger_path("sass/main.scss");
    handle.trigger_path("vendor/grid/_cols.scss");

    let (binding, paths) = with_timeout(rx.recv()).await.expect("a batch");
    assert_eq!(binding.run.as_deref(), Some("build-css"));
    assert!(binding.reload);
    assert_eq!(
        paths,
        vec![
            handle.root().join("sass/main.scss"),
            handle.root().join("vendor/grid/_cols.scss"),
        ]
    );
    assert_quiet(&mut rx, Duration::from_millis(400)).await;
    Ok(())
}

#[tokio::test]
async fn changes_during_a_run_produce_one_follow_up() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let handler = SlowChangeHandler::new(Duration::from_millis(300));
    let mut watcher = FileWatcher::new(dir.path(), handler.clone()).with_debounce(DEBOUNCE);
    watcher.watch("sass/*.scss", "build-css")?;
    let handle = watcher.start()?;

    handle.trigger_path("sass/main.scss");
    wait_until(|| handler.in_flight() == 1).await;

    for i in 0..10 {
        handle.trigger_path(format!("sass/part{i}.scss"));
    }

    wait_until(|| handler.calls() == 2 && handler.in_flight() == 0).await;
    sleep(Duration::from_millis(400)).await;
    assert_eq!(handler.calls(), 2);
    assert_eq!(handler.max_in_flight(), 1);
    Ok(())
}
