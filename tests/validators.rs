// tests/validators.rs

mod common;
use crate::common::{TestResult, init_tracing, with_timeout};

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::RawQuery;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tempfile::tempdir;

use pipedag::config::parse_str;
use pipedag::config::ConfigFile;
use pipedag::errors::PipedagError;
use pipedag::exec::{Workspace, build_task_graph};
use pipedag::plugin::Flags;

/// Markup containing `<blink>` gets one error.
async fn nu_checker(body: String) -> impl IntoResponse {
    let answer = if body.contains("<blink>") {
        r#"{"messages":[{"type":"error","message":"Element blink not allowed"},{"type":"info","message":"ok"}]}"#
    } else {
        r#"{"messages":[{"type":"info","message":"ok"}]}"#
    };
    ([(CONTENT_TYPE, "application/json")], answer)
}

/// Echoes the requested profile; stylesheets mentioning `colour` get one error.
async fn css_validator(RawQuery(query): RawQuery) -> impl IntoResponse {
    let query = query.unwrap_or_default();
    let profile = query
        .split('&')
        .find_map(|kv| kv.strip_prefix("profile="))
        .unwrap_or("none")
        .to_string();
    let errors = usize::from(query.contains("colour"));
    let answer = format!(
        r#"{{"cssvalidation":{{"csslevel":"{profile}","result":{{"errorcount":{errors}}}}}}}"#
    );
    ([(CONTENT_TYPE, "application/json")], answer)
}

async fn start_fake_validators() -> std::io::Result<SocketAddr> {
    let app = Router::new()
        .route("/nu", post(nu_checker))
        .route("/css", get(css_validator));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

fn config(addr: SocketAddr) -> Result<ConfigFile, PipedagError> {
    ConfigFile::try_from(parse_str(&format!(
        r#"
[task.valid-html]
[[task.valid-html.step]]
plugin = "validate-html"
src = ["index.html"]
dest = "build"
options = {{ endpoint = "http://{addr}/nu" }}

[task.valid-css]
[[task.valid-css.step]]
plugin = "validate-css"
src = ["build/css/*.css"]
dest = "build"
options = {{ endpoint = "http://{addr}/css", sleep_ms = 0 }}
"#
    ))?)
}

fn write(root: &Path, rel: &str, contents: &str) -> std::io::Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

#[tokio::test]
async fn html_report_is_written_and_errors_are_not_fatal() -> TestResult {
    init_tracing();

    let addr = start_fake_validators().await?;
    let dir = tempdir()?;
    write(dir.path(), "index.html", "<html><body><blink>hi</blink></body></html>")?;

    let cfg = config(addr)?;
    let ws = Arc::new(Workspace::from_config(&cfg, dir.path(), Flags::new()));
    let graph = Arc::new(build_task_graph(&cfg, ws)?);

    with_timeout(graph.run("valid-html")).await?.into_result()?;

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("build/w3-html.json"))?)?;
    assert_eq!(report["messages"][0]["type"], "error");
    Ok(())
}

#[tokio::test]
async fn fail_on_error_flag_fails_the_task() -> TestResult {
    init_tracing();

    let addr = start_fake_validators().await?;
    let dir = tempdir()?;
    write(dir.path(), "index.html", "<html><body><blink>hi</blink></body></html>")?;

    let cfg = config(addr)?;
    let flags = pipedag::build_flags(None, vec![("fail_on_error".into(), "true".into())]);
    let ws = Arc::new(Workspace::from_config(&cfg, dir.path(), flags));
    let graph = Arc::new(build_task_graph(&cfg, ws)?);

    let err = with_timeout(graph.run("valid-html")).await?.into_result().unwrap_err();
    match err {
        PipedagError::TaskFailed { task, cause } => {
            assert_eq!(task, "valid-html");
            assert!(format!("{cause:#}").contains("index.html"), "cause: {cause:#}");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    // The report is still written before failing.
    assert!(dir.path().join("build/w3-html.json").exists());
    Ok(())
}

#[tokio::test]
async fn css_profile_comes_from_the_cli() -> TestResult {
    init_tracing();

    let addr = start_fake_validators().await?;
    let dir = tempdir()?;
    write(dir.path(), "build/css/style.css", "body { colour: red; }")?;
    write(dir.path(), "build/css/print.css", "body { color: black; }")?;

    let cfg = config(addr)?;
    let flags = pipedag::build_flags(Some("css21".into()), Vec::new());
    let ws = Arc::new(Workspace::from_config(&cfg, dir.path(), flags));
    let graph = Arc::new(build_task_graph(&cfg, ws)?);

    with_timeout(graph.run("valid-css")).await?.into_result()?;

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("build/w3-css.json"))?)?;
    // Several inputs: one answer per root-relative path.
    let style = &report["build/css/style.css"]["cssvalidation"];
    let print = &report["build/css/print.css"]["cssvalidation"];
    assert_eq!(style["csslevel"], "css21");
    assert_eq!(style["result"]["errorcount"], 1);
    assert_eq!(print["result"]["errorcount"], 0);
    Ok(())
}

#[tokio::test]
async fn nothing_to_validate_is_a_noop() -> TestResult {
    init_tracing();

    let addr = start_fake_validators().await?;
    let dir = tempdir()?;

    let cfg = config(addr)?;
    let ws = Arc::new(Workspace::from_config(&cfg, dir.path(), Flags::new()));
    let graph = Arc::new(build_task_graph(&cfg, ws)?);

    with_timeout(graph.run("valid-css")).await?.into_result()?;
    assert!(!dir.path().join("build/w3-css.json").exists());
    Ok(())
}
