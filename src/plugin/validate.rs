// src/plugin/validate.rs

//! W3C markup and stylesheet validation.
//!
//! Both validators send each input to a web service, collect the JSON
//! answers into a report under `dest`, and print the report to stdout.
//! Reported errors only fail the step when `fail_on_error` is set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{PluginError, PluginFuture, PluginInput, PluginOutput, TransformPlugin};

pub const DEFAULT_HTML_ENDPOINT: &str = "https://validator.w3.org/nu/?out=json";
pub const DEFAULT_CSS_ENDPOINT: &str = "https://jigsaw.w3.org/css-validator/validator";
pub const DEFAULT_CSS_PROFILE: &str = "css3";
pub const DEFAULT_CSS_SLEEP_MS: u64 = 1500;

/// Posts HTML documents to the Nu HTML checker.
///
/// Options: `endpoint`, `report` (default `w3-html.json`), `fail_on_error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlValidatorPlugin;

/// Sends stylesheets to the W3C CSS validator.
///
/// Options: `endpoint`, `profile` (default `css3`), `sleep_ms` between files
/// (default 1500), `report` (default `w3-css.json`), `fail_on_error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssValidatorPlugin;

fn http_client() -> Result<Client, PluginError> {
    Ok(Client::builder()
        .user_agent(concat!("pipedag/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

impl TransformPlugin for HtmlValidatorPlugin {
    fn name(&self) -> &'static str {
        "validate-html"
    }

    fn run(&self, input: PluginInput) -> PluginFuture<'_> {
        Box::pin(async move {
            let endpoint = input
                .str_setting("endpoint")?
                .unwrap_or_else(|| DEFAULT_HTML_ENDPOINT.to_string());
            let client = http_client()?;

            let mut results = Vec::with_capacity(input.inputs.len());
            for path in &input.inputs {
                let body = input.fs.read(path)?;
                debug!(task = %input.task, path = %input.display_path(path), %endpoint, "validating markup");

                let answer: Value = client
                    .post(&endpoint)
                    .header(CONTENT_TYPE, "text/html; charset=utf-8")
                    .body(body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;

                let errors = count_html_errors(&answer);
                results.push((path.clone(), answer, errors));
            }

            finish(&input, "w3-html.json", results)
        })
    }
}

impl TransformPlugin for CssValidatorPlugin {
    fn name(&self) -> &'static str {
        "validate-css"
    }

    fn run(&self, input: PluginInput) -> PluginFuture<'_> {
        Box::pin(async move {
            let endpoint = input
                .str_setting("endpoint")?
                .unwrap_or_else(|| DEFAULT_CSS_ENDPOINT.to_string());
            let profile = input
                .str_setting("profile")?
                .unwrap_or_else(|| DEFAULT_CSS_PROFILE.to_string());
            let sleep = Duration::from_millis(input.u64_setting("sleep_ms")?.unwrap_or(DEFAULT_CSS_SLEEP_MS));
            let client = http_client()?;

            let mut results = Vec::with_capacity(input.inputs.len());
            for (i, path) in input.inputs.iter().enumerate() {
                // The public validator throttles clients that do not pause.
                if i > 0 && !sleep.is_zero() {
                    tokio::time::sleep(sleep).await;
                }

                let text = input.fs.read_to_string(path)?;
                debug!(task = %input.task, path = %input.display_path(path), %profile, "validating stylesheet");

                let answer: Value = client
                    .get(&endpoint)
                    .query(&[
                        ("text", text.as_str()),
                        ("profile", profile.as_str()),
                        ("output", "json"),
                    ])
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;

                let errors = count_css_errors(&answer);
                results.push((path.clone(), answer, errors));
            }

            finish(&input, "w3-css.json", results)
        })
    }
}

/// Errors in a Nu checker answer: messages of type `error`.
fn count_html_errors(answer: &Value) -> usize {
    answer["messages"]
        .as_array()
        .map(|msgs| {
            msgs.iter()
                .filter(|m| m["type"].as_str() == Some("error"))
                .count()
        })
        .unwrap_or(0)
}

/// Errors in a CSS validator answer: `result.errorcount`, or the length of
/// the `errors` list when the count is missing.
fn count_css_errors(answer: &Value) -> usize {
    let validation = &answer["cssvalidation"];
    validation["result"]["errorcount"]
        .as_u64()
        .map(|n| n as usize)
        .or_else(|| validation["errors"].as_array().map(Vec::len))
        .unwrap_or(0)
}

/// Write and print the report, then apply `fail_on_error`.
fn finish(
    input: &PluginInput,
    default_report: &str,
    results: Vec<(PathBuf, Value, usize)>,
) -> Result<PluginOutput, PluginError> {
    if results.is_empty() {
        warn!(task = %input.task, "no files to validate");
        return Ok(PluginOutput::default());
    }

    let fail_on_error = input.bool_setting("fail_on_error")?.unwrap_or(false);
    let report_name = input
        .str_setting("report")?
        .unwrap_or_else(|| default_report.to_string());
    let report_path = input
        .dest
        .as_deref()
        .unwrap_or(input.root.as_path())
        .join(report_name);

    let first_failure = results
        .iter()
        .find(|(_, _, errors)| *errors > 0)
        .map(|(path, _, errors)| (input.display_path(path), *errors));
    let total_errors: usize = results.iter().map(|(_, _, e)| e).sum();

    let report = build_report(input, results);
    let pretty = serde_json::to_string_pretty(&report)?;
    input.fs.write(&report_path, pretty.as_bytes())?;
    println!("{pretty}");

    info!(
        task = %input.task,
        report = %input.display_path(&report_path),
        errors = total_errors,
        "validation finished"
    );

    if let Some((path, errors)) = first_failure {
        if fail_on_error {
            return Err(PluginError::ValidationFailed { path, errors });
        }
        warn!(task = %input.task, errors = total_errors, "validator reported errors");
    }

    Ok(PluginOutput::written(vec![report_path]))
}

/// One input: the answer as is. Several: an object keyed by relative path.
fn build_report(input: &PluginInput, mut results: Vec<(PathBuf, Value, usize)>) -> Value {
    if results.len() == 1 {
        return results.remove(0).1;
    }

    let mut map = Map::new();
    for (path, answer, _) in results {
        map.insert(input.display_path(Path::new(&path)), answer);
    }
    Value::Object(map)
}
