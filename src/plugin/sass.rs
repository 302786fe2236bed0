// src/plugin/sass.rs

//! Sass/SCSS compilation with `grass`.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{debug, info};

use super::{PluginError, PluginFuture, PluginInput, PluginOutput, TransformPlugin};
use crate::types::OutputStyle;

/// Compiles stylesheets. Partials (`_*.scss`) are only reachable through
/// `@use`/`@import` and are never compiled on their own.
///
/// Options:
/// - `output_style`: `expanded` (default) or `compressed`;
/// - `concat`: join every compiled sheet into one file of this name;
/// - `sourcemap`: write `<out>.map` next to each output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SassPlugin;

struct Compiled {
    path: PathBuf,
    source: String,
    css: String,
}

impl TransformPlugin for SassPlugin {
    fn name(&self) -> &'static str {
        "sass"
    }

    fn run(&self, input: PluginInput) -> PluginFuture<'_> {
        Box::pin(async move {
            let style = match input.str_setting("output_style")? {
                Some(s) => s
                    .parse::<OutputStyle>()
                    .map_err(|msg| PluginError::invalid_option("output_style", msg))?,
                None => OutputStyle::default(),
            };
            let concat = input.str_setting("concat")?;
            let sourcemap = input.bool_setting("sourcemap")?.unwrap_or(false);
            let dest = input.require_dest()?.to_path_buf();

            let mut compiled = Vec::new();
            for path in input.inputs.iter().filter(|p| !is_partial(p)) {
                let source = input.fs.read_to_string(path)?;
                let mut options = grass::Options::default().style(style.into());
                if let Some(parent) = path.parent() {
                    options = options.load_path(parent);
                }

                let css = grass::from_string(source.clone(), &options)?;
                debug!(task = %input.task, path = %input.display_path(path), "compiled stylesheet");
                compiled.push(Compiled {
                    path: path.clone(),
                    source,
                    css,
                });
            }

            let mut written = Vec::new();
            match concat {
                Some(name) if !compiled.is_empty() => {
                    let css = compiled
                        .iter()
                        .map(|c| c.css.as_str())
                        .collect::<Vec<_>>()
                        .join("\n");
                    write_sheet(&input, &dest.join(name), css, &compiled, sourcemap, &mut written)?;
                }
                Some(_) => {}
                None => {
                    for c in &compiled {
                        let stem = c
                            .path
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        let out = dest.join(format!("{stem}.css"));
                        write_sheet(
                            &input,
                            &out,
                            c.css.clone(),
                            std::slice::from_ref(c),
                            sourcemap,
                            &mut written,
                        )?;
                    }
                }
            }

            info!(task = %input.task, files = written.len(), "wrote stylesheets");
            Ok(PluginOutput::written(written))
        })
    }
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

fn write_sheet(
    input: &PluginInput,
    out: &Path,
    mut css: String,
    sources: &[Compiled],
    sourcemap: bool,
    written: &mut Vec<PathBuf>,
) -> Result<(), PluginError> {
    let file_name = out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !sourcemap {
        input.fs.write(out, css.as_bytes())?;
        written.push(out.to_path_buf());
        return Ok(());
    }

    let map_path = out.with_file_name(format!("{file_name}.map"));
    // grass does not produce mappings; the map lists sources and contents.
    let map = json!({
        "version": 3,
        "file": file_name,
        "sourceRoot": "/",
        "sources": sources.iter().map(|c| input.display_path(&c.path)).collect::<Vec<_>>(),
        "sourcesContent": sources.iter().map(|c| c.source.as_str()).collect::<Vec<_>>(),
        "names": [],
        "mappings": "",
    });

    if !css.ends_with('\n') {
        css.push('\n');
    }
    css.push_str(&format!("/*# sourceMappingURL={file_name}.map */\n"));

    input.fs.write(out, css.as_bytes())?;
    written.push(out.to_path_buf());
    input
        .fs
        .write(&map_path, serde_json::to_string(&map)?.as_bytes())?;
    written.push(map_path);
    Ok(())
}
