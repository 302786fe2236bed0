use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output style of compiled stylesheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compressed,
}

impl FromStr for OutputStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expanded" | "nested" => Ok(OutputStyle::Expanded),
            "compressed" => Ok(OutputStyle::Compressed),
            other => Err(format!(
                "invalid output_style: {other} (expected \"expanded\" or \"compressed\")"
            )),
        }
    }
}

impl From<OutputStyle> for grass::OutputStyle {
    fn from(style: OutputStyle) -> Self {
        match style {
            OutputStyle::Expanded => grass::OutputStyle::Expanded,
            OutputStyle::Compressed => grass::OutputStyle::Compressed,
        }
    }
}

/// Signal pushed to connected browser sessions by the dev server.
///
/// Serialized as `{"type":"reload"}` or
/// `{"type":"inject","paths":["/build/css/style.css"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadSignal {
    /// Full page reload.
    Reload,
    /// Swap the listed stylesheets without reloading the page.
    Inject { paths: Vec<String> },
}

impl ReloadSignal {
    /// Pick the signal for a set of changed URL paths.
    ///
    /// Stylesheets (and their source maps) can be injected; anything else, or
    /// an empty change set, needs a full reload. Source maps are not listed
    /// in the inject payload.
    pub fn for_changes<S: AsRef<str>>(paths: &[S]) -> Self {
        if paths.is_empty() {
            return ReloadSignal::Reload;
        }

        let all_styles = paths.iter().all(|p| {
            let p = p.as_ref();
            p.ends_with(".css") || p.ends_with(".css.map")
        });

        if !all_styles {
            return ReloadSignal::Reload;
        }

        ReloadSignal::Inject {
            paths: paths
                .iter()
                .map(|p| p.as_ref())
                .filter(|p| p.ends_with(".css"))
                .map(str::to_string)
                .collect(),
        }
    }
}

impl fmt::Display for ReloadSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}
