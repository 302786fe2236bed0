// src/watch/patterns.rs

use std::fmt;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::fs::FileSystem;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// A compiled set of glob patterns, relative to the project root.
///
/// `*` and `?` never match `/`; use `**` to cross directories. Matching is
/// done on `/`-separated relative paths such as `"sass/main.scss"`.
#[derive(Clone)]
pub struct GlobMatcher {
    patterns: Vec<String>,
    set: GlobSet,
    walks: Vec<Walk>,
}

/// Where a pattern can match, so expansion does not have to scan the whole
/// project.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Walk {
    /// No glob metacharacters: a single candidate path.
    Literal(PathBuf),
    /// Scan below `base`, at most `depth` levels (`None` for `**`).
    Dir { base: PathBuf, depth: Option<usize> },
}

impl fmt::Debug for GlobMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobMatcher")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl GlobMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut walks = Vec::with_capacity(patterns.len());
        let mut kept = Vec::with_capacity(patterns.len());

        for pat in patterns {
            let pat = normalize_pattern(pat.as_ref());
            let glob = GlobBuilder::new(&pat)
                .literal_separator(true)
                .build()
                .with_context(|| format!("invalid glob pattern: {pat}"))?;
            builder.add(glob);
            walks.push(walk_for(&pat));
            kept.push(pat);
        }

        let set = builder
            .build()
            .with_context(|| format!("building globset for {:?}", kept))?;

        Ok(Self {
            patterns: kept,
            set,
            walks,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a root-relative, `/`-separated path matches any pattern.
    pub fn is_match(&self, rel_path: &str) -> bool {
        self.set.is_match(rel_path)
    }
}

fn normalize_pattern(pat: &str) -> String {
    let pat = pat.trim().replace('\\', "/");
    pat.strip_prefix("./").map(str::to_string).unwrap_or(pat)
}

fn walk_for(pattern: &str) -> Walk {
    let parts: Vec<&str> = pattern.split('/').filter(|p| !p.is_empty()).collect();
    let literal_len = parts
        .iter()
        .take_while(|p| !p.contains(GLOB_META))
        .count();

    let base: PathBuf = parts[..literal_len].iter().collect();
    if literal_len == parts.len() {
        return Walk::Literal(base);
    }

    let rest = &parts[literal_len..];
    let depth = if rest.iter().any(|p| p.contains("**")) {
        None
    } else {
        Some(rest.len())
    };
    Walk::Dir { base, depth }
}

/// Collect all files under `root` matched by `matcher`, sorted and deduplicated.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    matcher: &GlobMatcher,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for walk in &matcher.walks {
        match walk {
            Walk::Literal(rel) => {
                let path = join_rel(root, rel);
                if fs.is_file(&path) {
                    files.push(path);
                }
            }
            Walk::Dir { base, depth } => {
                let start = join_rel(root, base);
                if !fs.is_dir(&start) {
                    continue;
                }
                let mut stack = vec![(start, 1usize)];
                while let Some((dir, level)) = stack.pop() {
                    for path in fs.read_dir(&dir)? {
                        if fs.is_dir(&path) {
                            if depth.is_none_or(|max| level < max) {
                                stack.push((path, level + 1));
                            }
                        } else if fs.is_file(&path) {
                            if let Some(rel) = rel_str(root, &path) {
                                if matcher.is_match(&rel) {
                                    files.push(path);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn join_rel(root: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}

fn rel_str(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}
