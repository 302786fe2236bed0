// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling binding globs and expanding step `src` globs.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Debouncing and coalescing changes per binding.
//! - (Optionally) content hashing to skip changes that did not change
//!   anything.
//!
//! It does **not** know about the task graph; a [`ChangeHandler`] turns a
//! batch of changes into a run or a browser reload.

pub mod binding;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod watcher;
mod worker;

pub use binding::{ChangeFuture, ChangeHandler, WatchBinding};
pub use hash::{compute_file_hash, compute_hash_for_paths};
pub use patterns::{GlobMatcher, collect_matching_files};
pub use watcher::{DEFAULT_DEBOUNCE, FileWatcher, WatcherHandle};
