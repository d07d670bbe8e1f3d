//! Review operations outside the metadata and PDF pipelines
//!
//! Each module exposes a `run` function driven by the CLI. Operations that
//! change records follow the same discipline as `prep`/`dedupe`: check the
//! process gate, load the records, mutate, save once, commit once.

pub mod data;
pub mod distribute;
pub mod init;
pub mod load;
pub mod paper;
pub mod prescreen;
pub mod screen;
pub mod search;
pub mod status;
pub mod sync;
pub mod trace;
pub mod validate;

use std::collections::HashSet;
use std::path::Path;

/// IDs selected by a `--split` argument
///
/// The argument is either a file (one ID per line or comma-separated) or
/// the comma-separated IDs themselves.
pub fn parse_split(root: &Path, split: &str) -> colrev_common::Result<HashSet<String>> {
    let candidate = root.join(split);
    let text = if candidate.is_file() {
        std::fs::read_to_string(&candidate)?
    } else {
        split.to_string()
    };
    Ok(text
        .split([',', '\n'])
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect())
}

/// Split `ids` into `n` lists whose sizes differ by at most one
pub fn balanced_splits(ids: &[String], n: usize) -> Vec<Vec<String>> {
    let n = n.max(1);
    let mut splits = vec![Vec::new(); n];
    for (i, id) in ids.iter().enumerate() {
        splits[i % n].push(id.clone());
    }
    splits
}

/// A yes/no decision typed into an exchange table (`None` while undecided)
pub fn parse_decision(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "y" | "in" | "include" | "1" | "true" | "x" => Some(true),
        "no" | "n" | "out" | "exclude" | "0" | "false" => Some(false),
        _ => None,
    }
}

/// Resolve a user-supplied path against the repository root
pub fn resolve_path(root: &Path, path: &Path) -> std::path::PathBuf {
    if path.is_absolute() || path.exists() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
