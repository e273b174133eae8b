//! Scratch files for a single processing job.
//!
//! Every job gets a fresh UUID, and both of its files embed that id, so
//! concurrent jobs sharing one scratch directory never touch each other's files.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Name used when the upload carries no usable filename.
const FALLBACK_FILE_NAME: &str = "video";

/// Longest filename fragment kept from the upload.
const MAX_FILE_NAME_LEN: usize = 100;

const INPUT_PREFIX: &str = "in_";
const INPUT_EXTENSION: &str = ".bin";
const OUTPUT_PREFIX: &str = "out_";
const OUTPUT_EXTENSION: &str = ".mp4";

/// Input and output paths of one job.
#[derive(Debug, Clone)]
pub struct ScratchJob {
    id: String,
    input: PathBuf,
    output: PathBuf,
}

impl ScratchJob {
    /// Allocate paths for a new job inside `dir`. Nothing is written yet.
    pub fn new(dir: impl AsRef<Path>, original_file_name: Option<&str>) -> Self {
        let dir = dir.as_ref();
        let id = Uuid::new_v4().simple().to_string();
        let name = sanitize_file_name(original_file_name.unwrap_or_default());

        Self {
            input: dir.join(format!("{}{}_{}{}", INPUT_PREFIX, id, name, INPUT_EXTENSION)),
            output: dir.join(format!("{}{}{}", OUTPUT_PREFIX, id, OUTPUT_EXTENSION)),
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Generated name of the output file, used in the published URL.
    pub fn output_file_name(&self) -> String {
        format!("{}{}{}", OUTPUT_PREFIX, self.id, OUTPUT_EXTENSION)
    }

    /// Both scratch paths, input first.
    pub fn paths(&self) -> Vec<PathBuf> {
        vec![self.input.clone(), self.output.clone()]
    }

    /// Delete the input file now.
    pub async fn remove_input(&self) {
        remove_file_if_exists(&self.input).await;
    }

    /// Delete the output file now.
    pub async fn remove_output(&self) {
        remove_file_if_exists(&self.output).await;
    }
}

/// Whether `name` has the shape of a generated output file name.
///
/// Only such names are served as published artifacts.
pub fn is_artifact_name(name: &str) -> bool {
    let Some(id) = name
        .strip_prefix(OUTPUT_PREFIX)
        .and_then(|rest| rest.strip_suffix(OUTPUT_EXTENSION))
    else {
        return false;
    };
    is_job_id(id)
}

/// Whether `name` has the shape of a job's uploaded input file.
pub fn is_input_name(name: &str) -> bool {
    name.strip_prefix(INPUT_PREFIX)
        .and_then(|rest| rest.strip_suffix(INPUT_EXTENSION))
        .and_then(|rest| rest.split_once('_'))
        .is_some_and(|(id, _)| is_job_id(id))
}

fn is_job_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Which scratch files a sweep may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepScope {
    /// Inputs and outputs. Only safe while no job is running.
    All,
    /// Published outputs only.
    Outputs,
}

/// Remove scratch files in `dir` last modified at least `max_age` ago.
///
/// Files not named like job files are left alone. Returns the number of
/// files removed.
pub async fn sweep_stale(dir: &Path, max_age: Duration, scope: SweepScope) -> std::io::Result<usize> {
    let mut entries = fs::read_dir(dir).await?;
    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let in_scope = is_artifact_name(name) || (scope == SweepScope::All && is_input_name(name));
        if !in_scope {
            continue;
        }

        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!(file = name, "Skipping scratch file during sweep: {}", e);
                continue;
            }
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age >= max_age && remove_file_if_exists(&entry.path()).await {
            removed += 1;
        }
    }

    Ok(removed)
}

/// Reduce an uploaded filename to a safe path fragment.
///
/// Directory components are dropped and anything outside `[A-Za-z0-9._-]`
/// becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

/// Remove a file, treating "already gone" as success.
///
/// Returns `false` only when the file existed and could not be removed.
pub async fn remove_file_if_exists(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed scratch file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), "Failed to remove scratch file: {}", e);
            false
        }
    }
}

/// Blocking variant for contexts without an async runtime.
pub fn remove_file_if_exists_blocking(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), "Failed to remove scratch file: {}", e);
            false
        }
    }
}
