//! Filesystem helpers for shard management
//!
//! Directory reset, recursive shard discovery, and CSV joining. These back
//! the reduce step but are usable on their own, e.g. to re-join shards
//! left behind by an aborted run.

use crate::error::{Error, Result};
use crate::table::Table;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Remove `path` (file or directory, if present) and recreate it as an
/// empty directory.
pub fn clear_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if path.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Recursively collect all regular files under `path`.
///
/// Enumeration order is whatever the filesystem yields; callers needing a
/// deterministic order must sort.
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Concatenate CSV files into a single output file.
///
/// A single input degenerates to a plain copy; an empty input list is an
/// error. Columns are aligned by name (union, empty-fill) via
/// [`Table::concat`].
pub fn join_csv(files: &[PathBuf], output: &Path) -> Result<PathBuf> {
    if files.is_empty() {
        return Err(Error::Reduce("no input files to join".to_string()));
    }
    if files.len() == 1 {
        std::fs::copy(&files[0], output)?;
        return Ok(output.to_path_buf());
    }

    let mut tables = Vec::with_capacity(files.len());
    for file in files {
        tables.push(Table::from_csv_path(file)?);
    }
    Table::concat(tables).write_csv_path(output)?;
    Ok(output.to_path_buf())
}

/// Join CSV files into multiple outputs, greedily bucketing inputs so each
/// bucket holds at most `limit_bytes` of input data.
///
/// Outputs are named `<prefix>_<i>.csv` in bucket order. A single file
/// larger than the limit gets a bucket of its own. When `delete_inputs` is
/// set, the input files are removed after all outputs are written.
pub fn join_csv_with_limit(
    files: &[PathBuf],
    output_prefix: &Path,
    limit_bytes: u64,
    delete_inputs: bool,
) -> Result<Vec<PathBuf>> {
    let mut groups: Vec<Vec<PathBuf>> = Vec::new();
    let mut current: Vec<PathBuf> = Vec::new();
    let mut current_size: u64 = 0;

    for file in files {
        let size = std::fs::metadata(file)?.len();
        if size > limit_bytes {
            groups.push(vec![file.clone()]);
        } else if current_size + size > limit_bytes {
            groups.push(std::mem::take(&mut current));
            current.push(file.clone());
            current_size = size;
        } else {
            current.push(file.clone());
            current_size += size;
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let mut outputs = Vec::with_capacity(groups.len());
    for (i, group) in groups.iter().enumerate() {
        let output = PathBuf::from(format!("{}_{}.csv", output_prefix.display(), i));
        join_csv(group, &output)?;
        outputs.push(output);
    }

    if delete_inputs {
        for file in files {
            std::fs::remove_file(file)?;
        }
    }

    Ok(outputs)
}
