//! Input file discovery
//!
//! Applies the ignore patterns to the files handed over by the host and adds
//! style files found under the explicitly included folders.

use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::CompileError;
use crate::options::{PathPatterns, PluginOptions};
use crate::source_file::InputFile;

/// Architecture assumed for included files when the host gave no files.
pub const DEFAULT_ARCH: &str = "web.browser";

/// Drop files whose package path matches an ignore pattern.
pub fn remove_ignored(files: Vec<InputFile>, patterns: &PathPatterns) -> Vec<InputFile> {
    files
        .into_iter()
        .filter(|file| {
            let ignored = patterns.is_ignored(&file.path_in_package);
            if ignored {
                tracing::debug!("[CssModules] Ignoring {}", file.path_in_package);
            }
            !ignored
        })
        .collect()
}

/// `true` when the file name ends with one of the handled extensions.
pub fn has_handled_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|ext| name.ends_with(&format!(".{}", ext.trim_start_matches('.'))))
}

/// Recursively list handled style files under each folder, sorted per folder.
pub fn find_included_files(project_root: &Path, folders: &[String], extensions: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for folder in folders {
        let dir = project_root.join(folder);
        if !dir.exists() {
            tracing::warn!("[CssModules] Included folder {} does not exist", dir.display());
            continue;
        }

        let mut found: Vec<PathBuf> = WalkDir::new(&dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| has_handled_extension(path, extensions))
            .collect();
        found.sort();
        files.extend(found);
    }

    files
}

/// Package path of an included file: relative to the project root when
/// possible, forward slashes.
fn package_path(project_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(project_root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

/// Read and fingerprint the included files in parallel.
pub fn read_included_files(
    project_root: &Path,
    options: &PluginOptions,
    arch: &str,
) -> Result<Vec<InputFile>, CompileError> {
    let paths = find_included_files(project_root, &options.explicit_includes, &options.extensions);

    paths
        .par_iter()
        .map(|path| {
            let contents = fs::read(path).map_err(|source| CompileError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(InputFile::new(&package_path(project_root, path), contents, arch))
        })
        .collect()
}

/// The files of one build: host files minus ignored ones, plus included
/// files not already handed over by the host.
pub fn collect_input_files(
    project_root: &Path,
    files: Vec<InputFile>,
    options: &PluginOptions,
    patterns: &PathPatterns,
) -> Result<Vec<InputFile>, CompileError> {
    let arch = files
        .first()
        .map(|file| file.arch.clone())
        .unwrap_or_else(|| DEFAULT_ARCH.to_string());
    let mut files = remove_ignored(files, patterns);

    if options.explicit_includes.is_empty() {
        return Ok(files);
    }

    let mut seen: HashSet<String> = files.iter().map(|f| f.path_in_package.clone()).collect();
    for included in read_included_files(project_root, options, &arch)? {
        if seen.insert(included.path_in_package.clone()) {
            files.push(included);
        }
    }
    Ok(files)
}
