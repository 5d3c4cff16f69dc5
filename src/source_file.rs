//! Source files
//!
//! Host input files, their fingerprints, and the per-build state of each
//! style sheet.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::import_path::absolute_import_path;

// ═══════════════════════════════════════════════════════════════════════════════
// HOST INPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// A file handed over by the host build system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Project-relative path, forward slashes.
    pub path_in_package: String,
    pub contents: Vec<u8>,
    /// Content fingerprint, used as the cache key.
    pub source_hash: String,
    /// Target architecture, e.g. `web.browser` or `os`.
    pub arch: String,
}

impl InputFile {
    pub fn new(path_in_package: &str, contents: impl Into<Vec<u8>>, arch: &str) -> Self {
        let contents = contents.into();
        Self {
            path_in_package: path_in_package.replace('\\', "/"),
            source_hash: compute_hash(&contents),
            contents,
            arch: arch.to_string(),
        }
    }
}

pub fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE MAP
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE FILE
// ═══════════════════════════════════════════════════════════════════════════════

/// A style sheet taking part in the current build.
///
/// Created unprepared from an [`InputFile`]; the materializer loads its
/// content on first access and the resolver fills in imports and tokens.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Normalized absolute import path, the file's identity.
    pub import_path: String,
    pub path_in_package: String,
    pub arch: String,
    pub source_hash: String,
    raw_bytes: Vec<u8>,
    /// Content after preparation (global header included), before preprocessing.
    pub raw_contents: String,
    /// Current content: prepared, then preprocessed, then scoped.
    pub contents: String,
    pub is_prepared: bool,
    pub is_resolved: bool,
    /// Direct `composes ... from` specifiers, as written, in first-seen order.
    pub imports: Vec<String>,
    /// Every file reached through composition, direct imports first.
    pub referenced_import_paths: Vec<String>,
    /// Local class name -> space separated generated names.
    pub tokens: BTreeMap<String, String>,
    pub source_map: Option<SourceMap>,
}

impl SourceFile {
    pub fn from_input(project_root: &str, input: InputFile) -> Self {
        Self {
            import_path: absolute_import_path(project_root, &input.path_in_package),
            path_in_package: input.path_in_package,
            arch: input.arch,
            source_hash: input.source_hash,
            raw_bytes: input.contents,
            raw_contents: String::new(),
            contents: String::new(),
            is_prepared: false,
            is_resolved: false,
            imports: Vec::new(),
            referenced_import_paths: Vec::new(),
            tokens: BTreeMap::new(),
            source_map: None,
        }
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    /// Files under an `imports` directory are loaded lazily by the client.
    pub fn is_lazy(&self) -> bool {
        self.path_in_package.split('/').any(|segment| segment == "imports")
    }

    pub fn targets_browser(&self) -> bool {
        self.arch.starts_with("web")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_file_fingerprint() {
        let a = InputFile::new("client/a.css", ".a {}", "web.browser");
        let b = InputFile::new("client/b.css", ".a {}", "web.browser");
        let c = InputFile::new("client/a.css", ".b {}", "web.browser");
        assert_eq!(a.source_hash, b.source_hash);
        assert_ne!(a.source_hash, c.source_hash);
        assert_eq!(a.source_hash.len(), 64);
    }

    #[test]
    fn test_lazy_and_browser_flags() {
        let lazy = SourceFile::from_input(
            "/app",
            InputFile::new("imports/ui/button.css", "", "web.browser"),
        );
        assert!(lazy.is_lazy());
        assert!(lazy.targets_browser());
        assert_eq!(lazy.import_path, "/app/imports/ui/button.css");

        let eager = SourceFile::from_input(
            "/app",
            InputFile::new("client/imports-list.css", "", "os.linux.x86_64"),
        );
        assert!(!eager.is_lazy());
        assert!(!eager.targets_browser());
    }
}
