//! Preprocessor boundary (SCSS and friends).
//!
//! Preprocessors are registered by the host. A file is handed to every
//! preprocessor that accepts it, in registration order, before scoping.

use crate::materializer::FileLookup;
use crate::source_file::SourceFile;

/// Snapshot of the file a preprocessor works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessInput {
    pub import_path: String,
    pub path_in_package: String,
    pub contents: String,
}

impl PreprocessInput {
    pub fn from_file(file: &SourceFile) -> Self {
        Self {
            import_path: file.import_path.clone(),
            path_in_package: file.path_in_package.clone(),
            contents: file.contents.clone(),
        }
    }
}

pub trait Preprocessor {
    fn should_process(&self, file: &PreprocessInput) -> bool;

    /// `false` for partials that are only ever included by other files.
    fn is_root(&self, file: &PreprocessInput) -> bool;

    /// Produce the new content of `file`. Other files of the build are
    /// reachable through `files`.
    fn process(&self, file: &PreprocessInput, files: &mut dyn FileLookup) -> Result<String, String>;
}

/// A file handled by no preprocessor is a root; otherwise the first
/// preprocessor that accepts it decides.
pub fn is_root(preprocessors: &[Box<dyn Preprocessor>], file: &PreprocessInput) -> bool {
    let mut root = None;
    for preprocessor in preprocessors {
        if preprocessor.should_process(file) {
            if preprocessor.is_root(file) {
                return true;
            }
            root = Some(false);
        }
    }
    root.unwrap_or(true)
}
