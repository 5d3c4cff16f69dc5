//! Error types for a CSS-module build.
//!
//! Every failure during resolution or output generation aborts the build;
//! nothing is cached for a file that failed.

use std::path::PathBuf;

/// Errors raised while compiling a set of style sheets.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A `composes` chain leads back to a file that is still being resolved.
    #[error("cyclic composition: {}", .cycle.join(" -> "))]
    CyclicComposition {
        /// Import paths along the cycle, first and last entries are equal.
        cycle: Vec<String>,
    },

    /// A `composes ... from` target is not part of the build.
    #[error("{importer}: unable to resolve import \"{target}\"")]
    UnresolvedImport {
        /// Import path of the file containing the composition.
        importer: String,
        /// The normalized import path that could not be found.
        target: String,
    },

    /// A composed class name is not declared by the file it is composed from.
    #[error("{file}: class \"{class_name}\" is not declared in {target}")]
    UnknownComposedClass {
        /// Import path of the composing file.
        file: String,
        /// The missing class name.
        class_name: String,
        /// Import path of the file that should declare it.
        target: String,
    },

    /// A preprocessor rejected the file.
    #[error("{file}: preprocessing failed: {message}")]
    Preprocess { file: String, message: String },

    /// The selector scoping engine rejected the file.
    #[error("{file}: {message}")]
    Scoping { file: String, message: String },

    /// The script emitter rejected the generated companion module.
    #[error("unable to compile generated script for {file}: {message}")]
    ScriptCompile { file: String, message: String },

    /// An ignore or passthrough pattern is not a valid regular expression.
    #[error("invalid path pattern \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Reading an included file or the options file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The `cssModules` options block could not be deserialized.
    #[error("invalid options in {path}: {source}")]
    Options {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
