//! # CSS Modules Compiler
//!
//! Incremental, multi-file CSS-modules compilation for a host build system.
//!
//! ## Pipeline
//!
//! 1. **Discovery**: host files minus ignored paths, plus explicitly included
//!    folders (`discovery`).
//! 2. **Materialization**: files are prepared lazily, on first access, with
//!    the global variables header prepended (`materializer`).
//! 3. **Resolution**: each root file is preprocessed, scoped and merged with
//!    everything it `composes` from, depth first (`resolver`, `scoper`).
//! 4. **Output**: the resolved file becomes an eager stylesheet, a companion
//!    script or both, depending on laziness and target (`output`, `emitter`).
//! 5. **Caching**: results are cached by content fingerprint and reused until
//!    the file, one of its imports or the options change (`cache`).
//!
//! ## Invariants
//!
//! - A file's identity is its normalized absolute import path.
//! - A token value is the local generated name followed by every composed
//!   name, in composition order, without duplicates.
//! - `referenced_import_paths` lists direct imports before indirect ones and
//!   never the file itself.
//! - Any composition cycle fails the build; nothing is cached for a failed file.

mod cache;
mod compiler;
mod discovery;
mod emitter;
mod error;
mod import_path;
mod materializer;
mod options;
mod output;
mod preprocess;
mod resolver;
mod scoper;
mod source_file;


pub use cache::{CacheEntry, ContentCache, ReferencedImport, DEFAULT_CACHE_SIZE};
pub use compiler::{BuildOutput, BuildStats, CssModulesCompiler, ProfilingResults};
pub use discovery::{collect_input_files, find_included_files, remove_ignored};
pub use emitter::{declared_imports, OxcScriptEmitter, ScriptEmitter};
pub use error::CompileError;
pub use import_path::{absolute_import_path, normalize, resolve_specifier};
pub use materializer::{FileLookup, Materializer};
pub use options::{ClassNamingConvention, PathPatterns, PluginOptions};
pub use output::{
    camel_case, exported_tokens, get_output_path, CompileResult, FileOutput, OutputShapeDecider,
    ScriptArtifact, StylesheetArtifact,
};
pub use preprocess::{is_root, PreprocessInput, Preprocessor};
pub use resolver::ImportGraphResolver;
pub use scoper::{
    generate_scoped_name, ClassNameScoper, ComposeSource, Composition, ScopeInput,
    ScopedStylesheet, SelectorScoper,
};
pub use source_file::{compute_hash, InputFile, SourceFile, SourceMap};
