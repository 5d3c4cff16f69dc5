//! Compilation Orchestrator
//!
//! One `process_files_for_target` call is one build for one target
//! architecture. The compiler owns the cache across builds; everything else
//! (file map, resolver state) lives only for the duration of a build.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::cache::{CacheEntry, ContentCache, ReferencedImport};
use crate::discovery::collect_input_files;
use crate::emitter::{OxcScriptEmitter, ScriptEmitter};
use crate::error::CompileError;
use crate::materializer::Materializer;
use crate::options::{PathPatterns, PluginOptions};
use crate::output::{FileOutput, OutputShapeDecider};
use crate::preprocess::{self, PreprocessInput, Preprocessor};
use crate::resolver::ImportGraphResolver;
use crate::scoper::{ClassNameScoper, SelectorScoper};
use crate::source_file::{compute_hash, InputFile, SourceFile};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    /// Root files compiled in this build.
    pub compiled: usize,
    /// Root files served from the cache.
    pub cached: usize,
    /// Whether the cache was reset because the options changed.
    pub cache_reset: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    pub files: Vec<FileOutput>,
    pub stats: BuildStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfilingResults {
    /// Wall time of the last build.
    pub process_files_for_target: Duration,
    /// Time spent resolving, accumulated over the compiler's lifetime.
    pub transpile_css_modules: Duration,
}

pub struct CssModulesCompiler {
    project_root: PathBuf,
    options: PluginOptions,
    options_fingerprint: String,
    patterns: PathPatterns,
    /// `None` uses a `ClassNameScoper` built from the options.
    scoper: Option<Box<dyn SelectorScoper>>,
    emitter: Box<dyn ScriptEmitter>,
    preprocessors: Vec<Box<dyn Preprocessor>>,
    cache: ContentCache,
    profiling: ProfilingResults,
}

impl CssModulesCompiler {
    pub fn new(project_root: impl Into<PathBuf>, options: PluginOptions) -> Result<Self, CompileError> {
        let patterns = options.compile_patterns()?;
        Ok(Self {
            project_root: project_root.into(),
            options_fingerprint: options.fingerprint(),
            options,
            patterns,
            scoper: None,
            emitter: Box::new(OxcScriptEmitter),
            preprocessors: Vec::new(),
            cache: ContentCache::default(),
            profiling: ProfilingResults::default(),
        })
    }

    /// Compiler configured from `<project_root>/package.json`.
    pub fn from_project(project_root: impl Into<PathBuf>) -> Result<Self, CompileError> {
        let project_root = project_root.into();
        let options = PluginOptions::load(&project_root)?;
        Self::new(project_root, options)
    }

    pub fn with_scoper(mut self, scoper: Box<dyn SelectorScoper>) -> Self {
        self.scoper = Some(scoper);
        self
    }

    pub fn with_emitter(mut self, emitter: Box<dyn ScriptEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Box<dyn Preprocessor>) -> Self {
        self.preprocessors.push(preprocessor);
        self
    }

    pub fn with_cache(mut self, cache: ContentCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn profiling(&self) -> ProfilingResults {
        self.profiling
    }

    /// Swap the configuration. The next build starts from an empty cache
    /// unless the options are unchanged.
    pub fn reload_options(&mut self, options: PluginOptions) -> Result<(), CompileError> {
        self.patterns = options.compile_patterns()?;
        self.options_fingerprint = options.fingerprint();
        self.options = options;
        Ok(())
    }

    pub fn process_files_for_target(&mut self, files: Vec<InputFile>) -> Result<BuildOutput, CompileError> {
        let start = Instant::now();
        let mut stats = BuildStats {
            cache_reset: self.cache.ensure_options(&self.options_fingerprint),
            ..BuildStats::default()
        };

        let files = collect_input_files(&self.project_root, files, &self.options, &self.patterns)?;
        let root = self.project_root.to_string_lossy().replace('\\', "/");
        let source_files: Vec<SourceFile> = files
            .into_iter()
            .map(|file| SourceFile::from_input(&root, file))
            .collect();

        let fingerprints: HashMap<String, String> = source_files
            .iter()
            .map(|file| (file.import_path.clone(), file.source_hash.clone()))
            .collect();
        let roots: Vec<(String, String)> = source_files
            .iter()
            .filter(|file| preprocess::is_root(&self.preprocessors, &PreprocessInput::from_file(file)))
            .map(|file| (file.import_path.clone(), cache_key(file)))
            .collect();

        let mut files = Materializer::new(source_files, self.options.global_variables_text());
        let default_scoper;
        let scoper: &dyn SelectorScoper = match &self.scoper {
            Some(scoper) => scoper.as_ref(),
            None => {
                default_scoper = ClassNameScoper::new(&self.options.scoped_class_name);
                &default_scoper
            }
        };
        let mut resolver = ImportGraphResolver::new(&root, &self.patterns, scoper, &self.preprocessors);
        let decider = OutputShapeDecider::new(&self.options, self.emitter.as_ref());
        let mut outputs = Vec::with_capacity(roots.len());

        for (import_path, key) in roots {
            if let Some(entry) = self.cache.get(&key) {
                if entry.dependencies_unchanged(&fingerprints) {
                    tracing::debug!("[CssModules] Cache hit for {}", import_path);
                    outputs.push(entry.compile_result.artifacts(&self.options));
                    stats.cached += 1;
                    continue;
                }
                tracing::debug!("[CssModules] Imports of {} changed", import_path);
            }

            let started = Instant::now();
            resolver.resolve(&import_path, &mut files)?;
            self.profiling.transpile_css_modules += started.elapsed();

            let file = files
                .peek(&import_path)
                .ok_or_else(|| CompileError::UnresolvedImport {
                    importer: import_path.clone(),
                    target: import_path.clone(),
                })?;
            let result = decider.decide(file)?;
            let referenced_imports = file
                .referenced_import_paths
                .iter()
                .filter_map(|path| {
                    fingerprints.get(path).map(|hash| ReferencedImport {
                        import_path: path.clone(),
                        source_hash: hash.clone(),
                    })
                })
                .collect();

            outputs.push(result.artifacts(&self.options));
            self.cache.set(
                &key,
                CacheEntry {
                    compile_result: result,
                    referenced_imports,
                },
            );
            stats.compiled += 1;
        }

        self.profiling.process_files_for_target = start.elapsed();
        if self.options.enable_profiling {
            tracing::info!(
                "[CssModules] Built {} files ({} cached) in {:?}, resolving took {:?}",
                stats.compiled + stats.cached,
                stats.cached,
                self.profiling.process_files_for_target,
                self.profiling.transpile_css_modules
            );
        } else {
            tracing::debug!(
                "[CssModules] Built {} files ({} cached) in {:?}",
                stats.compiled + stats.cached,
                stats.cached,
                self.profiling.process_files_for_target
            );
        }

        Ok(BuildOutput { files: outputs, stats })
    }
}

/// Content fingerprint qualified by target and location: generated names
/// depend on the path and the output shape on the architecture.
fn cache_key(file: &SourceFile) -> String {
    compute_hash(format!("{}\n{}\n{}", file.arch, file.import_path, file.source_hash).as_bytes())
}
