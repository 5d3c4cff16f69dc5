//! Import Graph Resolver
//!
//! Walks the `composes ... from` graph depth first. Resolving a file
//! materializes, preprocesses and scopes it, then resolves every file it
//! composes from before merging their tokens and reference lists into its own.
//!
//! Ordering rules:
//! - `imports` holds first-level targets in the order their compositions first
//!   appear, deduplicated by resolved path.
//! - `referenced_import_paths` lists the direct imports first, then whatever
//!   each of them references, first occurrence wins.
//! - A token value starts with the local generated name, followed by composed
//!   names in composition order, without duplicates. Local compositions are
//!   expanded after the whole file is known, so rule order does not matter.
//! - Files a preprocessor reads while including them are referenced after
//!   the composed ones.

use std::collections::BTreeMap;

use crate::error::CompileError;
use crate::import_path::resolve_specifier;
use crate::materializer::Materializer;
use crate::options::PathPatterns;
use crate::preprocess::{PreprocessInput, Preprocessor};
use crate::scoper::{ComposeSource, ScopeInput, ScopedStylesheet, SelectorScoper};
use crate::source_file::SourceFile;

pub struct ImportGraphResolver<'a> {
    project_root: &'a str,
    patterns: &'a PathPatterns,
    scoper: &'a dyn SelectorScoper,
    preprocessors: &'a [Box<dyn Preprocessor>],
    /// Files currently being resolved, outermost first.
    in_progress: Vec<String>,
}

impl<'a> ImportGraphResolver<'a> {
    pub fn new(
        project_root: &'a str,
        patterns: &'a PathPatterns,
        scoper: &'a dyn SelectorScoper,
        preprocessors: &'a [Box<dyn Preprocessor>],
    ) -> Self {
        Self {
            project_root,
            patterns,
            scoper,
            preprocessors,
            in_progress: Vec::new(),
        }
    }

    /// Resolve a file and, transitively, everything it composes from.
    /// Already resolved files are left untouched.
    pub fn resolve(&mut self, import_path: &str, files: &mut Materializer) -> Result<(), CompileError> {
        self.resolve_from(import_path, import_path, files)
    }

    fn resolve_from(
        &mut self,
        importer: &str,
        import_path: &str,
        files: &mut Materializer,
    ) -> Result<(), CompileError> {
        match files.get(import_path) {
            Some(file) if file.is_resolved => return Ok(()),
            Some(_) => {}
            None => {
                return Err(CompileError::UnresolvedImport {
                    importer: importer.to_string(),
                    target: import_path.to_string(),
                })
            }
        }

        if let Some(start) = self.in_progress.iter().position(|p| p == import_path) {
            let mut cycle = self.in_progress[start..].to_vec();
            cycle.push(import_path.to_string());
            return Err(CompileError::CyclicComposition { cycle });
        }

        tracing::debug!("[CssModules] Resolving {}", import_path);
        self.in_progress.push(import_path.to_string());
        let result = self.resolve_file(import_path, files);
        self.in_progress.pop();
        result
    }

    fn resolve_file(&mut self, import_path: &str, files: &mut Materializer) -> Result<(), CompileError> {
        files.start_recording();
        let preprocessed = self.preprocess(import_path, files);
        let included = files.take_recorded();
        preprocessed?;

        let ScopedStylesheet {
            css,
            tokens: locals,
            compositions,
            source_map,
        } = self.scope(import_path, files)?;

        let mut imports: Vec<String> = Vec::new();
        let mut direct: Vec<String> = Vec::new();
        let mut composed: BTreeMap<String, Vec<Composed>> = BTreeMap::new();

        for composition in &compositions {
            let part = match &composition.source {
                ComposeSource::Global => Composed::Names(composition.class_names.clone()),
                ComposeSource::Local => Composed::Local(composition.class_names.clone()),
                ComposeSource::File(specifier) => {
                    let target = resolve_specifier(self.project_root, import_path, specifier);
                    if !direct.contains(&target) {
                        direct.push(target.clone());
                        imports.push(specifier.clone());
                    }
                    self.resolve_from(import_path, &target, files)?;
                    let target_file = file_mut(files, import_path, &target)?;
                    Composed::Names(lookup_classes(
                        &target_file.tokens,
                        &composition.class_names,
                        import_path,
                        &target,
                    )?)
                }
            };
            for local in &composition.local_names {
                composed.entry(local.clone()).or_default().push(part.clone());
            }
        }

        let mut expansion = LocalExpansion {
            import_path,
            locals: &locals,
            composed: &composed,
            expanded: BTreeMap::new(),
            in_progress: Vec::new(),
        };
        for name in locals.keys() {
            expansion.expand(name)?;
        }
        let tokens = expansion.expanded;

        let mut referenced = Vec::new();
        for target in &direct {
            push_unique(&mut referenced, target, import_path);
        }
        for target in &direct {
            let transitive = file_mut(files, import_path, target)?
                .referenced_import_paths
                .clone();
            for path in &transitive {
                push_unique(&mut referenced, path, import_path);
            }
        }
        for path in &included {
            push_unique(&mut referenced, path, import_path);
        }

        let file = file_mut(files, import_path, import_path)?;
        file.contents = css;
        file.tokens = tokens;
        file.imports = imports;
        file.referenced_import_paths = referenced;
        file.source_map = source_map;
        file.is_resolved = true;
        Ok(())
    }

    /// Run the accepting preprocessors in order. Files they read through the
    /// lookup are recorded by the materializer.
    fn preprocess(&self, import_path: &str, files: &mut Materializer) -> Result<(), CompileError> {
        for preprocessor in self.preprocessors {
            let input = PreprocessInput::from_file(file_mut(files, import_path, import_path)?);
            if !preprocessor.should_process(&input) {
                continue;
            }
            let contents = preprocessor
                .process(&input, files)
                .map_err(|message| CompileError::Preprocess {
                    file: import_path.to_string(),
                    message,
                })?;
            file_mut(files, import_path, import_path)?.contents = contents;
        }
        Ok(())
    }

    fn scope(&self, import_path: &str, files: &mut Materializer) -> Result<ScopedStylesheet, CompileError> {
        let file = file_mut(files, import_path, import_path)?;
        if self.patterns.is_passthrough(&file.path_in_package) {
            return Ok(ScopedStylesheet {
                css: file.contents.clone(),
                tokens: BTreeMap::new(),
                compositions: Vec::new(),
                source_map: None,
            });
        }

        let input = ScopeInput {
            import_path: file.import_path.clone(),
            path_in_package: file.path_in_package.clone(),
            contents: file.contents.clone(),
        };
        self.scoper
            .scope(&input)
            .map_err(|message| CompileError::Scoping {
                file: import_path.to_string(),
                message,
            })
    }
}

/// What a local class composes, in declaration order.
#[derive(Debug, Clone)]
enum Composed {
    /// Generated or global names, already final.
    Names(Vec<String>),
    /// Classes of the same file, expanded once the whole file is known.
    Local(Vec<String>),
}

/// Expands local compositions regardless of where the composed rule sits
/// in the file.
struct LocalExpansion<'r> {
    import_path: &'r str,
    locals: &'r BTreeMap<String, String>,
    composed: &'r BTreeMap<String, Vec<Composed>>,
    expanded: BTreeMap<String, String>,
    in_progress: Vec<String>,
}

impl LocalExpansion<'_> {
    fn expand(&mut self, name: &str) -> Result<String, CompileError> {
        if let Some(value) = self.expanded.get(name) {
            return Ok(value.clone());
        }
        if let Some(start) = self.in_progress.iter().position(|n| n == name) {
            let mut cycle: Vec<String> = self.in_progress[start..]
                .iter()
                .map(|n| format!("{} .{}", self.import_path, n))
                .collect();
            cycle.push(format!("{} .{}", self.import_path, name));
            return Err(CompileError::CyclicComposition { cycle });
        }
        let mut value = self
            .locals
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::UnknownComposedClass {
                file: self.import_path.to_string(),
                class_name: name.to_string(),
                target: self.import_path.to_string(),
            })?;

        let composed = self.composed;
        let parts = composed.get(name).map(Vec::as_slice).unwrap_or_default();
        self.in_progress.push(name.to_string());
        for part in parts {
            match part {
                Composed::Names(names) => {
                    for generated in names.iter().flat_map(|n| n.split_whitespace()) {
                        append_unique(&mut value, generated);
                    }
                }
                Composed::Local(classes) => {
                    for class_name in classes {
                        let inherited = self.expand(class_name)?;
                        for generated in inherited.split_whitespace() {
                            append_unique(&mut value, generated);
                        }
                    }
                }
            }
        }
        self.in_progress.pop();

        self.expanded.insert(name.to_string(), value.clone());
        Ok(value)
    }
}

fn file_mut<'f>(
    files: &'f mut Materializer,
    importer: &str,
    import_path: &str,
) -> Result<&'f mut SourceFile, CompileError> {
    files
        .get(import_path)
        .ok_or_else(|| CompileError::UnresolvedImport {
            importer: importer.to_string(),
            target: import_path.to_string(),
        })
}

fn lookup_classes(
    tokens: &BTreeMap<String, String>,
    class_names: &[String],
    file: &str,
    target: &str,
) -> Result<Vec<String>, CompileError> {
    class_names
        .iter()
        .map(|class_name| {
            tokens
                .get(class_name)
                .cloned()
                .ok_or_else(|| CompileError::UnknownComposedClass {
                    file: file.to_string(),
                    class_name: class_name.clone(),
                    target: target.to_string(),
                })
        })
        .collect()
}

fn append_unique(value: &mut String, name: &str) {
    if value.split_whitespace().any(|existing| existing == name) {
        return;
    }
    if !value.is_empty() {
        value.push(' ');
    }
    value.push_str(name);
}

fn push_unique(paths: &mut Vec<String>, path: &str, own_path: &str) {
    if path != own_path && !paths.iter().any(|existing| existing == path) {
        paths.push(path.to_string());
    }
}
