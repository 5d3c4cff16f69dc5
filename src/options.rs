//! Plugin options
//!
//! Options live under the `cssModules` key of the project's `package.json`.
//! Every field has a default, so a project without the key compiles with the
//! stock configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::CompileError;

pub const DEFAULT_OUTPUT_FILE_PATH: &str = "{dirname}/{basename}{extname}";
pub const DEFAULT_SCOPED_CLASS_NAME: &str = "_[path]__[local]";
pub const DEFAULT_RUNTIME_STYLES_MODULE: &str = "meteor/modules";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginOptions {
    /// Regexes matched against the package path; matching files are dropped.
    pub ignore_paths: Vec<String>,
    /// Folders walked for extra style files not handed over by the host.
    pub explicit_includes: Vec<String>,
    /// Extensions (without the leading dot) recognized in explicit includes.
    pub extensions: Vec<String>,
    /// Prepended to every file as `$name: value;` lines.
    pub global_variables: BTreeMap<String, String>,
    pub js_class_naming_convention: ClassNamingConvention,
    /// Regexes matched against the package path; matching files skip scoping.
    pub passthrough_paths: Vec<String>,
    pub output_css_file_path: String,
    pub output_js_file_path: String,
    /// Template for generated class names: `[path]`, `[name]` and `[local]`.
    pub scoped_class_name: String,
    /// Module whose default export provides `addStyles` for lazy files.
    pub runtime_styles_module: String,
    pub enable_profiling: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassNamingConvention {
    pub camel_case: bool,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            ignore_paths: Vec::new(),
            explicit_includes: Vec::new(),
            extensions: vec!["css".to_string(), "m.css".to_string(), "mss".to_string()],
            global_variables: BTreeMap::new(),
            js_class_naming_convention: ClassNamingConvention::default(),
            passthrough_paths: Vec::new(),
            output_css_file_path: DEFAULT_OUTPUT_FILE_PATH.to_string(),
            output_js_file_path: DEFAULT_OUTPUT_FILE_PATH.to_string(),
            scoped_class_name: DEFAULT_SCOPED_CLASS_NAME.to_string(),
            runtime_styles_module: DEFAULT_RUNTIME_STYLES_MODULE.to_string(),
            enable_profiling: false,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    #[serde(default)]
    css_modules: Option<PluginOptions>,
}

impl PluginOptions {
    /// Load options from `<project_root>/package.json`.
    ///
    /// A missing file or a missing `cssModules` key yields the defaults; a
    /// malformed one is an error.
    pub fn load(project_root: &Path) -> Result<Self, CompileError> {
        let path = project_root.join("package.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path).map_err(|source| CompileError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_package_json(&data).map_err(|source| CompileError::Options { path, source })
    }

    pub fn from_package_json(data: &str) -> Result<Self, serde_json::Error> {
        let package: PackageJson = serde_json::from_str(data)?;
        Ok(package.css_modules.unwrap_or_default())
    }

    /// SHA-256 of the canonical JSON form. Maps are ordered, so equal options
    /// always hash equal.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Header text prepended to every file, if any global variables are set.
    pub fn global_variables_text(&self) -> Option<String> {
        if self.global_variables.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .global_variables
            .iter()
            .map(|(name, value)| format!("${}: {};", name.trim_start_matches('$'), value))
            .collect();
        Some(lines.join("\n"))
    }

    pub fn compile_patterns(&self) -> Result<PathPatterns, CompileError> {
        Ok(PathPatterns {
            ignore: compile_all(&self.ignore_paths)?,
            passthrough: compile_all(&self.passthrough_paths)?,
        })
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, CompileError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| CompileError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Compiled ignore and passthrough patterns.
#[derive(Debug, Clone, Default)]
pub struct PathPatterns {
    ignore: Vec<Regex>,
    passthrough: Vec<Regex>,
}

impl PathPatterns {
    pub fn is_ignored(&self, path_in_package: &str) -> bool {
        self.ignore.iter().any(|re| re.is_match(path_in_package))
    }

    pub fn is_passthrough(&self, path_in_package: &str) -> bool {
        self.passthrough.iter().any(|re| re.is_match(path_in_package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_key_missing() {
        let options = PluginOptions::from_package_json(r#"{ "name": "app" }"#).unwrap();
        assert_eq!(options, PluginOptions::default());
        assert_eq!(options.scoped_class_name, "_[path]__[local]");
    }

    #[test]
    fn test_partial_options_keep_defaults() {
        let json = r#"{
            "cssModules": {
                "ignorePaths": ["node_modules/"],
                "jsClassNamingConvention": { "camelCase": true }
            }
        }"#;
        let options = PluginOptions::from_package_json(json).unwrap();
        assert_eq!(options.ignore_paths, vec!["node_modules/".to_string()]);
        assert!(options.js_class_naming_convention.camel_case);
        assert_eq!(options.output_css_file_path, DEFAULT_OUTPUT_FILE_PATH);
        assert_eq!(options.extensions.len(), 3);
    }

    #[test]
    fn test_fingerprint_changes_with_any_option() {
        let base = PluginOptions::default();
        assert_eq!(base.fingerprint(), PluginOptions::default().fingerprint());

        let mut camel = base.clone();
        camel.js_class_naming_convention.camel_case = true;
        assert_ne!(base.fingerprint(), camel.fingerprint());

        let mut globals = base.clone();
        globals
            .global_variables
            .insert("primary".to_string(), "red".to_string());
        assert_ne!(base.fingerprint(), globals.fingerprint());
    }

    #[test]
    fn test_global_variables_text() {
        let mut options = PluginOptions::default();
        assert_eq!(options.global_variables_text(), None);

        options
            .global_variables
            .insert("primary".to_string(), "red".to_string());
        options
            .global_variables
            .insert("$gutter".to_string(), "8px".to_string());
        assert_eq!(
            options.global_variables_text().as_deref(),
            Some("$gutter: 8px;\n$primary: red;")
        );
    }

    #[test]
    fn test_path_patterns() {
        let mut options = PluginOptions::default();
        options.ignore_paths.push("^node_modules/".to_string());
        options.passthrough_paths.push("vendor".to_string());
        let patterns = options.compile_patterns().unwrap();

        assert!(patterns.is_ignored("node_modules/lib/a.css"));
        assert!(!patterns.is_ignored("client/node_modules.css"));
        assert!(patterns.is_passthrough("client/vendor/reset.css"));
        assert!(!patterns.is_passthrough("client/app.css"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut options = PluginOptions::default();
        options.passthrough_paths.push("[unclosed".to_string());
        match options.compile_patterns() {
            Err(CompileError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "[unclosed"),
            other => panic!("expected InvalidPattern, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_from_project_root() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            PluginOptions::load(dir.path()).unwrap(),
            PluginOptions::default()
        );

        fs::write(
            dir.path().join("package.json"),
            r#"{ "cssModules": { "passthroughPaths": ["legacy"] } }"#,
        )
        .unwrap();
        let options = PluginOptions::load(dir.path()).unwrap();
        assert_eq!(options.passthrough_paths, vec!["legacy".to_string()]);

        fs::write(dir.path().join("package.json"), "{ not json").unwrap();
        assert!(matches!(
            PluginOptions::load(dir.path()),
            Err(CompileError::Options { .. })
        ));
    }
}
