//! Output Shape Decider
//!
//! Turns a resolved file into what the host receives: an eager stylesheet, a
//! companion script, both or neither.
//!
//! | lazy  | browser | has CSS | stylesheet | style in script |
//! |-------|---------|---------|------------|-----------------|
//! | false | true    | yes     | yes        | no              |
//! | true  | true    | yes     | no         | injected        |
//! | any   | false   | any     | no         | no              |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::emitter::ScriptEmitter;
use crate::error::CompileError;
use crate::import_path::{dirname, normalize};
use crate::options::PluginOptions;
use crate::source_file::{SourceFile, SourceMap};

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE RESULT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    /// Package path of the compiled file.
    pub file_path: String,
    pub is_lazy: bool,
    pub stylesheet: Option<String>,
    pub script: Option<String>,
    pub source_map: Option<SourceMap>,
}

impl CompileResult {
    pub fn emits_stylesheet(&self) -> bool {
        self.stylesheet.is_some()
    }

    pub fn emits_script(&self) -> bool {
        self.script.is_some()
    }

    /// Host-facing blobs, with paths rendered from the output templates.
    pub fn artifacts(&self, options: &PluginOptions) -> FileOutput {
        let stylesheet = self.stylesheet.as_ref().map(|data| StylesheetArtifact {
            path: get_output_path(&self.file_path, &options.output_css_file_path, ".css"),
            source_path: self.file_path.clone(),
            data: data.clone(),
            source_map: self
                .source_map
                .as_ref()
                .and_then(|map| serde_json::to_string(map).ok()),
            lazy: false,
        });
        let script = self.script.as_ref().map(|data| ScriptArtifact {
            path: get_output_path(&self.file_path, &options.output_js_file_path, ".js"),
            source_path: self.file_path.clone(),
            data: data.clone(),
            lazy: self.is_lazy,
            bare: false,
        });

        FileOutput {
            path_in_package: self.file_path.clone(),
            stylesheet,
            script,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StylesheetArtifact {
    pub path: String,
    pub source_path: String,
    pub data: String,
    /// Serialized source map.
    pub source_map: Option<String>,
    pub lazy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptArtifact {
    pub path: String,
    pub source_path: String,
    pub data: String,
    pub lazy: bool,
    pub bare: bool,
}

/// Everything emitted for one root file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutput {
    pub path_in_package: String,
    pub stylesheet: Option<StylesheetArtifact>,
    pub script: Option<ScriptArtifact>,
}

/// Render an output path template for `file_path`.
///
/// `{dirname}`, `{basename}` and `{extname}` are replaced; `suffix` is added
/// unless the rendered path already ends with it.
pub fn get_output_path(file_path: &str, template: &str, suffix: &str) -> String {
    let name = file_path.rsplit('/').next().unwrap_or(file_path);
    let (basename, extname) = match name.rfind('.') {
        Some(index) if index > 0 => (&name[..index], &name[index..]),
        _ => (name, ""),
    };

    let rendered = template
        .replace("{dirname}", dirname(file_path))
        .replace("{basename}", basename)
        .replace("{extname}", extname);
    let rendered = normalize(&rendered);

    if rendered.ends_with(suffix) {
        rendered
    } else {
        format!("{}{}", rendered, suffix)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENS
// ═══════════════════════════════════════════════════════════════════════════════

/// `test-two` -> `testTwo`
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '-' || ch == '_' {
            upper = !out.is_empty();
            continue;
        }
        if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Token map as exported to scripts. With camelCase enabled the first key
/// mapping to a given camelCase name wins.
pub fn exported_tokens(tokens: &BTreeMap<String, String>, camel: bool) -> BTreeMap<String, String> {
    if !camel {
        return tokens.clone();
    }
    let mut exported = BTreeMap::new();
    for (name, value) in tokens {
        exported.entry(camel_case(name)).or_insert_with(|| value.clone());
    }
    exported
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECIDER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct OutputShapeDecider<'a> {
    options: &'a PluginOptions,
    emitter: &'a dyn ScriptEmitter,
}

impl<'a> OutputShapeDecider<'a> {
    pub fn new(options: &'a PluginOptions, emitter: &'a dyn ScriptEmitter) -> Self {
        Self { options, emitter }
    }

    pub fn decide(&self, file: &SourceFile) -> Result<CompileResult, CompileError> {
        let is_lazy = file.is_lazy();
        let browser = file.targets_browser();
        let has_content = !file.contents.trim().is_empty();

        let stylesheet = (browser && !is_lazy && has_content).then(|| file.contents.clone());
        let injected = (browser && is_lazy && has_content).then_some(file.contents.as_str());

        let script = match self.build_script_source(file, injected) {
            Some(source) => Some(self.emit(file, &source)?),
            None => None,
        };
        let source_map = if stylesheet.is_some() {
            file.source_map.clone()
        } else {
            None
        };

        Ok(CompileResult {
            file_path: file.path_in_package.clone(),
            is_lazy,
            stylesheet,
            script,
            source_map,
        })
    }

    /// Module source for the companion script, `None` when nothing needs one.
    pub fn build_script_source(&self, file: &SourceFile, injected_style: Option<&str>) -> Option<String> {
        let mut parts = Vec::new();

        for specifier in &file.imports {
            parts.push(format!("import {};", json_string(specifier)));
        }

        if let Some(css) = injected_style {
            parts.push(format!(
                "import modules from {};\nmodules.addStyles({});",
                json_string(&self.options.runtime_styles_module),
                json_string(css)
            ));
        }

        if !file.tokens.is_empty() {
            let tokens = exported_tokens(
                &file.tokens,
                self.options.js_class_naming_convention.camel_case,
            );
            let json = serde_json::to_string(&tokens).unwrap_or_else(|_| "{}".to_string());
            parts.push(format!(
                "const styles = {};\nexport {{ styles as default, styles }};",
                json
            ));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    fn emit(&self, file: &SourceFile, source: &str) -> Result<String, CompileError> {
        self.emitter.compile(source).map_err(|message| {
            tracing::error!(
                "[CssModules] Unable to compile generated script for {}:\n{}\n{}",
                file.path_in_package,
                source,
                message
            );
            CompileError::ScriptCompile {
                file: file.path_in_package.clone(),
                message,
            }
        })
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::OxcScriptEmitter;
    use crate::source_file::InputFile;

    /// Returns the generated source untouched.
    struct VerbatimEmitter;

    impl ScriptEmitter for VerbatimEmitter {
        fn compile(&self, source: &str) -> Result<String, String> {
            Ok(source.to_string())
        }
    }

    struct FailingEmitter;

    impl ScriptEmitter for FailingEmitter {
        fn compile(&self, _source: &str) -> Result<String, String> {
            Err("Unexpected token".to_string())
        }
    }

    fn resolved(path: &str, arch: &str, css: &str, tokens: &[(&str, &str)]) -> SourceFile {
        let mut file = SourceFile::from_input("/app", InputFile::new(path, css, arch));
        file.contents = css.to_string();
        file.tokens = tokens
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        file.is_prepared = true;
        file.is_resolved = true;
        file
    }

    #[test]
    fn test_eager_browser_file_emits_stylesheet() {
        let options = PluginOptions::default();
        let decider = OutputShapeDecider::new(&options, &VerbatimEmitter);
        let file = resolved("client/a.css", "web.browser", "._a__a {}", &[("a", "_a__a")]);

        let result = decider.decide(&file).unwrap();
        assert_eq!(result.stylesheet.as_deref(), Some("._a__a {}"));
        assert!(!result.is_lazy);
        assert_eq!(
            result.script.as_deref(),
            Some("const styles = {\"a\":\"_a__a\"};\nexport { styles as default, styles };")
        );
    }

    #[test]
    fn test_lazy_browser_file_injects_style() {
        let options = PluginOptions::default();
        let decider = OutputShapeDecider::new(&options, &VerbatimEmitter);
        let file = resolved("imports/ui/a.css", "web.browser", "._a__a {}", &[]);

        let result = decider.decide(&file).unwrap();
        assert!(!result.emits_stylesheet());
        assert!(result.is_lazy);
        assert_eq!(
            result.script.as_deref(),
            Some("import modules from \"meteor/modules\";\nmodules.addStyles(\"._a__a {}\");")
        );
    }

    #[test]
    fn test_server_file_emits_no_stylesheet() {
        let options = PluginOptions::default();
        let decider = OutputShapeDecider::new(&options, &VerbatimEmitter);

        let eager = resolved("client/a.css", "os.linux.x86_64", "._a__a {}", &[("a", "_a__a")]);
        let result = decider.decide(&eager).unwrap();
        assert!(!result.emits_stylesheet());
        assert!(result.emits_script());

        let lazy = resolved("imports/a.css", "os", "._a__a {}", &[]);
        let result = decider.decide(&lazy).unwrap();
        assert!(!result.emits_stylesheet());
        assert!(!result.emits_script());
    }

    #[test]
    fn test_imports_precede_tokens() {
        let options = PluginOptions::default();
        let decider = OutputShapeDecider::new(&options, &VerbatimEmitter);
        let mut file = resolved("client/a.css", "web.browser", "", &[("a", "_a__a _b__b")]);
        file.imports = vec!["./b.css".to_string()];

        let source = decider.build_script_source(&file, None).unwrap();
        assert!(source.starts_with("import \"./b.css\";\nconst styles"));
    }

    #[test]
    fn test_no_script_without_content() {
        let options = PluginOptions::default();
        let decider = OutputShapeDecider::new(&options, &VerbatimEmitter);
        let file = resolved("client/empty.css", "web.browser", "  \n", &[]);

        let result = decider.decide(&file).unwrap();
        assert!(!result.emits_stylesheet());
        assert!(!result.emits_script());
    }

    #[test]
    fn test_camel_case_export() {
        let mut options = PluginOptions::default();
        options.js_class_naming_convention.camel_case = true;
        let decider = OutputShapeDecider::new(&options, &VerbatimEmitter);
        let file = resolved(
            "client/a.css",
            "web.browser",
            "",
            &[("test-two", "_test__test-two")],
        );

        let source = decider.build_script_source(&file, None).unwrap();
        assert!(source.contains("\"testTwo\":\"_test__test-two\""));
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("test-two"), "testTwo");
        assert_eq!(camel_case("big_red-button"), "bigRedButton");
        assert_eq!(camel_case("-leading"), "leading");
        assert_eq!(camel_case("plain"), "plain");
    }

    #[test]
    fn test_emitter_failure_is_reported() {
        let options = PluginOptions::default();
        let decider = OutputShapeDecider::new(&options, &FailingEmitter);
        let file = resolved("client/a.css", "web.browser", "._a__a {}", &[("a", "_a__a")]);

        match decider.decide(&file) {
            Err(CompileError::ScriptCompile { file, message }) => {
                assert_eq!(file, "client/a.css");
                assert_eq!(message, "Unexpected token");
            }
            other => panic!("expected a script error, got {:?}", other),
        }
    }

    #[test]
    fn test_oxc_emitter_accepts_generated_module() {
        let options = PluginOptions::default();
        let decider = OutputShapeDecider::new(&options, &OxcScriptEmitter);
        let mut file = resolved(
            "imports/a.css",
            "web.browser",
            "._a__a { content: \"x\" }",
            &[("a", "_a__a")],
        );
        file.imports = vec!["./b.css".to_string()];

        let script = decider.decide(&file).unwrap().script.unwrap();
        assert!(script.contains("addStyles"));
        assert!(script.contains("_a__a"));
        assert_eq!(
            crate::emitter::declared_imports(&script),
            vec!["./b.css", "meteor/modules"]
        );
    }

    #[test]
    fn test_output_paths() {
        assert_eq!(
            get_output_path("client/ui/a.css", "{dirname}/{basename}{extname}", ".css"),
            "client/ui/a.css"
        );
        assert_eq!(
            get_output_path("client/ui/a.css", "{dirname}/{basename}{extname}", ".js"),
            "client/ui/a.css.js"
        );
        assert_eq!(
            get_output_path("a.scss", "{dirname}/{basename}{extname}", ".css"),
            "a.scss.css"
        );
        assert_eq!(
            get_output_path("client/a.css", "build/{basename}", ".css"),
            "build/a.css"
        );
    }

    #[test]
    fn test_artifacts() {
        let mut options = PluginOptions::default();
        options.output_js_file_path = "{dirname}/{basename}".to_string();
        let result = CompileResult {
            file_path: "imports/a.css".to_string(),
            is_lazy: true,
            stylesheet: None,
            script: Some("export {};".to_string()),
            source_map: None,
        };

        let output = result.artifacts(&options);
        assert!(output.stylesheet.is_none());
        let script = output.script.unwrap();
        assert_eq!(script.path, "imports/a.js");
        assert_eq!(script.source_path, "imports/a.css");
        assert!(script.lazy);
        assert!(!script.bare);
    }

    #[test]
    fn test_compile_result_serializes_camel_case() {
        let result = CompileResult {
            file_path: "a.css".to_string(),
            is_lazy: false,
            stylesheet: Some("x".to_string()),
            script: None,
            source_map: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"filePath\":\"a.css\""));
        assert!(json.contains("\"isLazy\":false"));
        let back: CompileResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
