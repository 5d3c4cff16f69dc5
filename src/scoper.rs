//! Selector Scoping Engine
//!
//! Rewrites local class selectors to generated, globally unique names and
//! extracts `composes` declarations. The resolver only sees the result:
//! the rewritten CSS, the local tokens and the ordered compositions.
//!
//! `ClassNameScoper` is a small engine. It understands rule
//! blocks, at-rules, comments, strings, `:global`/`:local` and `composes`;
//! it does not validate CSS.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

use crate::source_file::SourceMap;

lazy_static! {
    static ref NON_WORD_RE: Regex = Regex::new(r"[\W_]+").unwrap();
    static ref EXTENSION_RE: Regex = Regex::new(r"\.[^./\\]+$").unwrap();
    static ref COMPOSES_RE: Regex = Regex::new(
        r#"(?s)^composes\s*:\s*(.+?)(?:\s+from\s+(?:"([^"]*)"|'([^']*)'|(global)))?\s*$"#
    )
    .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE BOUNDARY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInput {
    pub import_path: String,
    pub path_in_package: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeSource {
    /// `composes: a b;` classes of the same file.
    Local,
    /// `composes: a from global;` class names used as-is.
    Global,
    /// `composes: a from "./other.css";` the specifier as written.
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    /// Local classes of the rule containing the declaration.
    pub local_names: Vec<String>,
    /// Classes being composed, in declaration order.
    pub class_names: Vec<String>,
    pub source: ComposeSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedStylesheet {
    pub css: String,
    /// Local class name -> generated name.
    pub tokens: BTreeMap<String, String>,
    pub compositions: Vec<Composition>,
    pub source_map: Option<SourceMap>,
}

pub trait SelectorScoper {
    fn scope(&self, input: &ScopeInput) -> Result<ScopedStylesheet, String>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPED NAMES
// ═══════════════════════════════════════════════════════════════════════════════

fn sanitize(value: &str) -> String {
    NON_WORD_RE
        .replace_all(value, "_")
        .trim_matches('_')
        .to_string()
}

/// `client/components/button.css` -> `client_components__button`
pub fn scoped_path(path_in_package: &str) -> String {
    let path = path_in_package.trim_start_matches("./");
    let without_ext = EXTENSION_RE.replace(path, "");
    let sanitized = sanitize(&without_ext);
    let name = sanitize(without_ext.rsplit('/').next().unwrap_or_default());

    let suffix = format!("_{}", name);
    if !name.is_empty() && sanitized.len() > suffix.len() && sanitized.ends_with(&suffix) {
        format!("{}__{}", &sanitized[..sanitized.len() - suffix.len()], name)
    } else {
        sanitized
    }
}

pub fn generate_scoped_name(template: &str, path_in_package: &str, local: &str) -> String {
    let path = path_in_package.trim_start_matches("./");
    let without_ext = EXTENSION_RE.replace(path, "");
    let name = sanitize(without_ext.rsplit('/').next().unwrap_or_default());
    template
        .replace("[path]", &scoped_path(path_in_package))
        .replace("[name]", &name)
        .replace("[local]", local)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASS NAME SCOPER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ClassNameScoper {
    template: String,
}

enum Block {
    Rule(Vec<String>),
    AtRule,
}

#[derive(Clone, Copy)]
enum Wrapper {
    Plain,
    Global,
    Local,
}

impl ClassNameScoper {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    fn rewrite_selector(
        &self,
        selector: &str,
        path_in_package: &str,
        tokens: &mut BTreeMap<String, String>,
    ) -> (String, Vec<String>) {
        let chars: Vec<char> = selector.chars().collect();
        let mut out = String::with_capacity(selector.len());
        let mut classes = Vec::new();
        let mut wrappers: Vec<Wrapper> = Vec::new();
        let mut bare_global = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '/' if chars.get(i + 1) == Some(&'*') => {
                    let end = find_seq(&chars, i + 2, &['*', '/']).map_or(chars.len(), |e| e + 2);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '"' | '\'' => {
                    let end = skip_quoted(&chars, i);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '[' => {
                    let end = find_seq(&chars, i + 1, &[']']).map_or(chars.len(), |e| e + 1);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                ',' => {
                    if wrappers.is_empty() {
                        bare_global = false;
                    }
                    out.push(c);
                    i += 1;
                }
                ':' if starts_with_at(&chars, i, ":global(") => {
                    wrappers.push(Wrapper::Global);
                    i += ":global(".len();
                }
                ':' if starts_with_at(&chars, i, ":local(") => {
                    wrappers.push(Wrapper::Local);
                    i += ":local(".len();
                }
                ':' if starts_with_keyword(&chars, i, ":global") => {
                    bare_global = true;
                    i = skip_whitespace(&chars, i + ":global".len());
                }
                ':' if starts_with_keyword(&chars, i, ":local") => {
                    bare_global = false;
                    i = skip_whitespace(&chars, i + ":local".len());
                }
                '(' => {
                    wrappers.push(Wrapper::Plain);
                    out.push(c);
                    i += 1;
                }
                ')' => {
                    if let Some(Wrapper::Plain) | None = wrappers.pop() {
                        out.push(c);
                    }
                    i += 1;
                }
                '.' if chars.get(i + 1).copied().is_some_and(is_ident_start) => {
                    let end = (i + 1..chars.len())
                        .find(|&j| !is_ident_char(chars[j]))
                        .unwrap_or(chars.len());
                    let local: String = chars[i + 1..end].iter().collect();
                    let global = wrappers
                        .iter()
                        .rev()
                        .find_map(|w| match w {
                            Wrapper::Global => Some(true),
                            Wrapper::Local => Some(false),
                            Wrapper::Plain => None,
                        })
                        .unwrap_or(bare_global);

                    out.push('.');
                    if global {
                        out.push_str(&local);
                    } else {
                        let generated = tokens
                            .entry(local.clone())
                            .or_insert_with(|| {
                                generate_scoped_name(&self.template, path_in_package, &local)
                            })
                            .clone();
                        out.push_str(&generated);
                        if !classes.contains(&local) {
                            classes.push(local);
                        }
                    }
                    i = end;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        (out, classes)
    }
}

impl SelectorScoper for ClassNameScoper {
    fn scope(&self, input: &ScopeInput) -> Result<ScopedStylesheet, String> {
        let css = input.contents.as_str();
        let bytes = css.as_bytes();
        let mut out = String::with_capacity(css.len());
        let mut tokens = BTreeMap::new();
        let mut compositions = Vec::new();
        let mut stack: Vec<Block> = Vec::new();
        let mut chunk_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = css[i + 2..].find("*/").map_or(bytes.len(), |e| i + 2 + e + 2);
                    continue;
                }
                b'"' | b'\'' => {
                    i = skip_quoted_bytes(bytes, i);
                    continue;
                }
                b'{' => {
                    let prelude = &css[chunk_start..i];
                    if is_at_rule(prelude) {
                        out.push_str(prelude);
                        stack.push(Block::AtRule);
                    } else {
                        let (selector, classes) =
                            self.rewrite_selector(prelude, &input.path_in_package, &mut tokens);
                        out.push_str(&selector);
                        stack.push(Block::Rule(classes));
                    }
                    out.push('{');
                    chunk_start = i + 1;
                }
                delimiter @ (b';' | b'}') => {
                    let declaration = &css[chunk_start..i];
                    let composition = match stack.last() {
                        Some(Block::Rule(classes)) => parse_composes(declaration, classes)
                            .map_err(|message| format!("{} ({})", message, declaration.trim()))?,
                        _ => None,
                    };
                    match composition {
                        Some(composition) => {
                            compositions.push(composition);
                            // Keep line structure for the source map.
                            out.extend(declaration.chars().filter(|&c| c == '\n'));
                            if delimiter == b'}' {
                                out.push('}');
                            }
                        }
                        None => {
                            out.push_str(declaration);
                            out.push(delimiter as char);
                        }
                    }
                    if delimiter == b'}' {
                        stack.pop();
                    }
                    chunk_start = i + 1;
                }
                _ => {}
            }
            i += 1;
        }
        out.push_str(&css[chunk_start.min(css.len())..]);

        let source_map = line_source_map(&input.path_in_package, css, &out);
        Ok(ScopedStylesheet {
            css: out,
            tokens,
            compositions,
            source_map: Some(source_map),
        })
    }
}

/// Parse a `composes` declaration. `Ok(None)` for any other declaration.
fn parse_composes(declaration: &str, classes: &[String]) -> Result<Option<Composition>, String> {
    let Some(caps) = COMPOSES_RE.captures(declaration.trim()) else {
        return Ok(None);
    };
    if classes.is_empty() {
        return Err("composes is only allowed in a rule with a local class selector".to_string());
    }

    let class_names = caps[1].split_whitespace().map(str::to_string).collect();
    let source = if let Some(path) = caps.get(2).or_else(|| caps.get(3)) {
        ComposeSource::File(path.as_str().to_string())
    } else if caps.get(4).is_some() {
        ComposeSource::Global
    } else {
        ComposeSource::Local
    };

    Ok(Some(Composition {
        local_names: classes.to_vec(),
        class_names,
        source,
    }))
}

/// One mapping per generated line, pointing at the same source line.
fn line_source_map(path_in_package: &str, source: &str, generated: &str) -> SourceMap {
    let file = path_in_package
        .rsplit('/')
        .next()
        .unwrap_or(path_in_package)
        .to_string();
    let mappings = (0..generated.split('\n').count())
        .map(|line| if line == 0 { "AAAA" } else { "AACA" })
        .collect::<Vec<_>>()
        .join(";");

    SourceMap {
        version: 3,
        file: file.clone(),
        sources: vec![file],
        sources_content: vec![source.to_string()],
        names: vec![],
        mappings,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNING HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn is_at_rule(prelude: &str) -> bool {
    let mut rest = prelude.trim_start();
    while let Some(after) = rest.strip_prefix("/*") {
        rest = after.find("*/").map_or("", |e| &after[e + 2..]).trim_start();
    }
    rest.starts_with('@')
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

fn starts_with_at(chars: &[char], at: usize, needle: &str) -> bool {
    let mut j = at;
    for n in needle.chars() {
        if chars.get(j) != Some(&n) {
            return false;
        }
        j += 1;
    }
    true
}

fn starts_with_keyword(chars: &[char], at: usize, keyword: &str) -> bool {
    starts_with_at(chars, at, keyword)
        && !chars
            .get(at + keyword.chars().count())
            .copied()
            .is_some_and(is_ident_char)
}

fn skip_whitespace(chars: &[char], mut at: usize) -> usize {
    while chars.get(at).is_some_and(|c| c.is_whitespace()) {
        at += 1;
    }
    at
}

fn find_seq(chars: &[char], from: usize, seq: &[char]) -> Option<usize> {
    (from..chars.len()).find(|&j| chars[j..].starts_with(seq))
}

fn skip_quoted(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    chars.len()
}

fn skip_quoted_bytes(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}
