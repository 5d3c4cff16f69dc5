//! Script emission for companion modules.
//!
//! The generated companion module is plain ES module source. Before it is
//! handed to the host it goes through a [`ScriptEmitter`], which validates it
//! and prints it in canonical form.

use oxc_allocator::Allocator;
use oxc_ast::ast::Statement;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::SourceType;

pub trait ScriptEmitter {
    /// Compile module source into the script handed to the host.
    fn compile(&self, source: &str) -> Result<String, String>;
}

/// Parses with oxc and prints the program back out.
#[derive(Debug, Default, Clone, Copy)]
pub struct OxcScriptEmitter;

impl ScriptEmitter for OxcScriptEmitter {
    fn compile(&self, source: &str) -> Result<String, String> {
        let allocator = Allocator::default();
        let source_type = SourceType::default().with_module(true);
        let ret = Parser::new(&allocator, source, source_type).parse();

        if !ret.errors.is_empty() {
            let messages: Vec<String> = ret.errors.iter().map(|e| e.to_string()).collect();
            return Err(messages.join("; "));
        }

        Ok(Codegen::new().build(&ret.program).code)
    }
}

/// Module specifiers of every `import` declaration, in source order.
/// Unparseable input yields no imports.
pub fn declared_imports(script: &str) -> Vec<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, script, source_type).parse();
    if !ret.errors.is_empty() {
        return Vec::new();
    }

    ret.program
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ImportDeclaration(decl) => Some(decl.source.value.to_string()),
            _ => None,
        })
        .collect()
}
