//! Declaration extraction using tree-sitter.
//!
//! Produces raw declarations with line ranges; naming, classification and
//! filtering happen in [`super::Chunker`].

use std::collections::BTreeSet;
use std::path::Path;

use tree_sitter::{Language, Node, Parser};

use super::ChunkerError;

/// Syntactic category of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// Function declaration, or an arrow/function expression bound to a variable
    Function,
    Class,
    Interface,
    TypeAlias,
    Enum,
}

/// A top-level declaration found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub decl: DeclKind,
    /// Start line (1-indexed), including any `export` keyword
    pub start_line: usize,
    /// End line (1-indexed)
    pub end_line: usize,
    pub content: String,
    pub exported: bool,
    /// Whether the body contains JSX
    pub renders_jsx: bool,
    /// Names of functions called in the body
    pub calls: BTreeSet<String>,
}

/// Source of declarations for a file.
pub trait SymbolExtractor: Send {
    fn extract(&mut self, file_path: &str, source: &str) -> Result<Vec<Declaration>, ChunkerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Dialect {
    fn detect(file_path: &str) -> Option<Self> {
        match Path::new(file_path).extension()?.to_str()? {
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            _ => None,
        }
    }
}

/// Tree-sitter based extractor for TypeScript, TSX and JavaScript.
pub struct TreeSitterExtractor {
    typescript: Parser,
    tsx: Parser,
    javascript: Parser,
    include_private: bool,
}

impl TreeSitterExtractor {
    /// Create an extractor.
    ///
    /// With `include_private` unset only exported declarations are returned.
    pub fn new(include_private: bool) -> Result<Self, ChunkerError> {
        Ok(Self {
            typescript: parser_for(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())?,
            tsx: parser_for(tree_sitter_typescript::LANGUAGE_TSX.into())?,
            javascript: parser_for(tree_sitter_javascript::LANGUAGE.into())?,
            include_private,
        })
    }

    /// Whether the file extension is one this extractor parses.
    pub fn supports(file_path: &str) -> bool {
        Dialect::detect(file_path).is_some()
    }

    fn parser(&mut self, dialect: Dialect) -> &mut Parser {
        match dialect {
            Dialect::TypeScript => &mut self.typescript,
            Dialect::Tsx => &mut self.tsx,
            Dialect::JavaScript => &mut self.javascript,
        }
    }
}

fn parser_for(language: Language) -> Result<Parser, ChunkerError> {
    let mut parser = Parser::new();
    parser.set_language(&language)?;
    Ok(parser)
}

impl SymbolExtractor for TreeSitterExtractor {
    fn extract(&mut self, file_path: &str, source: &str) -> Result<Vec<Declaration>, ChunkerError> {
        let dialect = Dialect::detect(file_path)
            .ok_or_else(|| ChunkerError::UnsupportedLanguage(file_path.to_string()))?;

        let include_private = self.include_private;
        let tree = self
            .parser(dialect)
            .parse(source, None)
            .ok_or_else(|| ChunkerError::Parse(file_path.to_string()))?;

        let mut declarations = Vec::new();
        collect_declarations(tree.root_node(), source, include_private, &mut declarations);
        Ok(declarations)
    }
}

fn collect_declarations(
    node: Node,
    source: &str,
    include_private: bool,
    out: &mut Vec<Declaration>,
) {
    if let Some(decl) = node_to_declaration(node, source) {
        if decl.exported || include_private {
            out.push(decl);
        }
    }

    for child in node.children(&mut node.walk()) {
        collect_declarations(child, source, include_private, out);
    }
}

fn node_to_declaration(node: Node, source: &str) -> Option<Declaration> {
    let (decl, name, body, statement) = match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            (DeclKind::Function, field_text(node, "name", source)?, Some(node), node)
        }
        "class_declaration" | "abstract_class_declaration" => {
            (DeclKind::Class, field_text(node, "name", source)?, None, node)
        }
        "interface_declaration" => {
            (DeclKind::Interface, field_text(node, "name", source)?, None, node)
        }
        "type_alias_declaration" => {
            (DeclKind::TypeAlias, field_text(node, "name", source)?, None, node)
        }
        "enum_declaration" => (DeclKind::Enum, field_text(node, "name", source)?, None, node),
        "variable_declarator" => {
            let name_node = node.child_by_field_name("name")?;
            if name_node.kind() != "identifier" {
                return None;
            }
            let function = bound_function(node.child_by_field_name("value")?)?;
            let statement = node.parent().filter(|p| {
                matches!(p.kind(), "lexical_declaration" | "variable_declaration")
            })?;
            (
                DeclKind::Function,
                source[name_node.byte_range()].to_string(),
                Some(function),
                statement,
            )
        }
        _ => return None,
    };

    let exported = statement
        .parent()
        .map(|p| p.kind() == "export_statement")
        .unwrap_or(false);
    let target = if exported {
        statement.parent().unwrap_or(statement)
    } else {
        statement
    };

    let (renders_jsx, calls) = match body {
        Some(body) => scan_body(body, source),
        None => (false, BTreeSet::new()),
    };

    Some(Declaration {
        name,
        decl,
        start_line: target.start_position().row + 1,
        end_line: target.end_position().row + 1,
        content: source[target.byte_range()].to_string(),
        exported,
        renders_jsx,
        calls,
    })
}

/// The function a variable is bound to: a plain arrow/function expression,
/// or one wrapped in a call such as `memo(...)` or `forwardRef(...)`.
fn bound_function(value: Node) -> Option<Node> {
    if is_function_expression(value) {
        return Some(value);
    }

    if value.kind() == "call_expression" {
        let args = value.child_by_field_name("arguments")?;
        for arg in args.children(&mut args.walk()) {
            if is_function_expression(arg) {
                return Some(arg);
            }
        }
    }

    None
}

fn is_function_expression(node: Node) -> bool {
    matches!(node.kind(), "arrow_function" | "function_expression" | "function")
}

fn field_text(node: Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| source[n.byte_range()].to_string())
}

/// Walk a function body for JSX and called function names.
fn scan_body(node: Node, source: &str) -> (bool, BTreeSet<String>) {
    let mut renders_jsx = false;
    let mut calls = BTreeSet::new();
    scan_node(node, source, &mut renders_jsx, &mut calls);
    (renders_jsx, calls)
}

fn scan_node(node: Node, source: &str, renders_jsx: &mut bool, calls: &mut BTreeSet<String>) {
    match node.kind() {
        "jsx_element" | "jsx_self_closing_element" | "jsx_fragment" => *renders_jsx = true,
        "call_expression" => {
            if let Some(callee) = node.child_by_field_name("function") {
                let name = match callee.kind() {
                    "identifier" => Some(callee),
                    "member_expression" => callee.child_by_field_name("property"),
                    _ => None,
                };
                if let Some(name) = name {
                    calls.insert(source[name.byte_range()].to_string());
                }
            }
        }
        _ => {}
    }

    for child in node.children(&mut node.walk()) {
        scan_node(child, source, renders_jsx, calls);
    }
}
