//! Tree-sitter syntax validators for programming languages.

use tree_sitter::{Language, Node, Parser};

use super::{Diagnostic, Validator};

const SNIPPET_CHARS: usize = 40;

/// Parses content with a tree-sitter grammar and reports the first ERROR or
/// MISSING node.
///
/// A fresh parser is created per call so the validator can be shared across
/// concurrently executing tasks.
pub struct TreeSitterValidator {
    name: &'static str,
    language: Language,
}

impl TreeSitterValidator {
    /// Creates a validator for an arbitrary grammar.
    #[must_use]
    pub fn new(name: &'static str, language: Language) -> Self {
        Self { name, language }
    }

    /// Python.
    #[must_use]
    pub fn python() -> Self {
        Self::new("python", tree_sitter_python::LANGUAGE.into())
    }

    /// JavaScript (including JSX).
    #[must_use]
    pub fn javascript() -> Self {
        Self::new("javascript", tree_sitter_javascript::LANGUAGE.into())
    }

    /// TypeScript.
    #[must_use]
    pub fn typescript() -> Self {
        Self::new("typescript", tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
    }

    /// TSX.
    #[must_use]
    pub fn tsx() -> Self {
        Self::new("tsx", tree_sitter_typescript::LANGUAGE_TSX.into())
    }

    /// Rust.
    #[must_use]
    pub fn rust() -> Self {
        Self::new("rust", tree_sitter_rust::LANGUAGE.into())
    }

    /// Go.
    #[must_use]
    pub fn go() -> Self {
        Self::new("go", tree_sitter_go::LANGUAGE.into())
    }

    /// Java.
    #[must_use]
    pub fn java() -> Self {
        Self::new("java", tree_sitter_java::LANGUAGE.into())
    }
}

/// First ERROR or MISSING node in document order.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    for i in 0..node.child_count() {
        if let Some(found) = node.child(i).and_then(first_error) {
            return Some(found);
        }
    }
    None
}

fn describe(node: Node<'_>, content: &str) -> String {
    if node.is_missing() {
        return format!("missing `{}`", node.kind());
    }
    let text = content.get(node.byte_range()).unwrap_or_default();
    let snippet: String = text
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .chars()
        .take(SNIPPET_CHARS)
        .collect();
    if snippet.is_empty() {
        "syntax error".to_string()
    } else {
        format!("syntax error near `{snippet}`")
    }
}

impl Validator for TreeSitterValidator {
    fn name(&self) -> &str {
        self.name
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| Diagnostic::new(format!("{} grammar unavailable: {e}", self.name)))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| Diagnostic::new(format!("{} parser produced no tree", self.name)))?;

        let root = tree.root_node();
        if !root.has_error() {
            return Ok(());
        }
        match first_error(root) {
            Some(node) => {
                let point = node.start_position();
                Err(Diagnostic::at(
                    describe(node, content),
                    point.row + 1,
                    point.column + 1,
                ))
            }
            None => Err(Diagnostic::new(format!("{} syntax error", self.name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python() {
        let v = TreeSitterValidator::python();
        assert!(v.validate("def add(a, b):\n    return a + b\n").is_ok());
        let err = v.validate("def add(a, b:\n    return a + b\n").unwrap_err();
        assert!(err.line.is_some());
    }

    #[test]
    fn test_javascript_and_typescript() {
        assert!(TreeSitterValidator::javascript()
            .validate("export function add(a, b) { return a + b; }\n")
            .is_ok());
        assert!(TreeSitterValidator::javascript()
            .validate("function add(a, b { return a + b; }\n")
            .is_err());
        assert!(TreeSitterValidator::typescript()
            .validate("const total: number = add(1, 2);\n")
            .is_ok());
        assert!(TreeSitterValidator::tsx()
            .validate("const App = () => <div>hi</div>;\n")
            .is_ok());
    }

    #[test]
    fn test_rust_go_java() {
        assert!(TreeSitterValidator::rust()
            .validate("fn main() { println!(\"hi\"); }\n")
            .is_ok());
        assert!(TreeSitterValidator::rust()
            .validate("fn main() { let x = ; }\n")
            .is_err());
        assert!(TreeSitterValidator::go()
            .validate("package main\n\nfunc main() {}\n")
            .is_ok());
        assert!(TreeSitterValidator::java()
            .validate("class A { void f() { } }\n")
            .is_ok());
        assert!(TreeSitterValidator::java()
            .validate("class A { void f() { }\n")
            .is_err());
    }
}
