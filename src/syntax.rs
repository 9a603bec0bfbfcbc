use tree_sitter::{Parser, Tree};

use crate::Language;

/// Parses candidate files for one language.
pub struct SyntaxChecker {
    parser: Parser,
}

impl SyntaxChecker {
    pub fn new(language: Language) -> Option<Self> {
        let mut parser = Parser::new();
        parser.set_language(&language.grammar()).ok()?;
        Some(Self { parser })
    }

    pub fn parse(&mut self, source: &str) -> Option<Tree> {
        self.parser.parse(source, None)
    }

    /// True when `source` parses without ERROR or MISSING nodes.
    pub fn is_valid(&mut self, source: &str) -> bool {
        self.parse(source)
            .map(|tree| !tree.root_node().has_error())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_javascript() {
        let mut checker = SyntaxChecker::new(Language::JavaScript).unwrap();
        assert!(checker.is_valid("if (a <= b) { foo(x); }\n"));
    }

    #[test]
    fn rejects_unbalanced_javascript() {
        let mut checker = SyntaxChecker::new(Language::JavaScript).unwrap();
        assert!(!checker.is_valid("if (a <= ) { foo(x; }\n"));
    }

    #[test]
    fn checks_typescript_and_python() {
        let mut ts = SyntaxChecker::new(Language::TypeScript).unwrap();
        assert!(ts.is_valid("const n: number = f(1);\n"));
        let mut py = SyntaxChecker::new(Language::Python).unwrap();
        assert!(!py.is_valid("if x >:\n    pass\n"));
    }
}
