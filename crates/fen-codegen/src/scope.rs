//! Lexically nested symbol table mapping names to stack regions.
//!
//! A child scope borrows its parent, so scopes live exactly as long as the
//! lowering of the construct that opened them.

use std::collections::HashMap;

use fen_types::Span;

use crate::error::{CodegenError, CodegenResult};
use crate::layout::SourceStackRange;

#[derive(Debug, Default)]
pub struct ScopeVariables<'p> {
    parent: Option<&'p ScopeVariables<'p>>,
    variables: HashMap<String, SourceStackRange>,
}

impl<'p> ScopeVariables<'p> {
    pub fn new() -> Self {
        Self {
            parent: None,
            variables: HashMap::new(),
        }
    }

    pub fn make_child(&'p self) -> ScopeVariables<'p> {
        ScopeVariables {
            parent: Some(self),
            variables: HashMap::new(),
        }
    }

    /// Bind `name` in this scope. Shadowing an outer binding is allowed.
    pub fn define(&mut self, name: &str, range: SourceStackRange, span: Span) -> CodegenResult<()> {
        if self.variables.contains_key(name) {
            return Err(CodegenError::VariableRedefined {
                name: name.to_string(),
                span,
            });
        }
        self.variables.insert(name.to_string(), range);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<SourceStackRange> {
        match self.variables.get(name) {
            Some(range) => Some(*range),
            None => self.parent.and_then(|p| p.find(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StackSize;

    fn range(pos: u32) -> SourceStackRange {
        SourceStackRange::new(pos, StackSize::new(4).unwrap())
    }

    #[test]
    fn test_find_walks_parents() {
        let mut root = ScopeVariables::new();
        root.define("x", range(0), Span::synthetic()).unwrap();
        let mut child = root.make_child();
        child.define("y", range(4), Span::synthetic()).unwrap();
        assert_eq!(child.find("x"), Some(range(0)));
        assert_eq!(child.find("y"), Some(range(4)));
        assert_eq!(root.find("y"), None);
    }

    #[test]
    fn test_child_may_shadow() {
        let mut root = ScopeVariables::new();
        root.define("x", range(0), Span::synthetic()).unwrap();
        let mut child = root.make_child();
        child.define("x", range(8), Span::synthetic()).unwrap();
        assert_eq!(child.find("x"), Some(range(8)));
    }

    #[test]
    fn test_redefinition_in_same_scope_fails() {
        let mut root = ScopeVariables::new();
        root.define("x", range(0), Span::synthetic()).unwrap();
        let err = root.define("x", range(4), Span::point(3, 1)).unwrap_err();
        assert!(matches!(err, CodegenError::VariableRedefined { ref name, .. } if name == "x"));
    }
}
