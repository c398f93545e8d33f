// scope.rs — Scoped symbol tables and scope context
//
// A stack of named scopes with chained lookup. The root scope is seeded
// by the caller (builtins for the main table, cal builtins for the
// calibration table).

use std::collections::BTreeMap;

use crate::diag::{Error, ErrorKind, Result};
use crate::symbols::Symbol;

/// Which lexical region the analyzer is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeContext {
    Global,
    Local,
    Subroutine,
    Defcal,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub name: String,
    symbols: BTreeMap<String, Symbol>,
}

impl Scope {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScopedSymbolTable {
    scopes: Vec<Scope>,
}

impl ScopedSymbolTable {
    /// New table with a root scope holding the given seed symbols.
    pub fn new(root_name: impl Into<String>, seed: Vec<Symbol>) -> Self {
        let mut root = Scope::new(root_name);
        for symbol in seed {
            root.symbols.insert(symbol.name().to_string(), symbol);
        }
        Self { scopes: vec![root] }
    }

    pub fn push_scope(&mut self, name: impl Into<String>) {
        self.scopes.push(Scope::new(name));
    }

    pub fn pop_scope(&mut self) {
        // The root scope is never popped.
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn current_scope_name(&self) -> &str {
        &self.scopes[self.scopes.len() - 1].name
    }

    /// Insert into the current scope; redeclaration in the same scope is
    /// an error.
    pub fn insert(&mut self, symbol: Symbol) -> Result<()> {
        let scope = self.scopes.last_mut().expect("root scope always present");
        let name = symbol.name().to_string();
        if scope.symbols.contains_key(&name) {
            return Err(Error::new(
                ErrorKind::DuplicateIdentifier,
                format!("'{}' already declared in scope '{}'", name, scope.name),
            ));
        }
        scope.symbols.insert(name, symbol);
        Ok(())
    }

    /// Chained lookup from the innermost scope outwards.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }

    /// Lookup restricted to the current scope.
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .last()
            .and_then(|scope| scope.symbols.get(name))
    }

    /// All visible names, innermost first, deduplicated along the chain.
    pub fn keys(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for scope in self.scopes.iter().rev() {
            for name in scope.symbols.keys() {
                if seen.insert(name.clone()) {
                    out.push(name.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::builtin_symbols;

    fn classical(name: &str) -> Symbol {
        Symbol::Classical {
            name: name.to_string(),
            ty: "INT".to_string(),
        }
    }

    #[test]
    fn chained_lookup_finds_outer_symbols() {
        let mut table = ScopedSymbolTable::new("global", builtin_symbols());
        table.insert(classical("n")).unwrap();
        table.push_scope("subroutine");
        assert!(table.lookup("n").is_some());
        assert!(table.lookup_local("n").is_none());
    }

    #[test]
    fn duplicate_in_same_scope_rejected() {
        let mut table = ScopedSymbolTable::new("global", vec![]);
        table.insert(classical("x")).unwrap();
        let err = table.insert(classical("x")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateIdentifier);
    }

    #[test]
    fn shadowing_in_inner_scope_allowed() {
        let mut table = ScopedSymbolTable::new("global", vec![]);
        table.insert(classical("x")).unwrap();
        table.push_scope("inner");
        table.insert(classical("x")).unwrap();
        table.pop_scope();
        assert!(table.lookup("x").is_some());
    }

    #[test]
    fn keys_are_deduplicated() {
        let mut table = ScopedSymbolTable::new("global", vec![]);
        table.insert(classical("x")).unwrap();
        table.push_scope("inner");
        table.insert(classical("x")).unwrap();
        table.insert(classical("y")).unwrap();
        let keys = table.keys();
        assert_eq!(keys.iter().filter(|k| k.as_str() == "x").count(), 1);
        assert!(keys.contains(&"y".to_string()));
    }

    #[test]
    fn root_scope_survives_pop() {
        let mut table = ScopedSymbolTable::new("global", builtin_symbols());
        table.pop_scope();
        assert_eq!(table.depth(), 1);
        assert!(table.lookup("INT").is_some());
    }
}
