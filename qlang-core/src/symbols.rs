//! Symbols and lexically nested scopes.
//!
//! Scopes form a stack: the innermost scope is the last element and its
//! parent is the one below it. Lookups walk outward until the name is
//! found or the stack is exhausted. Leaving a scope drops its symbols.

use std::collections::HashMap;

use crate::span::Position;
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Variable type, or the return type for functions.
    pub ty: DataType,
    /// Parameter types in declaration order; empty for variables.
    pub params: Vec<DataType>,
    pub position: Position,
}

impl Symbol {
    pub fn variable(name: impl Into<String>, ty: DataType, position: Position) -> Self {
        Symbol {
            name: name.into(),
            kind: SymbolKind::Variable,
            ty,
            params: Vec::new(),
            position,
        }
    }

    pub fn function(
        name: impl Into<String>,
        params: Vec<DataType>,
        return_type: DataType,
        position: Position,
    ) -> Self {
        Symbol {
            name: name.into(),
            kind: SymbolKind::Function,
            ty: return_type,
            params,
            position,
        }
    }

    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }

    pub fn return_type(&self) -> DataType {
        self.ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Builtins, below the global scope.
    Prelude,
    Global,
    Function,
    Block,
}

/// One name-to-symbol table. Names are unique within a scope; declaration
/// order is preserved for iteration.
#[derive(Debug, Clone)]
pub struct Scope {
    kind: ScopeKind,
    symbols: Vec<Symbol>,
    index: HashMap<String, usize>,
}

impl Scope {
    pub fn new(kind: ScopeKind) -> Self {
        Scope {
            kind,
            symbols: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.index.get(name).map(|&i| &self.symbols[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Insert `symbol`, replacing any symbol of the same name.
    pub fn insert(&mut self, symbol: Symbol) {
        match self.index.get(&symbol.name) {
            Some(&i) => self.symbols[i] = symbol,
            None => {
                self.index.insert(symbol.name.clone(), self.symbols.len());
                self.symbols.push(symbol);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// The stack of currently open scopes.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

impl SymbolTable {
    /// A table holding only an empty global scope.
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::new(ScopeKind::Global)],
        }
    }

    /// A global scope whose parent is the given prelude.
    pub fn with_prelude(prelude: Scope) -> Self {
        SymbolTable {
            scopes: vec![prelude, Scope::new(ScopeKind::Global)],
        }
    }

    pub fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope::new(kind));
    }

    /// Close the innermost scope. The global scope is never popped.
    pub fn pop_scope(&mut self) -> Option<Scope> {
        if self.current().kind() == ScopeKind::Global {
            return None;
        }
        self.scopes.pop()
    }

    pub fn current(&self) -> &Scope {
        self.scopes.last().expect("global scope is never popped")
    }

    pub fn current_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("global scope is never popped")
    }

    /// Declare in the innermost scope.
    pub fn declare(&mut self, symbol: Symbol) {
        self.current_mut().insert(symbol);
    }

    /// Resolve `name`, innermost scope first.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.current().get(name)
    }

    /// Number of open scopes, the prelude included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn global(&self) -> &Scope {
        self.scopes
            .iter()
            .find(|s| s.kind() == ScopeKind::Global)
            .expect("global scope is never popped")
    }

    /// Consume the table, keeping only the global scope.
    pub fn into_global(self) -> Scope {
        self.scopes
            .into_iter()
            .find(|s| s.kind() == ScopeKind::Global)
            .unwrap_or_else(|| Scope::new(ScopeKind::Global))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, ty: DataType) -> Symbol {
        Symbol::variable(name, ty, Position::start())
    }

    #[test]
    fn inner_scope_shadows_and_disappears() {
        let mut table = SymbolTable::new();
        table.declare(var("x", DataType::Int));
        table.push_scope(ScopeKind::Block);
        table.declare(var("x", DataType::Bool));
        assert_eq!(table.lookup("x").map(|s| s.ty), Some(DataType::Bool));
        table.pop_scope();
        assert_eq!(table.lookup("x").map(|s| s.ty), Some(DataType::Int));
    }

    #[test]
    fn global_scope_cannot_be_popped() {
        let mut table = SymbolTable::new();
        assert!(table.pop_scope().is_none());
        assert_eq!(table.depth(), 1);
    }

    #[test]
    fn lookup_falls_through_to_prelude() {
        let mut prelude = Scope::new(ScopeKind::Prelude);
        prelude.insert(Symbol::function("p", vec![DataType::Int], DataType::Void, Position::start()));
        let table = SymbolTable::with_prelude(prelude);
        assert!(table.lookup("p").is_some_and(Symbol::is_function));
        assert!(table.lookup_local("p").is_none());
        assert!(table.global().is_empty());
    }

    #[test]
    fn insert_replaces_and_keeps_order() {
        let mut scope = Scope::new(ScopeKind::Global);
        scope.insert(var("a", DataType::Int));
        scope.insert(var("b", DataType::Int));
        scope.insert(var("a", DataType::Float));
        let names: Vec<_> = scope.iter().map(|s| (s.name.as_str(), s.ty)).collect();
        assert_eq!(names, vec![("a", DataType::Float), ("b", DataType::Int)]);
    }
}
