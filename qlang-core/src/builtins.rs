//! Built-in functions visible to every QLang program.
//!
//! Builtins live in a prelude scope below the global scope, so user code
//! may shadow them. The code generator reserves the first variable slots
//! for them, in table order; the VM binds those slots to host functions.

use crate::span::Position;
use crate::symbols::{Scope, ScopeKind, Symbol};
use crate::types::DataType;

/// Metadata about a single builtin symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    pub name: &'static str,
    pub params: &'static [DataType],
    pub result: DataType,
}

/// The complete list of builtins known to the core.
pub const BUILTINS: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        name: "print_int",
        params: &[DataType::Int],
        result: DataType::Void,
    },
    BuiltinDescriptor {
        name: "print_float",
        params: &[DataType::Float],
        result: DataType::Void,
    },
    BuiltinDescriptor {
        name: "print_bool",
        params: &[DataType::Bool],
        result: DataType::Void,
    },
    BuiltinDescriptor {
        name: "print_string",
        params: &[DataType::String],
        result: DataType::Void,
    },
    BuiltinDescriptor {
        name: "sqrt",
        params: &[DataType::Float],
        result: DataType::Float,
    },
];

/// Look up a builtin and its slot index by name.
pub fn find_builtin(name: &str) -> Option<(usize, &'static BuiltinDescriptor)> {
    BUILTINS.iter().enumerate().find(|(_, b)| b.name == name)
}

/// A prelude scope declaring every builtin as a function symbol.
pub fn prelude_scope() -> Scope {
    let mut scope = Scope::new(ScopeKind::Prelude);
    for builtin in BUILTINS {
        scope.insert(Symbol::function(
            builtin.name,
            builtin.params.to_vec(),
            builtin.result,
            Position::start(),
        ));
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_declares_every_builtin() {
        let scope = prelude_scope();
        assert_eq!(scope.len(), BUILTINS.len());
        let sqrt = scope.get("sqrt").expect("sqrt declared");
        assert!(sqrt.is_function());
        assert_eq!(sqrt.params, vec![DataType::Float]);
        assert_eq!(sqrt.return_type(), DataType::Float);
    }

    #[test]
    fn finds_builtin_slot() {
        assert_eq!(find_builtin("print_bool").map(|(slot, _)| slot), Some(2));
        assert!(find_builtin("missing").is_none());
    }
}
