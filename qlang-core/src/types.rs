//! Value types of QLang and the compatibility lattice used by the checker.
//!
//! The plain scalars (`int`, `float`, `bool`, `string`) each have a
//! `quantum` counterpart carrying runtime uncertainty. On top of those sit
//! two composite kinds: `Superposition`, a weighted union that is
//! compatible with everything, and `Entanglement`, an opaque relation
//! handle.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Type of an expression that failed to check. Already reported.
    Unknown,
    Void,
    Int,
    Float,
    Bool,
    String,
    QuantumInt,
    QuantumFloat,
    QuantumBool,
    QuantumString,
    Superposition,
    Entanglement,
}

impl DataType {
    /// Stable numeric tag, used as an operand of `DECLARE_VAR`.
    pub fn tag(self) -> i32 {
        match self {
            DataType::Unknown => 0,
            DataType::Void => 1,
            DataType::Int => 2,
            DataType::Float => 3,
            DataType::Bool => 4,
            DataType::String => 5,
            DataType::QuantumInt => 6,
            DataType::QuantumFloat => 7,
            DataType::QuantumBool => 8,
            DataType::QuantumString => 9,
            DataType::Superposition => 10,
            DataType::Entanglement => 11,
        }
    }

    /// Returns true for the quantum-tagged scalars.
    pub fn is_quantum(self) -> bool {
        matches!(
            self,
            DataType::QuantumInt
                | DataType::QuantumFloat
                | DataType::QuantumBool
                | DataType::QuantumString
        )
    }

    pub fn is_unknown(self) -> bool {
        self == DataType::Unknown
    }

    /// Int or Float, plain or quantum.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Float | DataType::QuantumInt | DataType::QuantumFloat
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DataType::Int | DataType::QuantumInt)
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float | DataType::QuantumFloat)
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, DataType::Bool | DataType::QuantumBool)
    }

    /// Types that carry quantum state: the quantum scalars and both
    /// composite kinds.
    pub fn is_quantum_state(self) -> bool {
        self.is_quantum() || matches!(self, DataType::Superposition | DataType::Entanglement)
    }

    /// Map a plain scalar to its quantum counterpart.
    pub fn to_quantum(self) -> Option<DataType> {
        match self {
            DataType::Int => Some(DataType::QuantumInt),
            DataType::Float => Some(DataType::QuantumFloat),
            DataType::Bool => Some(DataType::QuantumBool),
            DataType::String => Some(DataType::QuantumString),
            _ => None,
        }
    }

    /// Strip the quantum tag; other types are returned unchanged.
    pub fn to_classical(self) -> DataType {
        match self {
            DataType::QuantumInt => DataType::Int,
            DataType::QuantumFloat => DataType::Float,
            DataType::QuantumBool => DataType::Bool,
            DataType::QuantumString => DataType::String,
            other => other,
        }
    }

    /// Apply the quantum tag when `quantum` is set.
    pub fn with_quantum(self, quantum: bool) -> DataType {
        if quantum {
            self.to_quantum().unwrap_or(self)
        } else {
            self
        }
    }

    /// Resolve a type annotation word.
    pub fn from_name(name: &str) -> Option<DataType> {
        match name {
            "int" => Some(DataType::Int),
            "float" => Some(DataType::Float),
            "bool" => Some(DataType::Bool),
            "string" => Some(DataType::String),
            "void" => Some(DataType::Void),
            "superposition" => Some(DataType::Superposition),
            "entanglement" => Some(DataType::Entanglement),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Unknown => "unknown",
            DataType::Void => "void",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Bool => "bool",
            DataType::String => "string",
            DataType::QuantumInt => "quantum int",
            DataType::QuantumFloat => "quantum float",
            DataType::QuantumBool => "quantum bool",
            DataType::QuantumString => "quantum string",
            DataType::Superposition => "superposition",
            DataType::Entanglement => "entanglement",
        };
        f.write_str(name)
    }
}

/// Check whether values of `left` and `right` may be mixed.
///
/// * identical types are compatible
/// * a plain scalar and its quantum counterpart are compatible, both ways
/// * `Superposition` is compatible with every type
pub fn is_compatible(left: DataType, right: DataType) -> bool {
    if left == right {
        return true;
    }
    if left == DataType::Superposition || right == DataType::Superposition {
        return true;
    }
    (left.is_quantum() || right.is_quantum()) && left.to_classical() == right.to_classical()
}

/// Result type of `+ - * /` over numeric operands.
///
/// Float wins over Int, and the result is quantum if either side is.
pub fn arithmetic_result(left: DataType, right: DataType) -> Option<DataType> {
    if !left.is_numeric() || !right.is_numeric() {
        return None;
    }
    let base = if left.is_float() || right.is_float() {
        DataType::Float
    } else {
        DataType::Int
    };
    Some(base.with_quantum(left.is_quantum() || right.is_quantum()))
}

/// Result type of `& | ^`, restricted to integers.
pub fn bitwise_result(left: DataType, right: DataType) -> Option<DataType> {
    if !left.is_integer() || !right.is_integer() {
        return None;
    }
    Some(DataType::Int.with_quantum(left.is_quantum() || right.is_quantum()))
}

/// Result type of `&& ||`.
pub fn logical_result(left: DataType, right: DataType) -> Option<DataType> {
    if !left.is_boolean() || !right.is_boolean() {
        return None;
    }
    Some(DataType::Bool.with_quantum(left.is_quantum() || right.is_quantum()))
}

/// Result type of a comparison; quantum if either operand is a quantum
/// numeric value.
pub fn comparison_result(left: DataType, right: DataType) -> Option<DataType> {
    if !is_compatible(left, right) {
        return None;
    }
    let quantum_numeric = |t: DataType| t.is_quantum() && t.is_numeric();
    Some(DataType::Bool.with_quantum(quantum_numeric(left) || quantum_numeric(right)))
}
