//! Arena-allocated abstract syntax tree.
//!
//! All nodes of one translation unit live in a single [`Ast`] and refer to
//! each other through [`NodeId`] handles. Children are listed inside the
//! parent's [`NodeKind`]; the `parent` field is a non-owning back link that
//! the arena fills in exactly once, when the parent is allocated. Dropping
//! the arena drops every node at once.

use std::fmt::{self, Write as _};

use crate::span::Position;
use crate::types::DataType;

/// Opaque handle of a node inside an [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn data_type(&self) -> DataType {
        match self {
            Literal::Int(_) => DataType::Int,
            Literal::Float(_) => DataType::Float,
            Literal::String(_) => DataType::String,
            Literal::Bool(_) => DataType::Bool,
            Literal::Null => DataType::Void,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("null"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Assign,
    Or,
    And,
    /// `a ~ b`: builds an entanglement relation between two values.
    Entangle,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Member,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Assign => "=",
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Entangle => "~",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Member => ".",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    /// `quantum e`: promote a plain scalar to its quantum counterpart.
    Quantum,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::Quantum => "quantum",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One `value : weight` branch of a superposition literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    pub value: NodeId,
    pub weight: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: DataType,
    pub position: Position,
}

/// A `name: expr` entry in an `entangle` statement's property list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Program {
        statements: Vec<NodeId>,
    },

    // Expressions
    Literal(Literal),
    Identifier(String),
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Superposition {
        branches: Vec<Branch>,
    },

    // Statements
    Block {
        statements: Vec<NodeId>,
    },
    VarDecl {
        name: String,
        annotation: Option<DataType>,
        init: Option<NodeId>,
    },
    FunctionDecl {
        name: String,
        params: Vec<Param>,
        return_type: DataType,
        body: NodeId,
    },
    Import {
        path: String,
    },
    Export {
        declaration: NodeId,
    },
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        condition: NodeId,
        body: NodeId,
    },
    For {
        init: Option<NodeId>,
        condition: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    ExprStmt {
        expr: NodeId,
    },
    Entangle {
        entities: Vec<NodeId>,
        properties: Vec<Property>,
    },
    Measure {
        operand: NodeId,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Program { .. } => "Program",
            NodeKind::Literal(_) => "Literal",
            NodeKind::Identifier(_) => "Identifier",
            NodeKind::Binary { .. } => "BinaryExpr",
            NodeKind::Unary { .. } => "UnaryExpr",
            NodeKind::Call { .. } => "CallExpr",
            NodeKind::Superposition { .. } => "Superposition",
            NodeKind::Block { .. } => "Block",
            NodeKind::VarDecl { .. } => "VarDecl",
            NodeKind::FunctionDecl { .. } => "FunctionDecl",
            NodeKind::Import { .. } => "Import",
            NodeKind::Export { .. } => "Export",
            NodeKind::If { .. } => "If",
            NodeKind::While { .. } => "While",
            NodeKind::For { .. } => "For",
            NodeKind::Return { .. } => "Return",
            NodeKind::ExprStmt { .. } => "ExprStmt",
            NodeKind::Entangle { .. } => "EntangleStmt",
            NodeKind::Measure { .. } => "MeasureStmt",
        }
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Literal(_) | NodeKind::Identifier(_) | NodeKind::Import { .. } => Vec::new(),
            NodeKind::Program { statements } | NodeKind::Block { statements } => statements.clone(),
            NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Unary { operand, .. } | NodeKind::Measure { operand } => vec![*operand],
            NodeKind::Call { callee, args } => {
                let mut children = Vec::with_capacity(args.len() + 1);
                children.push(*callee);
                children.extend(args.iter().copied());
                children
            }
            NodeKind::Superposition { branches } => branches
                .iter()
                .flat_map(|b| [b.value, b.weight])
                .collect(),
            NodeKind::VarDecl { init, .. } => init.iter().copied().collect(),
            NodeKind::FunctionDecl { body, .. } => vec![*body],
            NodeKind::Export { declaration } => vec![*declaration],
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut children = vec![*condition, *then_branch];
                children.extend(else_branch.iter().copied());
                children
            }
            NodeKind::While { condition, body } => vec![*condition, *body],
            NodeKind::For {
                init,
                condition,
                step,
                body,
            } => init
                .iter()
                .chain(condition.iter())
                .chain(step.iter())
                .copied()
                .chain(std::iter::once(*body))
                .collect(),
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::ExprStmt { expr } => vec![*expr],
            NodeKind::Entangle {
                entities,
                properties,
            } => entities
                .iter()
                .copied()
                .chain(properties.iter().map(|p| p.value))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub position: Position,
    pub parent: Option<NodeId>,
}

/// Owner of every node of one translation unit.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    /// Allocate a node and link each of its children back to it.
    ///
    /// Panics if a child already has a parent: a node has exactly one
    /// owner.
    pub fn alloc(&mut self, kind: NodeKind, position: Position) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for child in kind.children() {
            let slot = &mut self.nodes[child.index()].parent;
            assert!(slot.is_none(), "AST node {child:?} attached twice");
            *slot = Some(id);
        }
        self.nodes.push(Node {
            kind,
            position,
            parent: None,
        });
        id
    }

    /// Try to reserve room for `additional` nodes without aborting on
    /// allocation failure.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), std::collections::TryReserveError> {
        self.nodes.try_reserve(additional)
    }

    /// Current allocation watermark, for use with [`Ast::release_to`].
    pub fn mark(&self) -> usize {
        self.nodes.len()
    }

    /// Release every node allocated since `mark`.
    ///
    /// Used when a parse routine fails: the partial subtree it built is
    /// dropped and older nodes that had been adopted by it become
    /// parentless again.
    pub fn release_to(&mut self, mark: usize) {
        if mark >= self.nodes.len() {
            return;
        }
        self.nodes.truncate(mark);
        for node in &mut self.nodes {
            if node.parent.is_some_and(|p| p.index() >= mark) {
                node.parent = None;
            }
        }
        if self.root.is_some_and(|r| r.index() >= mark) {
            self.root = None;
        }
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn position(&self, id: NodeId) -> Position {
        self.nodes[id.index()].position
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.kind(id).children()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk parent links upward, nearest ancestor first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), |&n| self.parent(n))
    }

    /// The function declaration whose body contains `id`, if any.
    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&n| matches!(self.kind(n), NodeKind::FunctionDecl { .. }))
    }

    /// Every node reachable from `id`, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            let children = self.children(next);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Render a subtree as an S-expression, e.g. `(+ 1 (* 2 3))`.
    pub fn to_sexpr(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_sexpr(id, &mut out);
        out
    }

    fn write_sexpr(&self, id: NodeId, out: &mut String) {
        let list = |out: &mut String, head: &str, items: &[NodeId]| {
            out.push('(');
            out.push_str(head);
            for item in items {
                out.push(' ');
                self.write_sexpr(*item, out);
            }
            out.push(')');
        };

        match self.kind(id) {
            NodeKind::Literal(lit) => {
                let _ = write!(out, "{lit}");
            }
            NodeKind::Identifier(name) => out.push_str(name),
            NodeKind::Binary { op, left, right } => list(out, op.symbol(), &[*left, *right]),
            NodeKind::Unary { op, operand } => list(out, op.symbol(), &[*operand]),
            NodeKind::Call { callee, args } => {
                let mut items = vec![*callee];
                items.extend(args.iter().copied());
                list(out, "call", &items)
            }
            NodeKind::Superposition { branches } => {
                out.push_str("(superposition");
                for branch in branches {
                    out.push_str(" (");
                    self.write_sexpr(branch.value, out);
                    out.push_str(" : ");
                    self.write_sexpr(branch.weight, out);
                    out.push(')');
                }
                out.push(')');
            }
            NodeKind::Program { statements } => list(out, "program", statements),
            NodeKind::Block { statements } => list(out, "block", statements),
            NodeKind::VarDecl {
                name,
                annotation,
                init,
            } => {
                let head = match annotation {
                    Some(ty) => format!("let {name}: {ty}"),
                    None => format!("let {name}"),
                };
                list(out, &head, &init.iter().copied().collect::<Vec<_>>())
            }
            NodeKind::FunctionDecl {
                name,
                params,
                return_type,
                body,
            } => {
                let params = params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.ty))
                    .collect::<Vec<_>>()
                    .join(", ");
                list(out, &format!("function {name}({params}): {return_type}"), &[*body])
            }
            NodeKind::Import { path } => {
                let _ = write!(out, "(import {path:?})");
            }
            NodeKind::Export { declaration } => list(out, "export", &[*declaration]),
            NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::For { .. }
            | NodeKind::Return { .. }
            | NodeKind::ExprStmt { .. }
            | NodeKind::Measure { .. } => {
                let head = match self.kind(id) {
                    NodeKind::If { .. } => "if",
                    NodeKind::While { .. } => "while",
                    NodeKind::For { .. } => "for",
                    NodeKind::Return { .. } => "return",
                    NodeKind::Measure { .. } => "measure",
                    _ => "expr",
                };
                list(out, head, &self.children(id))
            }
            NodeKind::Entangle {
                entities,
                properties,
            } => {
                out.push_str("(entangle");
                for entity in entities {
                    out.push(' ');
                    self.write_sexpr(*entity, out);
                }
                for property in properties {
                    let _ = write!(out, " ({}: ", property.name);
                    self.write_sexpr(property.value, out);
                    out.push(')');
                }
                out.push(')');
            }
        }
    }
}
