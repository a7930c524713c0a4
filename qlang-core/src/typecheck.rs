//! Scope and type checking for QLang.
//!
//! The analyzer walks a parsed `Program`, maintains the stack of lexical
//! scopes, infers expression types and checks them against the
//! compatibility lattice in [`crate::types`]. Every failed check appends a
//! diagnostic and the walk continues, so one run reports every
//! independently detectable problem.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Ast, BinaryOp, NodeId, NodeKind, UnaryOp};
use crate::builtins::prelude_scope;
use crate::diagnostic::{Diagnostic, codes};
use crate::symbols::{Scope, ScopeKind, Symbol, SymbolKind, SymbolTable};
use crate::types::{
    DataType, arithmetic_result, bitwise_result, comparison_result, is_compatible, logical_result,
};

/// Deepest allowed nesting of `~` relation expressions.
pub const DEFAULT_MAX_ENTANGLEMENT_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerOptions {
    pub max_entanglement_depth: usize,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        AnalyzerOptions {
            max_entanglement_depth: DEFAULT_MAX_ENTANGLEMENT_DEPTH,
        }
    }
}

/// Result of analyzing one program.
#[derive(Debug)]
pub struct Analysis {
    /// Symbols declared at top level.
    pub globals: Scope,
    pub diagnostics: Vec<Diagnostic>,
    /// Whether any `quantum` promotion was seen.
    pub uses_quantum: bool,
}

impl Analysis {
    /// True when no diagnostics were reported.
    pub fn is_sound(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Analyze a program with default options.
pub fn analyze(ast: &Ast, root: NodeId) -> Analysis {
    analyze_with(ast, root, AnalyzerOptions::default())
}

pub fn analyze_with(ast: &Ast, root: NodeId, options: AnalyzerOptions) -> Analysis {
    let mut analyzer = Analyzer {
        ast,
        options,
        symbols: SymbolTable::with_prelude(prelude_scope()),
        diagnostics: Vec::new(),
        hoisted: HashMap::new(),
        entanglement_depth: 0,
        in_quantum_context: false,
    };
    analyzer.analyze_statement(root);
    debug!(
        diagnostics = analyzer.diagnostics.len(),
        globals = analyzer.symbols.global().len(),
        "semantic analysis finished"
    );
    Analysis {
        globals: analyzer.symbols.into_global(),
        diagnostics: analyzer.diagnostics,
        uses_quantum: analyzer.in_quantum_context,
    }
}

struct Analyzer<'a> {
    ast: &'a Ast,
    options: AnalyzerOptions,
    symbols: SymbolTable,
    diagnostics: Vec<Diagnostic>,
    /// Top-level functions, callable before their declaration is reached.
    hoisted: HashMap<String, Symbol>,
    entanglement_depth: usize,
    in_quantum_context: bool,
}

impl<'a> Analyzer<'a> {
    fn report(&mut self, node: NodeId, code: &'static str, message: String) {
        let position = self.ast.position(node);
        self.diagnostics
            .push(Diagnostic::error(message, position).with_code(code));
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn analyze_statement(&mut self, id: NodeId) {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::Program { statements } => {
                for &statement in statements {
                    self.hoist_function(statement);
                }
                for &statement in statements {
                    self.analyze_statement(statement);
                }
            }
            NodeKind::VarDecl {
                name,
                annotation,
                init,
            } => self.analyze_var_decl(id, name, *annotation, *init),
            NodeKind::FunctionDecl { .. } => self.analyze_function(id),
            NodeKind::Block { statements } => {
                self.symbols.push_scope(ScopeKind::Block);
                for &statement in statements {
                    self.analyze_statement(statement);
                }
                self.symbols.pop_scope();
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expect_condition(*condition, "if");
                self.analyze_statement(*then_branch);
                if let Some(else_branch) = else_branch {
                    self.analyze_statement(*else_branch);
                }
            }
            NodeKind::While { condition, body } => {
                self.expect_condition(*condition, "while");
                self.analyze_statement(*body);
            }
            NodeKind::For {
                init,
                condition,
                step,
                body,
            } => {
                self.symbols.push_scope(ScopeKind::Block);
                if let Some(init) = init {
                    self.analyze_statement(*init);
                }
                if let Some(condition) = condition {
                    self.expect_condition(*condition, "for");
                }
                if let Some(step) = step {
                    self.analyze_expression(*step);
                }
                self.analyze_statement(*body);
                self.symbols.pop_scope();
            }
            NodeKind::Return { value } => self.analyze_return(id, *value),
            NodeKind::ExprStmt { expr } => {
                self.analyze_expression(*expr);
            }
            NodeKind::Measure { operand } => {
                let ty = self.analyze_expression(*operand);
                if !ty.is_unknown() && !ty.is_quantum_state() {
                    self.report(
                        *operand,
                        codes::INVALID_OPERAND,
                        format!("cannot measure a value of classical type {ty}"),
                    );
                }
            }
            NodeKind::Entangle {
                entities,
                properties,
            } => {
                for &entity in entities {
                    let ty = self.analyze_expression(entity);
                    if !ty.is_unknown() && !ty.is_quantum() && ty != DataType::Superposition {
                        self.report(
                            entity,
                            codes::INVALID_OPERAND,
                            format!("cannot entangle a value of type {ty}"),
                        );
                    }
                }
                for property in properties {
                    self.analyze_expression(property.value);
                }
            }
            NodeKind::Import { path } => {
                debug!(path = %path, "import has no semantic effect");
            }
            NodeKind::Export { declaration } => self.analyze_statement(*declaration),
            _ => {
                self.analyze_expression(id);
            }
        }
    }

    /// Record the signature of a top-level function so calls that precede
    /// it resolve. The first declaration of a name wins.
    fn hoist_function(&mut self, id: NodeId) {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::FunctionDecl {
                name,
                params,
                return_type,
                ..
            } => {
                let params: Vec<DataType> = params.iter().map(|p| p.ty).collect();
                self.hoisted.entry(name.clone()).or_insert_with(|| {
                    Symbol::function(name.as_str(), params, *return_type, ast.position(id))
                });
            }
            NodeKind::Export { declaration } => self.hoist_function(*declaration),
            _ => {}
        }
    }

    fn analyze_var_decl(
        &mut self,
        id: NodeId,
        name: &str,
        annotation: Option<DataType>,
        init: Option<NodeId>,
    ) {
        if self.symbols.lookup_local(name).is_some() {
            self.report(
                id,
                codes::DUPLICATE_DECLARATION,
                format!("'{name}' is already declared in this scope"),
            );
        }

        let init_ty = init.map(|init| self.analyze_expression(init));
        let ty = match (annotation, init_ty) {
            (Some(declared), Some(actual)) => {
                if !actual.is_unknown() && !is_compatible(declared, actual) {
                    self.report(
                        id,
                        codes::TYPE_MISMATCH,
                        format!("cannot initialize '{name}' of type {declared} with a value of type {actual}"),
                    );
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some(actual)) => actual,
            (None, None) => {
                self.report(
                    id,
                    codes::MISSING_TYPE,
                    format!("'{name}' needs a type annotation or an initializer"),
                );
                DataType::Unknown
            }
        };

        self.symbols
            .declare(Symbol::variable(name, ty, self.ast.position(id)));
    }

    fn analyze_function(&mut self, id: NodeId) {
        let ast = self.ast;
        let NodeKind::FunctionDecl {
            name,
            params,
            return_type,
            body,
        } = ast.kind(id)
        else {
            return;
        };

        if self.symbols.lookup_local(name).is_some() {
            self.report(
                id,
                codes::DUPLICATE_DECLARATION,
                format!("'{name}' is already declared in this scope"),
            );
        }
        let param_types = params.iter().map(|p| p.ty).collect();
        self.symbols.declare(Symbol::function(
            name.as_str(),
            param_types,
            *return_type,
            ast.position(id),
        ));

        self.symbols.push_scope(ScopeKind::Function);
        for param in params {
            if self.symbols.lookup_local(&param.name).is_some() {
                self.report(
                    id,
                    codes::DUPLICATE_DECLARATION,
                    format!("parameter '{}' is declared twice", param.name),
                );
            }
            self.symbols
                .declare(Symbol::variable(param.name.as_str(), param.ty, param.position));
        }
        // The body block shares the parameter scope.
        match ast.kind(*body) {
            NodeKind::Block { statements } => {
                for &statement in statements {
                    self.analyze_statement(statement);
                }
            }
            _ => self.analyze_statement(*body),
        }
        self.symbols.pop_scope();
    }

    fn analyze_return(&mut self, id: NodeId, value: Option<NodeId>) {
        let ast = self.ast;
        let value_ty = value.map(|v| self.analyze_expression(v));

        let Some(function) = ast.enclosing_function(id) else {
            self.report(
                id,
                codes::RETURN_OUTSIDE_FUNCTION,
                "'return' used outside of a function".to_string(),
            );
            return;
        };
        let NodeKind::FunctionDecl {
            name, return_type, ..
        } = ast.kind(function)
        else {
            return;
        };
        let expected = *return_type;

        match value_ty {
            Some(actual) if expected == DataType::Void => self.report(
                id,
                codes::TYPE_MISMATCH,
                format!("function '{name}' returns void but a value of type {actual} is returned"),
            ),
            Some(actual) => {
                if !actual.is_unknown() && !is_compatible(expected, actual) {
                    self.report(
                        id,
                        codes::TYPE_MISMATCH,
                        format!("function '{name}' returns {expected} but a value of type {actual} is returned"),
                    );
                }
            }
            None if expected != DataType::Void => self.report(
                id,
                codes::TYPE_MISMATCH,
                format!("function '{name}' must return a value of type {expected}"),
            ),
            None => {}
        }
    }

    fn expect_condition(&mut self, condition: NodeId, construct: &str) {
        let ty = self.analyze_expression(condition);
        if !ty.is_unknown() && !ty.is_boolean() {
            self.report(
                condition,
                codes::TYPE_MISMATCH,
                format!("'{construct}' condition must be bool, found {ty}"),
            );
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn analyze_expression(&mut self, id: NodeId) -> DataType {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::Literal(literal) => literal.data_type(),
            NodeKind::Identifier(name) => match self.symbols.lookup(name) {
                Some(symbol) => symbol.ty,
                None => {
                    self.report(
                        id,
                        codes::UNDEFINED_NAME,
                        format!("undefined variable '{name}'"),
                    );
                    DataType::Unknown
                }
            },
            NodeKind::Binary { op, left, right } => self.analyze_binary(id, *op, *left, *right),
            NodeKind::Unary { op, operand } => self.analyze_unary(id, *op, *operand),
            NodeKind::Call { callee, args } => self.analyze_call(id, *callee, args),
            NodeKind::Superposition { branches } => {
                // Weights are free-form annotations: checked for their own
                // errors, never for range or sum.
                for branch in branches {
                    self.analyze_expression(branch.value);
                    self.analyze_expression(branch.weight);
                }
                DataType::Superposition
            }
            other => {
                self.report(
                    id,
                    codes::INVALID_OPERAND,
                    format!("{} used where an expression is expected", other.name()),
                );
                DataType::Unknown
            }
        }
    }

    fn analyze_binary(&mut self, id: NodeId, op: BinaryOp, left: NodeId, right: NodeId) -> DataType {
        match op {
            BinaryOp::Assign => return self.analyze_assignment(id, left, right),
            BinaryOp::Entangle => return self.analyze_relation(id, left, right),
            BinaryOp::Member => {
                self.analyze_expression(left);
                self.report(
                    id,
                    codes::UNSUPPORTED_OPERATOR,
                    "member access is not supported".to_string(),
                );
                return DataType::Unknown;
            }
            _ => {}
        }

        let lhs = self.analyze_expression(left);
        let rhs = self.analyze_expression(right);
        if lhs.is_unknown() || rhs.is_unknown() {
            return DataType::Unknown;
        }

        let (result, requirement) = match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                (arithmetic_result(lhs, rhs), "numeric operands")
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                (bitwise_result(lhs, rhs), "int operands")
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => (comparison_result(lhs, rhs), "compatible operands"),
            BinaryOp::And | BinaryOp::Or => (logical_result(lhs, rhs), "bool operands"),
            BinaryOp::Assign | BinaryOp::Entangle | BinaryOp::Member => (None, "no operands"),
        };

        match result {
            Some(ty) => ty,
            None => {
                self.report(
                    id,
                    codes::INVALID_OPERAND,
                    format!("operator '{op}' requires {requirement}, found {lhs} and {rhs}"),
                );
                DataType::Unknown
            }
        }
    }

    fn analyze_assignment(&mut self, id: NodeId, target: NodeId, value: NodeId) -> DataType {
        let ast = self.ast;
        let value_ty = self.analyze_expression(value);

        let NodeKind::Identifier(name) = ast.kind(target) else {
            self.report(
                target,
                codes::INVALID_OPERAND,
                "left side of '=' must be a variable".to_string(),
            );
            return DataType::Unknown;
        };
        let target_ty = match self.symbols.lookup(name) {
            Some(symbol) if symbol.kind == SymbolKind::Variable => symbol.ty,
            Some(_) => {
                self.report(
                    target,
                    codes::INVALID_OPERAND,
                    format!("cannot assign to function '{name}'"),
                );
                return DataType::Unknown;
            }
            None => {
                self.report(
                    target,
                    codes::UNDEFINED_NAME,
                    format!("undefined variable '{name}'"),
                );
                return DataType::Unknown;
            }
        };

        if !value_ty.is_unknown() && !target_ty.is_unknown() && !is_compatible(target_ty, value_ty) {
            self.report(
                id,
                codes::TYPE_MISMATCH,
                format!("cannot assign a value of type {value_ty} to '{name}' of type {target_ty}"),
            );
        }
        target_ty
    }

    fn analyze_relation(&mut self, id: NodeId, left: NodeId, right: NodeId) -> DataType {
        self.entanglement_depth += 1;
        if self.entanglement_depth > self.options.max_entanglement_depth {
            self.report(
                id,
                codes::ENTANGLEMENT_TOO_DEEP,
                format!(
                    "entanglement nested {} levels deep (limit {})",
                    self.entanglement_depth, self.options.max_entanglement_depth
                ),
            );
        }
        self.analyze_expression(left);
        self.analyze_expression(right);
        self.entanglement_depth -= 1;
        DataType::Entanglement
    }

    fn analyze_unary(&mut self, id: NodeId, op: UnaryOp, operand: NodeId) -> DataType {
        if op == UnaryOp::Quantum {
            self.in_quantum_context = true;
        }
        let ty = self.analyze_expression(operand);
        if ty.is_unknown() {
            return DataType::Unknown;
        }
        let result = match op {
            UnaryOp::Neg => ty.is_numeric().then_some(ty),
            UnaryOp::Not => ty.is_boolean().then_some(ty),
            UnaryOp::Quantum => ty.to_quantum(),
        };
        match result {
            Some(ty) => ty,
            None => {
                let requirement = match op {
                    UnaryOp::Neg => "a numeric operand",
                    UnaryOp::Not => "a bool operand",
                    UnaryOp::Quantum => "a plain int, float, bool or string operand",
                };
                self.report(
                    id,
                    codes::INVALID_OPERAND,
                    format!("operator '{op}' requires {requirement}, found {ty}"),
                );
                DataType::Unknown
            }
        }
    }

    fn analyze_call(&mut self, id: NodeId, callee: NodeId, args: &[NodeId]) -> DataType {
        let arg_types: Vec<DataType> = args.iter().map(|&a| self.analyze_expression(a)).collect();

        let ast = self.ast;
        let NodeKind::Identifier(name) = ast.kind(callee) else {
            self.report(
                callee,
                codes::NOT_A_FUNCTION,
                "only named functions can be called".to_string(),
            );
            return DataType::Unknown;
        };
        let symbol = self
            .symbols
            .lookup(name)
            .or_else(|| self.hoisted.get(name))
            .cloned();
        let Some(symbol) = symbol else {
            self.report(
                callee,
                codes::UNDEFINED_NAME,
                format!("undefined function '{name}'"),
            );
            return DataType::Unknown;
        };
        if !symbol.is_function() {
            self.report(
                callee,
                codes::NOT_A_FUNCTION,
                format!("'{name}' is a variable, not a function"),
            );
            return DataType::Unknown;
        }

        if arg_types.len() != symbol.params.len() {
            self.report(
                id,
                codes::ARITY_MISMATCH,
                format!(
                    "function '{name}' expects {} argument(s) but {} were given",
                    symbol.params.len(),
                    arg_types.len()
                ),
            );
        }
        for (index, (&expected, &actual)) in symbol.params.iter().zip(&arg_types).enumerate() {
            if !actual.is_unknown() && !is_compatible(expected, actual) {
                self.report(
                    args[index],
                    codes::TYPE_MISMATCH,
                    format!(
                        "argument {} of '{name}' must be {expected}, found {actual}",
                        index + 1
                    ),
                );
            }
        }
        symbol.return_type()
    }
}
