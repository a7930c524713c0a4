//! Lowering of a checked program into a [`BytecodeModule`].
//!
//! Every expression result lands in a fresh register; variables and
//! functions live in slots. Builtins take slots `0..BUILTINS.len()` and
//! top-level names follow in declaration order, so calls to functions
//! declared later in the file resolve. Nested declarations get fresh slots.

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Ast, BinaryOp, Literal, NodeId, NodeKind, UnaryOp};
use crate::builtins::BUILTINS;
use crate::bytecode::{BytecodeModule, Constant, Opcode, UNBOUND};
use crate::error::CodegenError;
use crate::symbols::Scope;
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Upper bound on the entries of each pool.
    pub max_pool_entries: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            max_pool_entries: usize::MAX,
        }
    }
}

/// Generate bytecode for the program rooted at `root`.
///
/// `globals` is the global scope produced by semantic analysis. The
/// program is expected to be free of semantic errors.
pub fn generate_code(
    ast: &Ast,
    root: NodeId,
    globals: &Scope,
    options: GeneratorOptions,
) -> Result<BytecodeModule, CodegenError> {
    let NodeKind::Program { statements } = ast.kind(root) else {
        return Err(CodegenError::UnsupportedNode {
            node: ast.kind(root).name(),
        });
    };

    let mut generator = Generator::new(ast, globals, options);
    for &statement in statements {
        generator.lower_statement(statement)?;
    }
    generator.module.emit(Opcode::Halt, 0, 0, 0)?;

    if let Some(label) = generator.module.first_unbound_label() {
        return Err(CodegenError::UnboundLabel { label });
    }
    let module = generator.module;
    debug!(
        instructions = module.instructions().len(),
        constants = module.constants().len(),
        labels = module.labels().len(),
        "generated bytecode"
    );
    Ok(module)
}

struct Generator<'a> {
    ast: &'a Ast,
    module: BytecodeModule,
    /// Name to slot, innermost scope last. The first two are the builtins
    /// and the globals.
    scopes: Vec<HashMap<String, i32>>,
    next_slot: i32,
    next_register: i32,
}

impl<'a> Generator<'a> {
    fn new(ast: &'a Ast, globals: &Scope, options: GeneratorOptions) -> Self {
        let builtins: HashMap<String, i32> = BUILTINS
            .iter()
            .enumerate()
            .map(|(slot, b)| (b.name.to_string(), slot as i32))
            .collect();
        let mut next_slot = BUILTINS.len() as i32;
        let mut top_level = HashMap::new();
        for symbol in globals.iter() {
            top_level.insert(symbol.name.clone(), next_slot);
            next_slot += 1;
        }
        Generator {
            ast,
            module: BytecodeModule::with_limit(options.max_pool_entries),
            scopes: vec![builtins, top_level],
            next_slot,
            next_register: 0,
        }
    }

    fn register(&mut self) -> i32 {
        let register = self.next_register;
        self.next_register += 1;
        register
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 2 {
            self.scopes.pop();
        }
    }

    /// Slot for a declaration in the innermost scope. Redeclaring a name in
    /// the same scope reuses its slot.
    fn declare(&mut self, name: &str) -> i32 {
        let next_slot = &mut self.next_slot;
        let scope = self.scopes.last_mut().expect("global slot scope is never popped");
        *scope.entry(name.to_string()).or_insert_with(|| {
            let slot = *next_slot;
            *next_slot += 1;
            slot
        })
    }

    fn resolve(&self, name: &str) -> Result<i32, CodegenError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .ok_or_else(|| CodegenError::UnresolvedName {
                name: name.to_string(),
            })
    }

    fn new_label(&mut self) -> Result<usize, CodegenError> {
        self.module.add_label(UNBOUND)
    }

    fn jump(&mut self, opcode: Opcode, label: usize, condition: i32) -> Result<(), CodegenError> {
        self.module.emit(opcode, label as i32, condition, 0)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn lower_statement(&mut self, id: NodeId) -> Result<(), CodegenError> {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::VarDecl {
                name,
                annotation,
                init,
            } => {
                let value = init.map(|init| self.lower_expression(init)).transpose()?;
                let slot = self.declare(name);
                match value {
                    Some(register) => self.module.emit(Opcode::DeclareVarInit, slot, register, 0)?,
                    None => {
                        let tag = annotation.unwrap_or(DataType::Unknown).tag();
                        self.module.emit(Opcode::DeclareVar, slot, tag, 0)?
                    }
                };
            }
            NodeKind::FunctionDecl { .. } => self.lower_function(id)?,
            NodeKind::Block { statements } => {
                self.push_scope();
                for &statement in statements {
                    self.lower_statement(statement)?;
                }
                self.pop_scope();
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.lower_expression(*condition)?;
                let otherwise = self.new_label()?;
                self.jump(Opcode::JmpIfFalse, otherwise, condition)?;
                self.lower_statement(*then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let end = self.new_label()?;
                        self.jump(Opcode::Jmp, end, 0)?;
                        self.module.bind_label(otherwise)?;
                        self.lower_statement(*else_branch)?;
                        self.module.bind_label(end)?;
                    }
                    None => self.module.bind_label(otherwise)?,
                }
            }
            NodeKind::While { condition, body } => {
                let start = self.new_label()?;
                let end = self.new_label()?;
                self.module.bind_label(start)?;
                let condition = self.lower_expression(*condition)?;
                self.jump(Opcode::JmpIfFalse, end, condition)?;
                self.lower_statement(*body)?;
                self.jump(Opcode::Jmp, start, 0)?;
                self.module.bind_label(end)?;
            }
            NodeKind::For {
                init,
                condition,
                step,
                body,
            } => {
                self.push_scope();
                if let Some(init) = init {
                    self.lower_statement(*init)?;
                }
                let start = self.new_label()?;
                let end = self.new_label()?;
                self.module.bind_label(start)?;
                if let Some(condition) = condition {
                    let condition = self.lower_expression(*condition)?;
                    self.jump(Opcode::JmpIfFalse, end, condition)?;
                }
                self.lower_statement(*body)?;
                if let Some(step) = step {
                    self.lower_expression(*step)?;
                }
                self.jump(Opcode::Jmp, start, 0)?;
                self.module.bind_label(end)?;
                self.pop_scope();
            }
            NodeKind::Return { value } => match value {
                Some(value) => {
                    let register = self.lower_expression(*value)?;
                    self.module.emit(Opcode::ReturnValue, 0, register, 0)?;
                }
                None => {
                    self.module.emit(Opcode::Return, 0, 0, 0)?;
                }
            },
            NodeKind::ExprStmt { expr } => {
                self.lower_expression(*expr)?;
            }
            NodeKind::Measure { operand } => {
                let operand = self.lower_expression(*operand)?;
                let dst = self.register();
                self.module.emit(Opcode::QuantumMeasure, dst, operand, 0)?;
            }
            NodeKind::Entangle {
                entities,
                properties,
            } => {
                let mut entries = Vec::with_capacity(entities.len() + properties.len());
                for &entity in entities {
                    entries.push((self.lower_expression(entity)?, -1));
                }
                for property in properties {
                    let value = self.lower_expression(property.value)?;
                    let name = self.module.add_constant(Constant::String(property.name.clone()))?;
                    entries.push((value, name as i32));
                }
                for (position, (register, name)) in entries.into_iter().enumerate() {
                    self.module
                        .emit(Opcode::EntangleEntity, position as i32, register, name)?;
                }
                let dst = self.register();
                self.module.emit(
                    Opcode::QuantumEntangleMulti,
                    dst,
                    entities.len() as i32,
                    properties.len() as i32,
                )?;
            }
            NodeKind::Import { path } => {
                debug!(path = %path, "import emits no code");
            }
            NodeKind::Export { declaration } => self.lower_statement(*declaration)?,
            NodeKind::Program { .. } => {
                return Err(CodegenError::UnsupportedNode { node: "Program" });
            }
            _ => {
                self.lower_expression(id)?;
            }
        }
        Ok(())
    }

    fn lower_function(&mut self, id: NodeId) -> Result<(), CodegenError> {
        let ast = self.ast;
        let NodeKind::FunctionDecl {
            name, params, body, ..
        } = ast.kind(id)
        else {
            return Err(CodegenError::UnsupportedNode {
                node: ast.kind(id).name(),
            });
        };

        let slot = self.declare(name);
        let end = self.new_label()?;
        self.module
            .emit(Opcode::DeclareFunc, slot, params.len() as i32, end as i32)?;

        self.push_scope();
        for (position, param) in params.iter().enumerate() {
            let param_slot = self.declare(&param.name);
            self.module
                .emit(Opcode::FuncParam, param_slot, position as i32, 0)?;
        }
        match ast.kind(*body) {
            NodeKind::Block { statements } => {
                for &statement in statements {
                    self.lower_statement(statement)?;
                }
            }
            _ => self.lower_statement(*body)?,
        }
        // A jump may land just past the last statement, so only a body
        // that itself ends in `return` can skip the closing RETURN.
        if !ends_in_return(ast, *body) {
            self.module.emit(Opcode::Return, 0, 0, 0)?;
        }
        self.pop_scope();
        self.module.bind_label(end)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn lower_expression(&mut self, id: NodeId) -> Result<i32, CodegenError> {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::Literal(literal) => {
                let constant = match literal {
                    Literal::Int(v) => Constant::Int(*v),
                    Literal::Float(v) => Constant::Float(*v),
                    Literal::String(s) => Constant::String(s.clone()),
                    Literal::Bool(b) => Constant::Bool(*b),
                    Literal::Null => Constant::Opaque(0),
                };
                let index = self.module.add_constant(constant)?;
                let dst = self.register();
                self.module.emit(Opcode::LoadConst, dst, index as i32, 0)?;
                Ok(dst)
            }
            NodeKind::Identifier(name) => {
                let slot = self.resolve(name)?;
                let dst = self.register();
                self.module.emit(Opcode::LoadVar, dst, slot, 0)?;
                Ok(dst)
            }
            NodeKind::Binary { op, left, right } => self.lower_binary(*op, *left, *right),
            NodeKind::Unary { op, operand } => {
                let operand = self.lower_expression(*operand)?;
                let opcode = match op {
                    UnaryOp::Neg => Opcode::Neg,
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::Quantum => Opcode::QuantumConvert,
                };
                let dst = self.register();
                self.module.emit(opcode, dst, operand, 0)?;
                Ok(dst)
            }
            NodeKind::Call { callee, args } => {
                let NodeKind::Identifier(name) = ast.kind(*callee) else {
                    return Err(CodegenError::UnsupportedNode {
                        node: "non-identifier callee",
                    });
                };
                let slot = self.resolve(name)?;
                let mut registers = Vec::with_capacity(args.len());
                for &arg in args {
                    registers.push(self.lower_expression(arg)?);
                }
                for (position, register) in registers.into_iter().enumerate() {
                    self.module.emit(Opcode::Param, position as i32, register, 0)?;
                }
                let dst = self.register();
                self.module.emit(Opcode::Call, dst, slot, args.len() as i32)?;
                Ok(dst)
            }
            NodeKind::Superposition { branches } => {
                let mut states = Vec::with_capacity(branches.len());
                for branch in branches {
                    let value = self.lower_expression(branch.value)?;
                    let weight = self.lower_expression(branch.weight)?;
                    states.push((value, weight));
                }
                for (position, (value, weight)) in states.into_iter().enumerate() {
                    self.module
                        .emit(Opcode::SuperpositionState, position as i32, value, weight)?;
                }
                let dst = self.register();
                self.module
                    .emit(Opcode::Superposition, dst, branches.len() as i32, 0)?;
                Ok(dst)
            }
            other => Err(CodegenError::UnsupportedNode { node: other.name() }),
        }
    }

    fn lower_binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> Result<i32, CodegenError> {
        let opcode = match op {
            BinaryOp::Assign => return self.lower_assignment(left, right),
            BinaryOp::Entangle => Opcode::QuantumEntangle,
            BinaryOp::Or | BinaryOp::BitOr => Opcode::Or,
            BinaryOp::And | BinaryOp::BitAnd => Opcode::And,
            BinaryOp::Eq => Opcode::Eq,
            BinaryOp::Ne => Opcode::Ne,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::Le => Opcode::Le,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Ge => Opcode::Ge,
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::BitXor | BinaryOp::Member => {
                return Err(CodegenError::UnsupportedOperator { op: op.symbol() });
            }
        };
        let lhs = self.lower_expression(left)?;
        let rhs = self.lower_expression(right)?;
        let dst = self.register();
        self.module.emit(opcode, dst, lhs, rhs)?;
        Ok(dst)
    }

    fn lower_assignment(&mut self, target: NodeId, value: NodeId) -> Result<i32, CodegenError> {
        let ast = self.ast;
        let NodeKind::Identifier(name) = ast.kind(target) else {
            return Err(CodegenError::UnsupportedNode {
                node: "assignment target",
            });
        };
        let value = self.lower_expression(value)?;
        let slot = self.resolve(name)?;
        self.module.emit(Opcode::StoreVar, slot, value, 0)?;
        Ok(value)
    }
}

fn ends_in_return(ast: &Ast, body: NodeId) -> bool {
    match ast.kind(body) {
        NodeKind::Block { statements } => statements
            .last()
            .is_some_and(|&last| matches!(ast.kind(last), NodeKind::Return { .. })),
        NodeKind::Return { .. } => true,
        _ => false,
    }
}
