//! Bytecode module: instruction stream, constant pool and label table.
//!
//! The three pools are plain growable arrays with an optional entry limit.
//! Every `add_*` call returns the index of the new entry. Jumps refer to
//! labels, and a label records the instruction index it is bound to, so
//! forward jumps are resolved by binding the label once the target is
//! known.

use std::fmt;

use tracing::debug;

use crate::error::{CodegenError, PoolKind};

/// Capacity of a pool after its first growth.
pub const INITIAL_CAPACITY: usize = 16;

/// Label value meaning "not bound yet".
pub const UNBOUND: i32 = -1;

/// Image header written by [`BytecodeModule::encode`].
pub const MAGIC: &[u8; 4] = b"QBC1";

/// VM operation codes.
///
/// The numeric values are a contract with the VM and must not be
/// reordered. Fields not listed for an opcode are written as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    /// Stop execution.
    Halt,
    /// `dst` register, `src1` constant index.
    LoadConst,
    /// `dst` register, `src1` variable slot.
    LoadVar,
    /// `dst` variable slot, `src1` register.
    StoreVar,
    /// `dst` register, `src1` and `src2` operand registers.
    Add,
    Sub,
    Mul,
    Div,
    /// `dst` register, `src1` operand register.
    Neg,
    /// `dst`, `src1`, `src2` registers. Also used for `&`.
    And,
    /// `dst`, `src1`, `src2` registers. Also used for `|`.
    Or,
    /// `dst` register, `src1` operand register.
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `dst` label.
    Jmp,
    /// `dst` label, `src1` condition register.
    JmpIfTrue,
    JmpIfFalse,
    /// `dst` function slot, `src1` parameter count, `src2` label bound
    /// just past the function body.
    DeclareFunc,
    /// `dst` parameter slot, `src1` parameter position.
    FuncParam,
    /// `dst` result register, `src1` function slot, `src2` argument count.
    /// Preceded by one `Param` per argument.
    Call,
    /// `dst` argument position, `src1` register.
    Param,
    Return,
    /// `src1` register holding the return value.
    ReturnValue,
    /// `dst` variable slot, `src1` type tag.
    DeclareVar,
    /// `dst` variable slot, `src1` register holding the initial value.
    DeclareVarInit,
    /// `dst` register, `src1` operand register.
    QuantumConvert,
    /// `dst` register receiving the observed value, `src1` operand register.
    QuantumMeasure,
    /// `dst` register, `src1` and `src2` related registers.
    QuantumEntangle,
    /// `dst` register, `src1` entity count, `src2` property count. Preceded
    /// by the `EntangleEntity` entries it consumes.
    QuantumEntangleMulti,
    /// `dst` entry position, `src1` register, `src2` property-name constant
    /// or -1 for an entity.
    EntangleEntity,
    /// `dst` register, `src1` branch count. Preceded by its
    /// `SuperpositionState` entries.
    Superposition,
    /// `dst` branch position, `src1` value register, `src2` weight register.
    SuperpositionState,
}

impl Opcode {
    pub const ALL: [Opcode; 37] = [
        Opcode::Nop,
        Opcode::Halt,
        Opcode::LoadConst,
        Opcode::LoadVar,
        Opcode::StoreVar,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Neg,
        Opcode::And,
        Opcode::Or,
        Opcode::Not,
        Opcode::Eq,
        Opcode::Ne,
        Opcode::Lt,
        Opcode::Le,
        Opcode::Gt,
        Opcode::Ge,
        Opcode::Jmp,
        Opcode::JmpIfTrue,
        Opcode::JmpIfFalse,
        Opcode::DeclareFunc,
        Opcode::FuncParam,
        Opcode::Call,
        Opcode::Param,
        Opcode::Return,
        Opcode::ReturnValue,
        Opcode::DeclareVar,
        Opcode::DeclareVarInit,
        Opcode::QuantumConvert,
        Opcode::QuantumMeasure,
        Opcode::QuantumEntangle,
        Opcode::QuantumEntangleMulti,
        Opcode::EntangleEntity,
        Opcode::Superposition,
        Opcode::SuperpositionState,
    ];

    pub fn from_u8(byte: u8) -> Option<Opcode> {
        Opcode::ALL.get(usize::from(byte)).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Halt => "HALT",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadVar => "LOAD_VAR",
            Opcode::StoreVar => "STORE_VAR",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Neg => "NEG",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::Lt => "LT",
            Opcode::Le => "LE",
            Opcode::Gt => "GT",
            Opcode::Ge => "GE",
            Opcode::Jmp => "JMP",
            Opcode::JmpIfTrue => "JMP_IF_TRUE",
            Opcode::JmpIfFalse => "JMP_IF_FALSE",
            Opcode::DeclareFunc => "DECLARE_FUNC",
            Opcode::FuncParam => "FUNC_PARAM",
            Opcode::Call => "CALL",
            Opcode::Param => "PARAM",
            Opcode::Return => "RETURN",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::DeclareVar => "DECLARE_VAR",
            Opcode::DeclareVarInit => "DECLARE_VAR_INIT",
            Opcode::QuantumConvert => "QUANTUM_CONVERT",
            Opcode::QuantumMeasure => "QUANTUM_MEASURE",
            Opcode::QuantumEntangle => "QUANTUM_ENTANGLE",
            Opcode::QuantumEntangleMulti => "QUANTUM_ENTANGLE_MULTI",
            Opcode::EntangleEntity => "ENTANGLE_ENTITY",
            Opcode::Superposition => "SUPERPOSITION",
            Opcode::SuperpositionState => "SUPERPOSITION_STATE",
        }
    }

    /// True for opcodes whose `dst` names a label.
    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::JmpIfTrue | Opcode::JmpIfFalse)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dst: i32,
    pub src1: i32,
    pub src2: i32,
}

impl Instruction {
    pub const fn new(opcode: Opcode, dst: i32, src1: i32, src2: i32) -> Self {
        Instruction {
            opcode,
            dst,
            src1,
            src2,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24}{:>6}{:>6}{:>6}",
            self.opcode.mnemonic(),
            self.dst,
            self.src1,
            self.src2
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConstantType {
    Int = 0,
    Float,
    String,
    Bool,
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    /// Host-defined handle. `null` is `Opaque(0)`.
    Opaque(u64),
}

impl Constant {
    pub fn ty(&self) -> ConstantType {
        match self {
            Constant::Int(_) => ConstantType::Int,
            Constant::Float(_) => ConstantType::Float,
            Constant::String(_) => ConstantType::String,
            Constant::Bool(_) => ConstantType::Bool,
            Constant::Opaque(_) => ConstantType::Opaque,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "int {v}"),
            Constant::Float(v) => write!(f, "float {v:?}"),
            Constant::String(s) => write!(f, "string {s:?}"),
            Constant::Bool(b) => write!(f, "bool {b}"),
            Constant::Opaque(h) => write!(f, "opaque {h:#x}"),
        }
    }
}

/// A growable array that doubles its capacity and refuses to grow past
/// `limit` entries.
#[derive(Debug, Clone)]
pub struct Pool<T> {
    kind: PoolKind,
    items: Vec<T>,
    limit: usize,
}

impl<T> Pool<T> {
    pub fn new(kind: PoolKind, limit: usize) -> Self {
        Pool {
            kind,
            items: Vec::new(),
            limit,
        }
    }

    /// Append `item` and return its index.
    pub fn push(&mut self, item: T) -> Result<usize, CodegenError> {
        let len = self.items.len();
        if len >= self.limit {
            return Err(self.exhausted());
        }
        if len == self.items.capacity() {
            let target = len.saturating_mul(2).max(INITIAL_CAPACITY).min(self.limit);
            self.items
                .try_reserve_exact(target - len)
                .map_err(|_| self.exhausted())?;
            debug!(pool = %self.kind, capacity = self.items.capacity(), "grew bytecode pool");
        }
        self.items.push(item);
        Ok(len)
    }

    fn exhausted(&self) -> CodegenError {
        CodegenError::PoolExhausted {
            pool: self.kind,
            limit: self.limit,
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }
}

/// The output of code generation, owned by the caller.
#[derive(Debug, Clone)]
pub struct BytecodeModule {
    instructions: Pool<Instruction>,
    constants: Pool<Constant>,
    labels: Pool<i32>,
}

impl Default for BytecodeModule {
    fn default() -> Self {
        BytecodeModule::new()
    }
}

impl BytecodeModule {
    pub fn new() -> Self {
        BytecodeModule::with_limit(usize::MAX)
    }

    /// A module whose pools each hold at most `max_entries` entries.
    pub fn with_limit(max_entries: usize) -> Self {
        BytecodeModule {
            instructions: Pool::new(PoolKind::Instructions, max_entries),
            constants: Pool::new(PoolKind::Constants, max_entries),
            labels: Pool::new(PoolKind::Labels, max_entries),
        }
    }

    pub fn add_instruction(&mut self, instruction: Instruction) -> Result<usize, CodegenError> {
        self.instructions.push(instruction)
    }

    pub fn emit(
        &mut self,
        opcode: Opcode,
        dst: i32,
        src1: i32,
        src2: i32,
    ) -> Result<usize, CodegenError> {
        self.add_instruction(Instruction::new(opcode, dst, src1, src2))
    }

    pub fn add_constant(&mut self, constant: Constant) -> Result<usize, CodegenError> {
        self.constants.push(constant)
    }

    /// Add a label pointing at instruction `target`, or [`UNBOUND`].
    pub fn add_label(&mut self, target: i32) -> Result<usize, CodegenError> {
        self.labels.push(target)
    }

    /// Point `label` at the next instruction to be emitted.
    pub fn bind_label(&mut self, label: usize) -> Result<(), CodegenError> {
        let here = self.instructions.len() as i32;
        let slot = self
            .labels
            .get_mut(label)
            .ok_or(CodegenError::UnknownLabel { label })?;
        *slot = here;
        Ok(())
    }

    /// Instruction index a label is bound to.
    pub fn label_target(&self, label: usize) -> Option<usize> {
        self.labels
            .get(label)
            .and_then(|&target| usize::try_from(target).ok())
    }

    /// First label that was created but never bound.
    pub fn first_unbound_label(&self) -> Option<usize> {
        self.labels.as_slice().iter().position(|&t| t == UNBOUND)
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.instructions.as_slice()
    }

    pub fn constants(&self) -> &[Constant] {
        self.constants.as_slice()
    }

    pub fn labels(&self) -> &[i32] {
        self.labels.as_slice()
    }

    pub fn instruction_pool(&self) -> &Pool<Instruction> {
        &self.instructions
    }

    pub fn constant_pool(&self) -> &Pool<Constant> {
        &self.constants
    }

    pub fn label_pool(&self) -> &Pool<i32> {
        &self.labels
    }

    /// Serialize the module.
    ///
    /// Layout, all integers little endian: the magic `QBC1`, then each pool
    /// as a `u32` count followed by its entries. An instruction is the
    /// opcode byte and three `i32` fields. A constant is its type byte and
    /// payload: `i64`, `f64` bits, `u32` length plus UTF-8 bytes, one byte
    /// for bools, `u64` for opaque handles. A label is an `i32`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.instructions.len() * 13);
        out.extend_from_slice(MAGIC);

        out.extend_from_slice(&(self.instructions.len() as u32).to_le_bytes());
        for inst in self.instructions() {
            out.push(inst.opcode as u8);
            out.extend_from_slice(&inst.dst.to_le_bytes());
            out.extend_from_slice(&inst.src1.to_le_bytes());
            out.extend_from_slice(&inst.src2.to_le_bytes());
        }

        out.extend_from_slice(&(self.constants.len() as u32).to_le_bytes());
        for constant in self.constants() {
            out.push(constant.ty() as u8);
            match constant {
                Constant::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
                Constant::Float(v) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
                Constant::String(s) => {
                    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                Constant::Bool(b) => out.push(u8::from(*b)),
                Constant::Opaque(h) => out.extend_from_slice(&h.to_le_bytes()),
            }
        }

        out.extend_from_slice(&(self.labels.len() as u32).to_le_bytes());
        for label in self.labels() {
            out.extend_from_slice(&label.to_le_bytes());
        }
        out
    }
}

impl fmt::Display for BytecodeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".constants {}", self.constants.len())?;
        for (i, constant) in self.constants().iter().enumerate() {
            writeln!(f, "  #{i:<5} {constant}")?;
        }
        writeln!(f, ".labels {}", self.labels.len())?;
        for (i, target) in self.labels().iter().enumerate() {
            writeln!(f, "  L{i:<5} -> {target}")?;
        }
        writeln!(f, ".code {}", self.instructions.len())?;
        for (i, inst) in self.instructions().iter().enumerate() {
            writeln!(f, "  {i:04}  {inst}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values_follow_vm_order() {
        assert_eq!(Opcode::Nop as u8, 0);
        assert_eq!(Opcode::LoadConst as u8, 2);
        assert_eq!(Opcode::Ge as u8, 18);
        assert_eq!(Opcode::Jmp as u8, 19);
        assert_eq!(Opcode::DeclareVarInit as u8, 29);
        assert_eq!(Opcode::SuperpositionState as u8, 36);
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i, "{op}");
            assert_eq!(Opcode::from_u8(i as u8), Some(*op));
        }
        assert_eq!(Opcode::from_u8(37), None);
    }

    #[test]
    fn growth_keeps_instructions_in_order() {
        let mut module = BytecodeModule::new();
        let count = INITIAL_CAPACITY * 8 + 3;
        for i in 0..count {
            let index = module
                .emit(Opcode::LoadConst, i as i32, (i * 2) as i32, 0)
                .expect("unbounded pool");
            assert_eq!(index, i);
            assert!(module.instruction_pool().len() <= module.instruction_pool().capacity());
        }
        for i in 0..count {
            let inst = module.instructions()[i];
            assert_eq!(inst, Instruction::new(Opcode::LoadConst, i as i32, (i * 2) as i32, 0));
        }
    }

    #[test]
    fn first_growth_reserves_initial_capacity() {
        let mut pool = Pool::new(PoolKind::Constants, usize::MAX);
        assert_eq!(pool.capacity(), 0);
        pool.push(Constant::Int(1)).expect("push");
        assert!(pool.capacity() >= INITIAL_CAPACITY);
    }

    #[test]
    fn limited_pool_reports_exhaustion() {
        let mut module = BytecodeModule::with_limit(2);
        module.add_constant(Constant::Int(1)).expect("first");
        module.add_constant(Constant::Int(2)).expect("second");
        assert_eq!(
            module.add_constant(Constant::Int(3)),
            Err(CodegenError::PoolExhausted {
                pool: PoolKind::Constants,
                limit: 2
            })
        );
        assert_eq!(module.constants().len(), 2);
        assert!(module.emit(Opcode::Nop, 0, 0, 0).is_ok());
    }

    #[test]
    fn labels_start_unbound_and_bind_to_next_instruction() {
        let mut module = BytecodeModule::new();
        let label = module.add_label(UNBOUND).expect("label");
        module.emit(Opcode::Jmp, label as i32, 0, 0).expect("jmp");
        assert_eq!(module.first_unbound_label(), Some(label));
        assert_eq!(module.label_target(label), None);

        module.emit(Opcode::Nop, 0, 0, 0).expect("nop");
        module.bind_label(label).expect("bind");
        assert_eq!(module.label_target(label), Some(2));
        assert_eq!(module.first_unbound_label(), None);
    }

    #[test]
    fn binding_a_missing_label_fails() {
        let mut module = BytecodeModule::new();
        module.add_label(UNBOUND).expect("label");
        assert_eq!(
            module.bind_label(3),
            Err(CodegenError::UnknownLabel { label: 3 })
        );
        assert_eq!(module.first_unbound_label(), Some(0));
    }

    #[test]
    fn encodes_header_and_pools() {
        let mut module = BytecodeModule::new();
        module.add_constant(Constant::String("hi".into())).expect("const");
        module.add_constant(Constant::Bool(true)).expect("const");
        module.emit(Opcode::LoadConst, 0, 0, 0).expect("emit");
        module.emit(Opcode::Halt, 0, 0, 0).expect("emit");
        module.add_label(1).expect("label");

        let image = module.encode();
        assert_eq!(&image[..4], MAGIC);
        assert_eq!(u32::from_le_bytes(image[4..8].try_into().unwrap()), 2);
        assert_eq!(image[8], Opcode::LoadConst as u8);
        assert_eq!(image[21], Opcode::Halt as u8);

        let constants = 8 + 2 * 13;
        assert_eq!(u32::from_le_bytes(image[constants..constants + 4].try_into().unwrap()), 2);
        assert_eq!(image[constants + 4], ConstantType::String as u8);
        assert_eq!(&image[constants + 9..constants + 11], b"hi");
        assert_eq!(image[constants + 11], ConstantType::Bool as u8);
        assert_eq!(image[constants + 12], 1);

        let labels = constants + 13;
        assert_eq!(u32::from_le_bytes(image[labels..labels + 4].try_into().unwrap()), 1);
        assert_eq!(i32::from_le_bytes(image[labels + 4..].try_into().unwrap()), 1);
    }

    #[test]
    fn listing_names_every_pool() {
        let mut module = BytecodeModule::new();
        module.add_constant(Constant::Float(1.5)).expect("const");
        module.emit(Opcode::QuantumMeasure, 1, 0, 0).expect("emit");
        let listing = module.to_string();
        assert!(listing.contains(".constants 1"));
        assert!(listing.contains("float 1.5"));
        assert!(listing.contains(".labels 0"));
        assert!(listing.contains("QUANTUM_MEASURE"));
    }
}
