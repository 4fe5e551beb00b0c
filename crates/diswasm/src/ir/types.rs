//! IR type definitions.
//!
//! A function body is a tree of [`Expr`] nodes: every node owns its operands
//! and knows its static result type. The tree is built once by the expander
//! and only read afterwards.

use super::ident::{IdentId, IdentTable};
use crate::error::DecompileError;
use crate::stat::StatCache;
use anyhow::Result;
use std::fmt;

/// WebAssembly value types, plus `Void` for statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WasmType {
    I32,
    I64,
    F32,
    F64,
    Void,
}

impl fmt::Display for WasmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WasmType::I32 => write!(f, "i32"),
            WasmType::I64 => write!(f, "i64"),
            WasmType::F32 => write!(f, "f32"),
            WasmType::F64 => write!(f, "f64"),
            WasmType::Void => write!(f, "void"),
        }
    }
}

impl WasmType {
    /// Convert wasmparser::ValType to our WasmType.
    pub fn from_wasmparser(vt: wasmparser::ValType) -> Result<Self> {
        use wasmparser::ValType;
        match vt {
            ValType::I32 => Ok(WasmType::I32),
            ValType::I64 => Ok(WasmType::I64),
            ValType::F32 => Ok(WasmType::F32),
            ValType::F64 => Ok(WasmType::F64),
            other => Err(DecompileError::UnsupportedType(format!("{:?}", other)).into()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, WasmType::I32 | WasmType::I64)
    }

    /// Natural access width in bytes (0 for void).
    pub fn byte_size(&self) -> u8 {
        match self {
            WasmType::I32 | WasmType::F32 => 4,
            WasmType::I64 | WasmType::F64 => 8,
            WasmType::Void => 0,
        }
    }
}

/// Constant value in the IR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IrValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl IrValue {
    /// Returns the WasmType of this constant value.
    pub fn wasm_type(&self) -> WasmType {
        match self {
            IrValue::I32(_) => WasmType::I32,
            IrValue::I64(_) => WasmType::I64,
            IrValue::F32(_) => WasmType::F32,
            IrValue::F64(_) => WasmType::F64,
        }
    }

    /// Integer payload widened to i64, `None` for floats.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            IrValue::I32(v) => Some(*v as i64),
            IrValue::I64(v) => Some(*v),
            IrValue::F32(_) | IrValue::F64(_) => None,
        }
    }
}

/// Branch target name. Printed as `label$N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label${}", self.0)
    }
}

/// Binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,

    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,

    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,

    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,
}

/// Unary operations, conversions included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Eqz,
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Eqz,

    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,

    I32WrapI64,
    I64ExtendI32S,
    I64ExtendI32U,
    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,

    // Trapping float -> int
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,

    // Saturating float -> int
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,

    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F32DemoteF64,
    F64PromoteF32,

    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,
}

impl BinOp {
    /// Returns the WasmType of the result produced by this operation.
    ///
    /// Comparisons always produce i32.
    pub fn result_type(&self) -> WasmType {
        use BinOp::*;
        match self {
            I32Add | I32Sub | I32Mul | I32DivS | I32DivU | I32RemS | I32RemU | I32And | I32Or
            | I32Xor | I32Shl | I32ShrS | I32ShrU | I32Rotl | I32Rotr => WasmType::I32,

            I64Add | I64Sub | I64Mul | I64DivS | I64DivU | I64RemS | I64RemU | I64And | I64Or
            | I64Xor | I64Shl | I64ShrS | I64ShrU | I64Rotl | I64Rotr => WasmType::I64,

            F32Add | F32Sub | F32Mul | F32Div | F32Min | F32Max | F32Copysign => WasmType::F32,

            F64Add | F64Sub | F64Mul | F64Div | F64Min | F64Max | F64Copysign => WasmType::F64,

            I32Eq | I32Ne | I32LtS | I32LtU | I32GtS | I32GtU | I32LeS | I32LeU | I32GeS
            | I32GeU | I64Eq | I64Ne | I64LtS | I64LtU | I64GtS | I64GtU | I64LeS | I64LeU
            | I64GeS | I64GeU | F32Eq | F32Ne | F32Lt | F32Gt | F32Le | F32Ge | F64Eq | F64Ne
            | F64Lt | F64Gt | F64Le | F64Ge => WasmType::I32,
        }
    }

    /// Integer addition, either width.
    pub fn is_add(&self) -> bool {
        matches!(self, BinOp::I32Add | BinOp::I64Add)
    }

    /// Integer subtraction, either width.
    pub fn is_sub(&self) -> bool {
        matches!(self, BinOp::I32Sub | BinOp::I64Sub)
    }
}

impl UnOp {
    /// Returns the WasmType of the result produced by this operation.
    pub fn result_type(&self) -> WasmType {
        use UnOp::*;
        match self {
            I32Clz | I32Ctz | I32Popcnt | I32Eqz | I64Eqz | I32WrapI64 | I32Extend8S
            | I32Extend16S | I32TruncF32S | I32TruncF32U | I32TruncF64S | I32TruncF64U
            | I32TruncSatF32S | I32TruncSatF32U | I32TruncSatF64S | I32TruncSatF64U
            | I32ReinterpretF32 => WasmType::I32,

            I64Clz | I64Ctz | I64Popcnt | I64ExtendI32S | I64ExtendI32U | I64Extend8S
            | I64Extend16S | I64Extend32S | I64TruncF32S | I64TruncF32U | I64TruncF64S
            | I64TruncF64U | I64TruncSatF32S | I64TruncSatF32U | I64TruncSatF64S
            | I64TruncSatF64U | I64ReinterpretF64 => WasmType::I64,

            F32Abs | F32Neg | F32Ceil | F32Floor | F32Trunc | F32Nearest | F32Sqrt
            | F32ConvertI32S | F32ConvertI32U | F32ConvertI64S | F32ConvertI64U
            | F32DemoteF64 | F32ReinterpretI32 => WasmType::F32,

            F64Abs | F64Neg | F64Ceil | F64Floor | F64Trunc | F64Nearest | F64Sqrt
            | F64ConvertI32S | F64ConvertI32U | F64ConvertI64S | F64ConvertI64U
            | F64PromoteF32 | F64ReinterpretI64 => WasmType::F64,
        }
    }
}

/// A memory access: the part shared by loads and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    /// Static offset added to the pointer operand.
    pub offset: u64,
    /// Bytes touched by the access (1, 2, 4 or 8).
    pub bytes: u8,
    /// Sign extension of sub-width integer loads. Always false for stores.
    pub signed: bool,
    pub atomic: bool,
}

/// One node of a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    LocalGet {
        index: u32,
        ty: WasmType,
    },
    /// `local.set`, or `local.tee` when `tee` is set (typed with the local's type).
    LocalSet {
        index: u32,
        value: Box<Expr>,
        tee: bool,
        ty: WasmType,
    },
    GlobalGet {
        index: u32,
        ty: WasmType,
    },
    GlobalSet {
        index: u32,
        value: Box<Expr>,
    },
    Call {
        target: IdentId,
        args: Vec<Expr>,
        ty: WasmType,
    },
    CallIndirect {
        target: Box<Expr>,
        args: Vec<Expr>,
        ty: WasmType,
    },
    Const(IrValue),
    Unary {
        op: UnOp,
        value: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Select {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
        ty: WasmType,
    },
    Drop(Box<Expr>),
    Return(Option<Box<Expr>>),
    Nop,
    Unreachable,
    Block {
        label: Option<Label>,
        children: Vec<Expr>,
        ty: WasmType,
    },
    If {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Option<Box<Expr>>,
        ty: WasmType,
    },
    Loop {
        label: Option<Label>,
        body: Box<Expr>,
        ty: WasmType,
    },
    Br {
        label: Label,
        condition: Option<Box<Expr>>,
        value: Option<Box<Expr>>,
    },
    Switch {
        labels: Vec<Label>,
        default: Option<Label>,
        condition: Box<Expr>,
        value: Option<Box<Expr>>,
    },
    Load {
        ptr: Box<Expr>,
        arg: MemArg,
        ty: WasmType,
    },
    Store {
        ptr: Box<Expr>,
        value: Box<Expr>,
        arg: MemArg,
    },
    MemorySize,
    MemoryGrow {
        delta: Box<Expr>,
    },
    MemoryCopy {
        dest: Box<Expr>,
        src: Box<Expr>,
        len: Box<Expr>,
    },
    MemoryFill {
        dest: Box<Expr>,
        value: Box<Expr>,
        len: Box<Expr>,
    },
}

impl Expr {
    /// Static result type of the node.
    pub fn ty(&self) -> WasmType {
        match self {
            Expr::LocalGet { ty, .. }
            | Expr::LocalSet { ty, .. }
            | Expr::GlobalGet { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::CallIndirect { ty, .. }
            | Expr::Select { ty, .. }
            | Expr::Block { ty, .. }
            | Expr::If { ty, .. }
            | Expr::Loop { ty, .. }
            | Expr::Load { ty, .. } => *ty,
            Expr::Const(v) => v.wasm_type(),
            Expr::Unary { op, .. } => op.result_type(),
            Expr::Binary { op, .. } => op.result_type(),
            // br_if passes its value through on fallthrough
            Expr::Br {
                condition: Some(_),
                value: Some(value),
                ..
            } => value.ty(),
            Expr::MemorySize | Expr::MemoryGrow { .. } => WasmType::I32,
            Expr::GlobalSet { .. }
            | Expr::Drop(_)
            | Expr::Return(_)
            | Expr::Nop
            | Expr::Unreachable
            | Expr::Br { .. }
            | Expr::Switch { .. }
            | Expr::Store { .. }
            | Expr::MemoryCopy { .. }
            | Expr::MemoryFill { .. } => WasmType::Void,
        }
    }

    /// Transfers control unconditionally, so nothing after it runs.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Expr::Return(_)
                | Expr::Unreachable
                | Expr::Switch { .. }
                | Expr::Br {
                    condition: None,
                    ..
                }
        )
    }
}

/// What a function is: an import stub or a body.
#[derive(Debug, Clone)]
pub enum FunctionKind {
    Imported {
        module: String,
        base: String,
    },
    Local {
        /// Declared locals, not counting parameters.
        locals: Vec<WasmType>,
        body: Expr,
    },
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: IdentId,
    pub params: Vec<WasmType>,
    pub result: WasmType,
    pub kind: FunctionKind,
    /// First export name, if the function is exported.
    pub export: Option<String>,
}

impl Function {
    pub fn is_imported(&self) -> bool {
        matches!(self.kind, FunctionKind::Imported { .. })
    }

    /// Body of a defined function.
    pub fn body(&self) -> Option<&Expr> {
        match &self.kind {
            FunctionKind::Local { body, .. } => Some(body),
            FunctionKind::Imported { .. } => None,
        }
    }

    /// Declared locals of a defined function, empty for imports.
    pub fn locals(&self) -> &[WasmType] {
        match &self.kind {
            FunctionKind::Local { locals, .. } => locals,
            FunctionKind::Imported { .. } => &[],
        }
    }

    /// Type of a local by absolute index (parameters first).
    pub fn local_type(&self, index: u32) -> Option<WasmType> {
        let index = index as usize;
        if index < self.params.len() {
            self.params.get(index).copied()
        } else {
            self.locals().get(index - self.params.len()).copied()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    /// Internal name: name-section entry, else `global$N` / `gimport$N`.
    pub name: String,
    pub ty: WasmType,
    pub mutable: bool,
    /// `None` for imported globals.
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ElementSegment {
    pub entries: Vec<IdentId>,
    pub offset: Expr,
}

#[derive(Debug, Clone)]
pub struct DataSegment {
    pub offset: u64,
    pub data: Vec<u8>,
}

/// The whole module after expansion, with identifiers resolved.
#[derive(Debug)]
pub struct ExpandedModule {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub element_segments: Vec<ElementSegment>,
    pub data_segments: Vec<DataSegment>,
    pub identifiers: IdentTable,
    pub(crate) stats: StatCache,
}

impl ExpandedModule {
    /// Display name of a function.
    pub fn function_name(&self, func: &Function) -> &str {
        self.identifiers.get(func.name).name.as_str()
    }

    /// Resolved index of a function.
    pub fn function_index(&self, func: &Function) -> u32 {
        self.identifiers.get(func.name).index
    }

    /// True if some element segment stores the function with this index.
    pub fn is_in_table(&self, index: u32) -> bool {
        self.element_segments
            .iter()
            .flat_map(|seg| seg.entries.iter())
            .any(|id| self.identifiers.get(*id).index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(index: u32) -> Box<Expr> {
        Box::new(Expr::LocalGet {
            index,
            ty: WasmType::I32,
        })
    }

    #[test]
    fn label_display() {
        assert_eq!(Label(3).to_string(), "label$3");
    }

    #[test]
    fn comparisons_produce_i32() {
        assert_eq!(BinOp::I64LtU.result_type(), WasmType::I32);
        assert_eq!(BinOp::F64Ge.result_type(), WasmType::I32);
        assert_eq!(BinOp::I64Add.result_type(), WasmType::I64);
    }

    #[test]
    fn conversions_have_target_type() {
        assert_eq!(UnOp::I64Eqz.result_type(), WasmType::I32);
        assert_eq!(UnOp::I64Extend32S.result_type(), WasmType::I64);
        assert_eq!(UnOp::I32TruncSatF64U.result_type(), WasmType::I32);
        assert_eq!(UnOp::F64PromoteF32.result_type(), WasmType::F64);
    }

    #[test]
    fn br_if_with_value_is_typed() {
        let br = Expr::Br {
            label: Label(1),
            condition: Some(get(0)),
            value: Some(Box::new(Expr::Const(IrValue::I64(1)))),
        };
        assert_eq!(br.ty(), WasmType::I64);
        assert!(!br.is_terminator());

        let br = Expr::Br {
            label: Label(1),
            condition: None,
            value: Some(Box::new(Expr::Const(IrValue::I64(1)))),
        };
        assert_eq!(br.ty(), WasmType::Void);
        assert!(br.is_terminator());
    }

    #[test]
    fn wasm_type_rejects_references() {
        assert!(WasmType::from_wasmparser(wasmparser::ValType::V128).is_err());
        assert_eq!(
            WasmType::from_wasmparser(wasmparser::ValType::F32).unwrap(),
            WasmType::F32
        );
    }
}
