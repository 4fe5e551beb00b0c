//! Operator translation - folds the flat operator stream into expression trees.

use super::super::types::*;
use super::core::{signature, FrameKind, FunctionBuilder};
use crate::error::DecompileError;
use anyhow::{bail, Context, Result};
use wasmparser::{MemArg as WasmMemArg, Operator};

impl FunctionBuilder<'_, '_> {
    /// Translate a single Wasm operator.
    pub(super) fn translate_operator(&mut self, op: &Operator) -> Result<()> {
        if self.is_dead() && !self.skip_dead(op)? {
            return Ok(());
        }

        match op {
            Operator::I32Const { value } => self.push(Expr::Const(IrValue::I32(*value)))?,
            Operator::I64Const { value } => self.push(Expr::Const(IrValue::I64(*value)))?,
            Operator::F32Const { value } => {
                self.push(Expr::Const(IrValue::F32(f32::from_bits(value.bits()))))?
            }
            Operator::F64Const { value } => {
                self.push(Expr::Const(IrValue::F64(f64::from_bits(value.bits()))))?
            }

            Operator::LocalGet { local_index } => {
                let ty = self.local_type(*local_index)?;
                self.push(Expr::LocalGet {
                    index: *local_index,
                    ty,
                })?;
            }
            Operator::LocalSet { local_index } | Operator::LocalTee { local_index } => {
                let tee = matches!(op, Operator::LocalTee { .. });
                let ty = self.local_type(*local_index)?;
                let value = self.pop_value("local.set")?;
                self.push(Expr::LocalSet {
                    index: *local_index,
                    value: Box::new(value),
                    tee,
                    ty: if tee { ty } else { WasmType::Void },
                })?;
            }
            Operator::GlobalGet { global_index } => {
                let ty = self.global_type(*global_index)?;
                self.push(Expr::GlobalGet {
                    index: *global_index,
                    ty,
                })?;
            }
            Operator::GlobalSet { global_index } => {
                self.global_type(*global_index)?;
                let value = self.pop_value("global.set")?;
                self.push(Expr::GlobalSet {
                    index: *global_index,
                    value: Box::new(value),
                })?;
            }

            Operator::I32Add => self.emit_binop(BinOp::I32Add)?,
            Operator::I32Sub => self.emit_binop(BinOp::I32Sub)?,
            Operator::I32Mul => self.emit_binop(BinOp::I32Mul)?,
            Operator::I32DivS => self.emit_binop(BinOp::I32DivS)?,
            Operator::I32DivU => self.emit_binop(BinOp::I32DivU)?,
            Operator::I32RemS => self.emit_binop(BinOp::I32RemS)?,
            Operator::I32RemU => self.emit_binop(BinOp::I32RemU)?,
            Operator::I32And => self.emit_binop(BinOp::I32And)?,
            Operator::I32Or => self.emit_binop(BinOp::I32Or)?,
            Operator::I32Xor => self.emit_binop(BinOp::I32Xor)?,
            Operator::I32Shl => self.emit_binop(BinOp::I32Shl)?,
            Operator::I32ShrS => self.emit_binop(BinOp::I32ShrS)?,
            Operator::I32ShrU => self.emit_binop(BinOp::I32ShrU)?,
            Operator::I32Rotl => self.emit_binop(BinOp::I32Rotl)?,
            Operator::I32Rotr => self.emit_binop(BinOp::I32Rotr)?,
            Operator::I32Eq => self.emit_binop(BinOp::I32Eq)?,
            Operator::I32Ne => self.emit_binop(BinOp::I32Ne)?,
            Operator::I32LtS => self.emit_binop(BinOp::I32LtS)?,
            Operator::I32LtU => self.emit_binop(BinOp::I32LtU)?,
            Operator::I32GtS => self.emit_binop(BinOp::I32GtS)?,
            Operator::I32GtU => self.emit_binop(BinOp::I32GtU)?,
            Operator::I32LeS => self.emit_binop(BinOp::I32LeS)?,
            Operator::I32LeU => self.emit_binop(BinOp::I32LeU)?,
            Operator::I32GeS => self.emit_binop(BinOp::I32GeS)?,
            Operator::I32GeU => self.emit_binop(BinOp::I32GeU)?,
            Operator::I32Eqz => self.emit_unop(UnOp::I32Eqz)?,
            Operator::I32Clz => self.emit_unop(UnOp::I32Clz)?,
            Operator::I32Ctz => self.emit_unop(UnOp::I32Ctz)?,
            Operator::I32Popcnt => self.emit_unop(UnOp::I32Popcnt)?,

            Operator::I64Add => self.emit_binop(BinOp::I64Add)?,
            Operator::I64Sub => self.emit_binop(BinOp::I64Sub)?,
            Operator::I64Mul => self.emit_binop(BinOp::I64Mul)?,
            Operator::I64DivS => self.emit_binop(BinOp::I64DivS)?,
            Operator::I64DivU => self.emit_binop(BinOp::I64DivU)?,
            Operator::I64RemS => self.emit_binop(BinOp::I64RemS)?,
            Operator::I64RemU => self.emit_binop(BinOp::I64RemU)?,
            Operator::I64And => self.emit_binop(BinOp::I64And)?,
            Operator::I64Or => self.emit_binop(BinOp::I64Or)?,
            Operator::I64Xor => self.emit_binop(BinOp::I64Xor)?,
            Operator::I64Shl => self.emit_binop(BinOp::I64Shl)?,
            Operator::I64ShrS => self.emit_binop(BinOp::I64ShrS)?,
            Operator::I64ShrU => self.emit_binop(BinOp::I64ShrU)?,
            Operator::I64Rotl => self.emit_binop(BinOp::I64Rotl)?,
            Operator::I64Rotr => self.emit_binop(BinOp::I64Rotr)?,
            Operator::I64Eq => self.emit_binop(BinOp::I64Eq)?,
            Operator::I64Ne => self.emit_binop(BinOp::I64Ne)?,
            Operator::I64LtS => self.emit_binop(BinOp::I64LtS)?,
            Operator::I64LtU => self.emit_binop(BinOp::I64LtU)?,
            Operator::I64GtS => self.emit_binop(BinOp::I64GtS)?,
            Operator::I64GtU => self.emit_binop(BinOp::I64GtU)?,
            Operator::I64LeS => self.emit_binop(BinOp::I64LeS)?,
            Operator::I64LeU => self.emit_binop(BinOp::I64LeU)?,
            Operator::I64GeS => self.emit_binop(BinOp::I64GeS)?,
            Operator::I64GeU => self.emit_binop(BinOp::I64GeU)?,
            Operator::I64Eqz => self.emit_unop(UnOp::I64Eqz)?,
            Operator::I64Clz => self.emit_unop(UnOp::I64Clz)?,
            Operator::I64Ctz => self.emit_unop(UnOp::I64Ctz)?,
            Operator::I64Popcnt => self.emit_unop(UnOp::I64Popcnt)?,

            Operator::F32Add => self.emit_binop(BinOp::F32Add)?,
            Operator::F32Sub => self.emit_binop(BinOp::F32Sub)?,
            Operator::F32Mul => self.emit_binop(BinOp::F32Mul)?,
            Operator::F32Div => self.emit_binop(BinOp::F32Div)?,
            Operator::F32Min => self.emit_binop(BinOp::F32Min)?,
            Operator::F32Max => self.emit_binop(BinOp::F32Max)?,
            Operator::F32Copysign => self.emit_binop(BinOp::F32Copysign)?,
            Operator::F32Eq => self.emit_binop(BinOp::F32Eq)?,
            Operator::F32Ne => self.emit_binop(BinOp::F32Ne)?,
            Operator::F32Lt => self.emit_binop(BinOp::F32Lt)?,
            Operator::F32Gt => self.emit_binop(BinOp::F32Gt)?,
            Operator::F32Le => self.emit_binop(BinOp::F32Le)?,
            Operator::F32Ge => self.emit_binop(BinOp::F32Ge)?,
            Operator::F32Abs => self.emit_unop(UnOp::F32Abs)?,
            Operator::F32Neg => self.emit_unop(UnOp::F32Neg)?,
            Operator::F32Ceil => self.emit_unop(UnOp::F32Ceil)?,
            Operator::F32Floor => self.emit_unop(UnOp::F32Floor)?,
            Operator::F32Trunc => self.emit_unop(UnOp::F32Trunc)?,
            Operator::F32Nearest => self.emit_unop(UnOp::F32Nearest)?,
            Operator::F32Sqrt => self.emit_unop(UnOp::F32Sqrt)?,

            Operator::F64Add => self.emit_binop(BinOp::F64Add)?,
            Operator::F64Sub => self.emit_binop(BinOp::F64Sub)?,
            Operator::F64Mul => self.emit_binop(BinOp::F64Mul)?,
            Operator::F64Div => self.emit_binop(BinOp::F64Div)?,
            Operator::F64Min => self.emit_binop(BinOp::F64Min)?,
            Operator::F64Max => self.emit_binop(BinOp::F64Max)?,
            Operator::F64Copysign => self.emit_binop(BinOp::F64Copysign)?,
            Operator::F64Eq => self.emit_binop(BinOp::F64Eq)?,
            Operator::F64Ne => self.emit_binop(BinOp::F64Ne)?,
            Operator::F64Lt => self.emit_binop(BinOp::F64Lt)?,
            Operator::F64Gt => self.emit_binop(BinOp::F64Gt)?,
            Operator::F64Le => self.emit_binop(BinOp::F64Le)?,
            Operator::F64Ge => self.emit_binop(BinOp::F64Ge)?,
            Operator::F64Abs => self.emit_unop(UnOp::F64Abs)?,
            Operator::F64Neg => self.emit_unop(UnOp::F64Neg)?,
            Operator::F64Ceil => self.emit_unop(UnOp::F64Ceil)?,
            Operator::F64Floor => self.emit_unop(UnOp::F64Floor)?,
            Operator::F64Trunc => self.emit_unop(UnOp::F64Trunc)?,
            Operator::F64Nearest => self.emit_unop(UnOp::F64Nearest)?,
            Operator::F64Sqrt => self.emit_unop(UnOp::F64Sqrt)?,

            Operator::I32WrapI64 => self.emit_unop(UnOp::I32WrapI64)?,
            Operator::I64ExtendI32S => self.emit_unop(UnOp::I64ExtendI32S)?,
            Operator::I64ExtendI32U => self.emit_unop(UnOp::I64ExtendI32U)?,
            Operator::I32Extend8S => self.emit_unop(UnOp::I32Extend8S)?,
            Operator::I32Extend16S => self.emit_unop(UnOp::I32Extend16S)?,
            Operator::I64Extend8S => self.emit_unop(UnOp::I64Extend8S)?,
            Operator::I64Extend16S => self.emit_unop(UnOp::I64Extend16S)?,
            Operator::I64Extend32S => self.emit_unop(UnOp::I64Extend32S)?,
            Operator::I32TruncF32S => self.emit_unop(UnOp::I32TruncF32S)?,
            Operator::I32TruncF32U => self.emit_unop(UnOp::I32TruncF32U)?,
            Operator::I32TruncF64S => self.emit_unop(UnOp::I32TruncF64S)?,
            Operator::I32TruncF64U => self.emit_unop(UnOp::I32TruncF64U)?,
            Operator::I64TruncF32S => self.emit_unop(UnOp::I64TruncF32S)?,
            Operator::I64TruncF32U => self.emit_unop(UnOp::I64TruncF32U)?,
            Operator::I64TruncF64S => self.emit_unop(UnOp::I64TruncF64S)?,
            Operator::I64TruncF64U => self.emit_unop(UnOp::I64TruncF64U)?,
            Operator::I32TruncSatF32S => self.emit_unop(UnOp::I32TruncSatF32S)?,
            Operator::I32TruncSatF32U => self.emit_unop(UnOp::I32TruncSatF32U)?,
            Operator::I32TruncSatF64S => self.emit_unop(UnOp::I32TruncSatF64S)?,
            Operator::I32TruncSatF64U => self.emit_unop(UnOp::I32TruncSatF64U)?,
            Operator::I64TruncSatF32S => self.emit_unop(UnOp::I64TruncSatF32S)?,
            Operator::I64TruncSatF32U => self.emit_unop(UnOp::I64TruncSatF32U)?,
            Operator::I64TruncSatF64S => self.emit_unop(UnOp::I64TruncSatF64S)?,
            Operator::I64TruncSatF64U => self.emit_unop(UnOp::I64TruncSatF64U)?,
            Operator::F32ConvertI32S => self.emit_unop(UnOp::F32ConvertI32S)?,
            Operator::F32ConvertI32U => self.emit_unop(UnOp::F32ConvertI32U)?,
            Operator::F32ConvertI64S => self.emit_unop(UnOp::F32ConvertI64S)?,
            Operator::F32ConvertI64U => self.emit_unop(UnOp::F32ConvertI64U)?,
            Operator::F64ConvertI32S => self.emit_unop(UnOp::F64ConvertI32S)?,
            Operator::F64ConvertI32U => self.emit_unop(UnOp::F64ConvertI32U)?,
            Operator::F64ConvertI64S => self.emit_unop(UnOp::F64ConvertI64S)?,
            Operator::F64ConvertI64U => self.emit_unop(UnOp::F64ConvertI64U)?,
            Operator::F32DemoteF64 => self.emit_unop(UnOp::F32DemoteF64)?,
            Operator::F64PromoteF32 => self.emit_unop(UnOp::F64PromoteF32)?,
            Operator::I32ReinterpretF32 => self.emit_unop(UnOp::I32ReinterpretF32)?,
            Operator::I64ReinterpretF64 => self.emit_unop(UnOp::I64ReinterpretF64)?,
            Operator::F32ReinterpretI32 => self.emit_unop(UnOp::F32ReinterpretI32)?,
            Operator::F64ReinterpretI64 => self.emit_unop(UnOp::F64ReinterpretI64)?,

            // === Memory loads ===
            Operator::I32Load { memarg } => self.emit_load(WasmType::I32, memarg, 4, true, false)?,
            Operator::I64Load { memarg } => self.emit_load(WasmType::I64, memarg, 8, true, false)?,
            Operator::F32Load { memarg } => self.emit_load(WasmType::F32, memarg, 4, false, false)?,
            Operator::F64Load { memarg } => self.emit_load(WasmType::F64, memarg, 8, false, false)?,
            Operator::I32Load8S { memarg } => self.emit_load(WasmType::I32, memarg, 1, true, false)?,
            Operator::I32Load8U { memarg } => self.emit_load(WasmType::I32, memarg, 1, false, false)?,
            Operator::I32Load16S { memarg } => self.emit_load(WasmType::I32, memarg, 2, true, false)?,
            Operator::I32Load16U { memarg } => {
                self.emit_load(WasmType::I32, memarg, 2, false, false)?
            }
            Operator::I64Load8S { memarg } => self.emit_load(WasmType::I64, memarg, 1, true, false)?,
            Operator::I64Load8U { memarg } => self.emit_load(WasmType::I64, memarg, 1, false, false)?,
            Operator::I64Load16S { memarg } => self.emit_load(WasmType::I64, memarg, 2, true, false)?,
            Operator::I64Load16U { memarg } => {
                self.emit_load(WasmType::I64, memarg, 2, false, false)?
            }
            Operator::I64Load32S { memarg } => self.emit_load(WasmType::I64, memarg, 4, true, false)?,
            Operator::I64Load32U { memarg } => {
                self.emit_load(WasmType::I64, memarg, 4, false, false)?
            }
            Operator::I32AtomicLoad { memarg } => {
                self.emit_load(WasmType::I32, memarg, 4, true, true)?
            }
            Operator::I64AtomicLoad { memarg } => {
                self.emit_load(WasmType::I64, memarg, 8, true, true)?
            }
            Operator::I32AtomicLoad8U { memarg } => {
                self.emit_load(WasmType::I32, memarg, 1, false, true)?
            }
            Operator::I32AtomicLoad16U { memarg } => {
                self.emit_load(WasmType::I32, memarg, 2, false, true)?
            }
            Operator::I64AtomicLoad8U { memarg } => {
                self.emit_load(WasmType::I64, memarg, 1, false, true)?
            }
            Operator::I64AtomicLoad16U { memarg } => {
                self.emit_load(WasmType::I64, memarg, 2, false, true)?
            }
            Operator::I64AtomicLoad32U { memarg } => {
                self.emit_load(WasmType::I64, memarg, 4, false, true)?
            }

            // === Memory stores ===
            Operator::I32Store { memarg } | Operator::F32Store { memarg } => {
                self.emit_store(memarg, 4, false)?
            }
            Operator::I64Store { memarg } | Operator::F64Store { memarg } => {
                self.emit_store(memarg, 8, false)?
            }
            Operator::I32Store8 { memarg } | Operator::I64Store8 { memarg } => {
                self.emit_store(memarg, 1, false)?
            }
            Operator::I32Store16 { memarg } | Operator::I64Store16 { memarg } => {
                self.emit_store(memarg, 2, false)?
            }
            Operator::I64Store32 { memarg } => self.emit_store(memarg, 4, false)?,
            Operator::I32AtomicStore { memarg } | Operator::I64AtomicStore32 { memarg } => {
                self.emit_store(memarg, 4, true)?
            }
            Operator::I64AtomicStore { memarg } => self.emit_store(memarg, 8, true)?,
            Operator::I32AtomicStore8 { memarg } | Operator::I64AtomicStore8 { memarg } => {
                self.emit_store(memarg, 1, true)?
            }
            Operator::I32AtomicStore16 { memarg } | Operator::I64AtomicStore16 { memarg } => {
                self.emit_store(memarg, 2, true)?
            }

            Operator::MemorySize { mem: 0 } => self.push(Expr::MemorySize)?,
            Operator::MemoryGrow { mem: 0 } => {
                let delta = self.pop_value("memory.grow")?;
                self.push(Expr::MemoryGrow {
                    delta: Box::new(delta),
                })?;
            }
            Operator::MemoryCopy {
                dst_mem: 0,
                src_mem: 0,
            } => {
                let [dest, src, len] = self.pop_three("memory.copy")?;
                self.push(Expr::MemoryCopy { dest, src, len })?;
            }
            Operator::MemoryFill { mem: 0 } => {
                let [dest, value, len] = self.pop_three("memory.fill")?;
                self.push(Expr::MemoryFill { dest, value, len })?;
            }

            // === Control flow ===
            Operator::Nop => {}
            Operator::Unreachable => self.push(Expr::Unreachable)?,
            Operator::Block { blockty } => {
                let result = self.block_type(blockty)?;
                self.open(FrameKind::Block, result);
            }
            Operator::Loop { blockty } => {
                let result = self.block_type(blockty)?;
                self.open(FrameKind::Loop, result);
            }
            Operator::If { blockty } => {
                let result = self.block_type(blockty)?;
                let condition = self.pop_value("if condition")?;
                self.open(FrameKind::If, result);
                self.top()?.condition = Some(condition);
            }
            Operator::Else => {
                self.settle_result()?;
                let frame = self.top()?;
                if frame.kind != FrameKind::If {
                    bail!(DecompileError::MalformedBody(
                        "else without matching if".to_string()
                    ));
                }
                let then_exprs = std::mem::take(&mut frame.exprs);
                frame.then_arm = Some((then_exprs, frame.unreachable));
                frame.unreachable = false;
                frame.kind = FrameKind::Else;
            }
            Operator::End => self.close()?,

            Operator::Br { relative_depth } => {
                let (pos, label, ty) = self.branch_target(*relative_depth)?;
                let value = self.pop_branch_value(ty, "br")?;
                if pos == 0 {
                    self.push(Expr::Return(value))?;
                } else {
                    self.mark_targeted(pos);
                    self.push(Expr::Br {
                        label,
                        condition: None,
                        value,
                    })?;
                }
            }
            Operator::BrIf { relative_depth } => {
                let (pos, label, ty) = self.branch_target(*relative_depth)?;
                let condition = self.pop_value("br_if condition")?;
                let value = self.pop_branch_value(ty, "br_if")?;
                if pos == 0 && value.is_none() {
                    self.push(Expr::If {
                        condition: Box::new(condition),
                        if_true: Box::new(Expr::Return(None)),
                        if_false: None,
                        ty: WasmType::Void,
                    })?;
                } else {
                    self.mark_targeted(pos);
                    self.push(Expr::Br {
                        label,
                        condition: Some(Box::new(condition)),
                        value,
                    })?;
                }
            }
            Operator::BrTable { targets } => {
                let condition = self.pop_value("br_table index")?;
                let mut labels = Vec::with_capacity(targets.len() as usize);
                for depth in targets.targets() {
                    let depth = depth.context("reading br_table target")?;
                    let (pos, label, _) = self.branch_target(depth)?;
                    self.mark_targeted(pos);
                    labels.push(label);
                }
                let (pos, default, ty) = self.branch_target(targets.default())?;
                self.mark_targeted(pos);
                let value = self.pop_branch_value(ty, "br_table")?;
                self.push(Expr::Switch {
                    labels,
                    default: Some(default),
                    condition: Box::new(condition),
                    value,
                })?;
            }
            Operator::Return => {
                let ty = self.frames.first().map(|f| f.result).unwrap_or(WasmType::Void);
                let value = self.pop_branch_value(ty, "return")?;
                self.push(Expr::Return(value))?;
            }

            Operator::Call { function_index } => {
                let ty = self
                    .ctx
                    .func_types
                    .get(*function_index as usize)
                    .copied()
                    .ok_or_else(|| {
                        DecompileError::MalformedBody(format!(
                            "call to unknown function {}",
                            function_index
                        ))
                    })?;
                let (params, ty) = signature(ty)?;
                let target = self.ctx.func_idents[*function_index as usize];
                let args = self.pop_values(params.len(), "call arguments")?;
                self.push(Expr::Call { target, args, ty })?;
            }
            Operator::CallIndirect {
                type_index,
                table_index,
            } => {
                if *table_index != 0 {
                    bail!(DecompileError::UnsupportedInstruction(format!(
                        "call_indirect through table {}",
                        table_index
                    )));
                }
                let ty = self
                    .ctx
                    .types
                    .get(*type_index as usize)
                    .ok_or_else(|| {
                        DecompileError::MalformedBody(format!(
                            "call_indirect with unknown type {}",
                            type_index
                        ))
                    })?;
                let (params, ty) = signature(ty)?;
                let target = self.pop_value("call_indirect table index")?;
                let args = self.pop_values(params.len(), "call_indirect arguments")?;
                self.push(Expr::CallIndirect {
                    target: Box::new(target),
                    args,
                    ty,
                })?;
            }

            Operator::Drop => {
                let value = self.pop_value("drop")?;
                self.push(Expr::Drop(Box::new(value)))?;
            }
            Operator::Select | Operator::TypedSelect { .. } => {
                let condition = self.pop_value("select condition")?;
                let if_false = self.pop_value("select")?;
                let if_true = self.pop_value("select")?;
                let ty = if_true.ty();
                self.push(Expr::Select {
                    condition: Box::new(condition),
                    if_true: Box::new(if_true),
                    if_false: Box::new(if_false),
                    ty,
                })?;
            }

            _ => bail!(DecompileError::UnsupportedInstruction(format!("{:?}", op))),
        }

        Ok(())
    }

    /// Handles an operator inside dead code. Returns true if the operator
    /// closes the dead region and must be translated normally.
    fn skip_dead(&mut self, op: &Operator) -> Result<bool> {
        match op {
            Operator::Block { .. } | Operator::Loop { .. } | Operator::If { .. } => {
                self.dead_depth += 1;
                Ok(false)
            }
            Operator::End if self.dead_depth > 0 => {
                self.dead_depth -= 1;
                Ok(false)
            }
            Operator::End => Ok(true),
            Operator::Else => Ok(self.dead_depth == 0),
            _ => Ok(false),
        }
    }

    fn local_type(&self, index: u32) -> Result<WasmType> {
        self.local_types
            .get(index as usize)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("local index {} out of range", index))
    }

    fn global_type(&self, index: u32) -> Result<WasmType> {
        self.ctx
            .global_types
            .get(index as usize)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("global index {} out of range", index))
    }

    fn pop_branch_value(&mut self, ty: WasmType, what: &str) -> Result<Option<Box<Expr>>> {
        if ty == WasmType::Void {
            return Ok(None);
        }
        Ok(Some(Box::new(self.pop_value(what)?)))
    }

    fn pop_three(&mut self, what: &str) -> Result<[Box<Expr>; 3]> {
        let c = self.pop_value(what)?;
        let b = self.pop_value(what)?;
        let a = self.pop_value(what)?;
        Ok([Box::new(a), Box::new(b), Box::new(c)])
    }

    /// Emit a binary operation.
    pub(super) fn emit_binop(&mut self, op: BinOp) -> Result<()> {
        let right = self.pop_value("binary operation")?;
        let left = self.pop_value("binary operation")?;
        self.push(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Emit a unary operation.
    pub(super) fn emit_unop(&mut self, op: UnOp) -> Result<()> {
        let value = self.pop_value("unary operation")?;
        self.push(Expr::Unary {
            op,
            value: Box::new(value),
        })
    }

    /// Stack: [addr] -> [value]
    fn emit_load(
        &mut self,
        ty: WasmType,
        memarg: &WasmMemArg,
        bytes: u8,
        signed: bool,
        atomic: bool,
    ) -> Result<()> {
        let ptr = self.pop_value("load")?;
        self.push(Expr::Load {
            ptr: Box::new(ptr),
            arg: MemArg {
                offset: memarg.offset,
                bytes,
                signed,
                atomic,
            },
            ty,
        })
    }

    /// Stack: [addr, value] -> []
    fn emit_store(&mut self, memarg: &WasmMemArg, bytes: u8, atomic: bool) -> Result<()> {
        let value = self.pop_value("store")?;
        let ptr = self.pop_value("store")?;
        self.push(Expr::Store {
            ptr: Box::new(ptr),
            value: Box::new(value),
            arg: MemArg {
                offset: memarg.offset,
                bytes,
                signed: false,
                atomic,
            },
        })
    }
}
