//! Stack-frame reconstruction for functions compiled at `-O0`.
//!
//! At `-O0` LLVM keeps every value in a local and spills variables to a
//! frame carved out of the shadow stack:
//!
//! ```text
//! local.set $a (global.get $sp)        ;; a = sp
//! local.set $b (i32.const 16)          ;; b = frame size
//! local.set $c (i32.sub $a $b)         ;; c = frame base
//! i32.store offset=12 $c (param 0)     ;; spill
//! ```
//!
//! Locals are treated as registers: a `local.set` records the value and
//! prints nothing, a `local.get` prints the recorded value. Accesses through
//! the frame base become named stack slots (`local_c` above).

use super::lower::Lower;
use super::node::Node;
use super::render::Renderer;
use super::syntax::{local_name, slot_name, type_name};
use super::{function_text, header, Disassembler};
use crate::error::DecompileError;
use crate::ir::{BinOp, ExpandedModule, Function, IrValue, MemArg, WasmType};
use crate::memory::MemoryImage;
use crate::stat;
use anyhow::{bail, Result};
use log::{debug, warn};
use std::collections::BTreeSet;

pub struct FrameGenerator<'m> {
    module: &'m ExpandedModule,
    memory: &'m MemoryImage,
    frame_size: i64,
}

impl<'m> FrameGenerator<'m> {
    pub fn new(module: &'m ExpandedModule, memory: &'m MemoryImage, frame_size: i64) -> Self {
        Self {
            module,
            memory,
            frame_size,
        }
    }
}

impl Disassembler for FrameGenerator<'_> {
    fn disassemble(&self, func: &Function) -> Result<String> {
        let mut lowering = FrameLowering {
            module: self.module,
            memory: self.memory,
            func,
            stack_pointer: stat::backend(self.module).stack_pointer(),
            registers: vec![None; func.locals().len()],
            materialized: BTreeSet::new(),
            layout: FrameLayout::default(),
        };
        let statements = lowering.body_statements()?;
        debug!(
            "{}: frame of {} bytes, {} slots, {} plain locals",
            self.module.function_name(func),
            self.frame_size,
            lowering.layout.slots.len(),
            lowering.materialized.len()
        );

        let mut decls = lowering.layout.declarations();
        for index in &lowering.materialized {
            let ty = func.local_type(*index).unwrap_or(WasmType::I32);
            decls.push(format!(
                "// local index={}\n{} {};",
                index,
                type_name(ty, None),
                local_name(*index)
            ));
        }

        let mut renderer = Renderer::with_frame(&lowering.layout);
        let lines: Vec<String> = statements
            .iter()
            .filter_map(|s| renderer.statement(s))
            .collect();

        let head = header(self.module, func, 0, "Decompilation");
        Ok(function_text(head, &decls, &lines))
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: i64,
    size: u8,
    ty: WasmType,
}

impl Slot {
    fn end(&self) -> i64 {
        self.offset + self.size as i64
    }

    fn contains(&self, offset: i64) -> bool {
        offset >= self.offset && offset < self.end()
    }
}

/// Stack slots discovered so far, in discovery order.
#[derive(Debug, Default)]
pub struct FrameLayout {
    slots: Vec<Slot>,
}

impl FrameLayout {
    /// Slot covering `offset`, as (slot start, distance into the slot).
    pub fn slot_at(&self, offset: i64) -> Option<(i64, i64)> {
        self.slots
            .iter()
            .find(|s| s.contains(offset))
            .map(|s| (s.offset, offset - s.offset))
    }

    /// Slot for an access of `bytes` at `offset`, created on first use.
    ///
    /// An access that runs past the end of the slot it starts in, or into a
    /// slot that starts after it, has no slot.
    fn resolve(&mut self, offset: i64, bytes: u8, ty: WasmType) -> Option<(i64, i64)> {
        let end = offset + bytes as i64;
        if let Some(slot) = self.slots.iter().find(|s| s.contains(offset)) {
            if end > slot.end() {
                warn!(
                    "access of {} bytes at frame offset {:#x} straddles {}",
                    bytes,
                    offset,
                    slot_name(slot.offset)
                );
                return None;
            }
            return Some((slot.offset, offset - slot.offset));
        }
        if let Some(next) = self.slots.iter().find(|s| s.offset > offset && s.offset < end) {
            warn!(
                "access of {} bytes at frame offset {:#x} runs into {}",
                bytes,
                offset,
                slot_name(next.offset)
            );
            return None;
        }
        self.slots.push(Slot {
            offset,
            size: bytes,
            ty,
        });
        Some((offset, 0))
    }

    fn declarations(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|s| {
                format!(
                    "// offset={:#x}\n{} {};",
                    s.offset,
                    type_name(s.ty, Some(s.size)),
                    slot_name(s.offset)
                )
            })
            .collect()
    }
}

struct FrameLowering<'m, 'f> {
    module: &'m ExpandedModule,
    memory: &'m MemoryImage,
    func: &'f Function,
    stack_pointer: Option<u32>,
    /// Last value assigned to each declared local.
    registers: Vec<Option<Node>>,
    /// Locals printed as variables instead of being propagated.
    materialized: BTreeSet<u32>,
    layout: FrameLayout,
}

impl FrameLowering<'_, '_> {
    fn register(&self, index: u32) -> Result<usize> {
        let slot = index as usize - self.func.params.len();
        if slot >= self.registers.len() {
            bail!(DecompileError::MalformedBody(format!(
                "local index {} out of range",
                index
            )));
        }
        Ok(slot)
    }

    fn is_stack_pointer(&self, index: u32) -> bool {
        self.stack_pointer == Some(index)
    }

    /// Offset from the frame base addressed by `ptr + offset`.
    fn frame_offset(ptr: &Node, offset: u64) -> Option<i64> {
        let base = match ptr {
            Node::StackBase => 0,
            Node::StackAddress(c) => *c,
            _ => return None,
        };
        let offset = base.checked_add(i64::try_from(offset).ok()?)?;
        (offset >= 0).then_some(offset)
    }
}

fn int_const(node: &Node) -> Option<i64> {
    match node {
        Node::Const { value, .. } => value.as_integer(),
        _ => None,
    }
}

impl Lower for FrameLowering<'_, '_> {
    fn module(&self) -> &ExpandedModule {
        self.module
    }

    fn function(&self) -> &Function {
        self.func
    }

    fn local_get(&mut self, index: u32) -> Result<Node> {
        if (index as usize) < self.func.params.len() {
            return Ok(Node::Param(index));
        }
        let slot = self.register(index)?;
        if self.materialized.contains(&index) {
            return Ok(Node::Local(index));
        }
        match &self.registers[slot] {
            Some(value) => Ok(value.clone()),
            None => {
                self.materialized.insert(index);
                Ok(Node::Local(index))
            }
        }
    }

    fn local_set(&mut self, index: u32, value: Node, tee: bool) -> Result<Node> {
        if (index as usize) < self.func.params.len() {
            return Ok(Node::Assign {
                target: Box::new(Node::Param(index)),
                value: Box::new(value),
            });
        }
        let slot = self.register(index)?;
        if self.materialized.contains(&index) || value.has_side_effects() {
            self.materialized.insert(index);
            self.registers[slot] = None;
            return Ok(Node::Assign {
                target: Box::new(Node::Local(index)),
                value: Box::new(value),
            });
        }
        self.registers[slot] = Some(value.clone());
        Ok(if tee { value } else { Node::Nop })
    }

    fn global_get(&mut self, index: u32) -> Node {
        if self.is_stack_pointer(index) {
            Node::StackPointer
        } else {
            Node::Global(self.global_display(index))
        }
    }

    fn global_set(&mut self, index: u32, value: Node) -> Node {
        if self.is_stack_pointer(index) {
            return Node::Nop;
        }
        Node::Assign {
            target: Box::new(Node::Global(self.global_display(index))),
            value: Box::new(value),
        }
    }

    fn constant(&mut self, value: IrValue) -> Node {
        let text = value
            .as_integer()
            .and_then(|addr| self.memory.string_at(addr));
        Node::Const { value, text }
    }

    fn binary(&mut self, op: BinOp, left: Node, right: Node) -> Node {
        let constant = int_const(&left).or(int_const(&right));
        if op.is_add() || op.is_sub() {
            let touches_sp =
                matches!(left, Node::StackPointer) || matches!(right, Node::StackPointer);
            if touches_sp && constant.is_some() {
                return Node::StackBase;
            }
        }
        if op.is_add() {
            if let Some(c) = constant {
                match (&left, &right) {
                    (Node::StackBase, _) | (_, Node::StackBase) => return Node::StackAddress(c),
                    (Node::StackAddress(a), _) | (_, Node::StackAddress(a)) => {
                        return Node::StackAddress(a + c)
                    }
                    _ => {}
                }
            }
        }
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn load(&mut self, ptr: Node, arg: &MemArg, ty: WasmType) -> Node {
        if let Some(offset) = Self::frame_offset(&ptr, arg.offset) {
            if let Some((start, diff)) = self.layout.resolve(offset, arg.bytes, ty) {
                return Node::Slot {
                    offset: start,
                    diff,
                };
            }
        }
        Node::Deref {
            ptr: Box::new(ptr),
            offset: arg.offset,
            ty: super::lower::access_type(ty, arg),
        }
    }

    fn store(&mut self, ptr: Node, value: Node, value_ty: WasmType, arg: &MemArg) -> Node {
        if let Some(offset) = Self::frame_offset(&ptr, arg.offset) {
            if let Some((start, diff)) = self.layout.resolve(offset, arg.bytes, value_ty) {
                return Node::Assign {
                    target: Box::new(Node::Slot {
                        offset: start,
                        diff,
                    }),
                    value: Box::new(value),
                };
            }
        }
        Node::Assign {
            target: Box::new(Node::Deref {
                ptr: Box::new(ptr),
                offset: arg.offset,
                ty: super::lower::access_type(value_ty, arg),
            }),
            value: Box::new(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expand_module;
    use crate::parser::parse_wasm;

    const PROLOGUE: &str = r#"
        (local.set 1 (global.get $sp))
        (local.set 2 (i32.const 32))
        (local.set 3 (i32.sub (local.get 1) (local.get 2)))
        (global.set $sp (local.get 3))
    "#;

    fn decompile(wat: &str) -> String {
        let wasm = wat::parse_str(wat).unwrap();
        let module = expand_module(&parse_wasm(&wasm).unwrap()).unwrap();
        let memory = MemoryImage::from_segments(&module.data_segments).unwrap();
        let func = module
            .functions
            .iter()
            .find(|f| !f.is_imported())
            .unwrap();
        FrameGenerator::new(&module, &memory, 32)
            .disassemble(func)
            .unwrap()
    }

    #[test]
    fn spilled_parameter_becomes_named_slot() {
        let text = decompile(
            r#"(module
                (global $sp (mut i32) (i32.const 65536))
                (func $store_and_load (param i32) (result i32) (local i32 i32 i32 i32)
                    (local.set 1 (global.get $sp))
                    (local.set 2 (i32.const 16))
                    (local.set 3 (i32.sub (local.get 1) (local.get 2)))
                    (global.set $sp (local.get 3))
                    (i32.store offset=12 (local.get 3) (local.get 0))
                    (local.set 4 (i32.load offset=12 (local.get 3)))
                    (global.set $sp (i32.add (local.get 3) (i32.const 16)))
                    (local.get 4)))"#,
        );
        assert_eq!(
            text,
            "// O[0] Decompilation of $func0, known as store_and_load\n\
             int store_and_load(int param0) {\n  \
             // offset=0xc\n  int local_c;\n\n  \
             local_c = param0;\n  \
             return local_c;\n}\n"
        );
    }

    #[test]
    fn accesses_share_and_straddle_slots() {
        let text = decompile(&format!(
            r#"(module
                (import "env" "use" (func $use (param i32)))
                (global $sp (mut i32) (i32.const 65536))
                (func (param i32) (local i32 i32 i32)
                    {}
                    (i32.store8 offset=8 (local.get 3) (i32.const 65))
                    (i64.store offset=16 (local.get 3) (i64.const 0))
                    (i32.store offset=20 (local.get 3) (i32.const 1))
                    (i32.store offset=6 (local.get 3) (i32.const 2))
                    (call $use (i32.add (local.get 3) (i32.const 16)))
                    (call $use (i32.add (local.get 3) (i32.const 20)))))"#,
            PROLOGUE
        ));
        assert!(text.contains("  // offset=0x8\n  char local_8;\n"));
        assert!(text.contains("  // offset=0x10\n  long local_10;\n"));
        assert!(text.contains("  local_8 = 0x41;\n"));
        assert!(text.contains("  local_10 = 0x0;\n"));
        assert!(text.contains("  *(&local_10 + 4) = 0x1;\n"));
        assert!(text.contains("  *((int *) __stack_base + 0x6) = 0x2;\n"));
        assert!(text.contains("  use(&local_10);\n"));
        assert!(text.contains("  use(&local_10[4]);\n"));
    }

    #[test]
    fn side_effects_are_kept_in_plain_locals() {
        let text = decompile(&format!(
            r#"(module
                (import "env" "next" (func $next (result i32)))
                (import "env" "use" (func $use (param i32)))
                (global $sp (mut i32) (i32.const 65536))
                (func (param i32) (local i32 i32 i32 i32)
                    {}
                    (local.set 4 (call $next))
                    (call $use (local.get 4))
                    (call $use (local.get 4))))"#,
            PROLOGUE
        ));
        assert!(text.contains("  // local index=4\n  int local4;\n"));
        assert_eq!(text.matches("local4 = next();").count(), 1);
        assert_eq!(text.matches("use(local4);").count(), 2);
    }

    #[test]
    fn string_constants_are_annotated() {
        let text = decompile(&format!(
            r#"(module
                (import "env" "puts" (func $puts (param i32)))
                (global $sp (mut i32) (i32.const 65536))
                (memory 1)
                (data (i32.const 1024) "hello\00")
                (func (param i32) (local i32 i32 i32)
                    {}
                    (call $puts (i32.const 1024))
                    (call $puts (i32.const 1026))))"#,
            PROLOGUE
        ));
        assert!(text.contains("  puts(0x400 /* \"hello\" */);\n"));
        assert!(text.contains("  puts(0x402 /* \"llo\" */);\n"));
    }

    #[test]
    fn frame_base_at_slot_zero_is_its_address() {
        let text = decompile(&format!(
            r#"(module
                (import "env" "use" (func $use (param i32)))
                (global $sp (mut i32) (i32.const 65536))
                (func (param i32) (local i32 i32 i32)
                    {}
                    (i32.store (local.get 3) (local.get 0))
                    (call $use (local.get 3))))"#,
            PROLOGUE
        ));
        assert!(text.contains("  local_0 = param0;\n"));
        assert!(text.contains("  use(&local_0);\n"));
    }

    #[test]
    fn layout_lookup() {
        let mut layout = FrameLayout::default();
        assert_eq!(layout.resolve(4, 4, WasmType::I32), Some((4, 0)));
        assert_eq!(layout.resolve(6, 2, WasmType::I32), Some((4, 2)));
        assert_eq!(layout.resolve(6, 4, WasmType::I32), None);
        assert_eq!(layout.resolve(0, 8, WasmType::I64), None);
        assert_eq!(layout.slot_at(7), Some((4, 3)));
        assert_eq!(layout.slot_at(8), None);
        assert_eq!(layout.slots.len(), 1);
    }
}
