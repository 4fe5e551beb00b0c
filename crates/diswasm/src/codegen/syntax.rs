//! C-like spelling of types, numbers and operators.

use crate::ir::{BinOp, IrValue, UnOp, WasmType};
use crate::memory::escape_text;

const TAB: &str = "  ";

/// C name of a value type, narrowed to the access width for integers.
pub fn type_name(ty: WasmType, bytes: Option<u8>) -> &'static str {
    if ty.is_integer() {
        match bytes {
            Some(1) => return "char",
            Some(2) => return "short",
            Some(4) => return "int",
            Some(8) => return "long",
            _ => {}
        }
    }
    match ty {
        WasmType::I32 => "int",
        WasmType::I64 => "long",
        WasmType::F32 => "float",
        WasmType::F64 => "double",
        WasmType::Void => "void",
    }
}

/// Integers in hex (`0x10`, `-0x10`); floats in decimal, always with a point.
pub fn number(value: &IrValue) -> String {
    match *value {
        IrValue::I32(v) => hex(v as i64),
        IrValue::I64(v) => hex(v),
        IrValue::F32(v) => float(v as f64, v.to_string()),
        IrValue::F64(v) => float(v, v.to_string()),
    }
}

pub fn hex(v: i64) -> String {
    if v < 0 {
        format!("-0x{:x}", v.unsigned_abs())
    } else {
        format!("0x{:x}", v)
    }
}

fn float(v: f64, text: String) -> String {
    if v.is_nan() {
        return "NAN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "INFINITY" } else { "-INFINITY" }.to_string();
    }
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Double-quoted literal.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", escape_text(s.as_bytes()))
}

/// `global$N` is shown as `globalN`; other names are kept.
pub fn global_name(name: &str) -> String {
    match name.strip_prefix("global$") {
        Some(rest) => format!("global{}", rest),
        None => name.to_string(),
    }
}

pub fn param_name(index: u32) -> String {
    format!("param{}", index)
}

pub fn local_name(index: u32) -> String {
    format!("local{}", index)
}

pub fn slot_name(offset: i64) -> String {
    format!("local_{:x}", offset)
}

/// Prefixes every line with one indentation step.
pub fn indent(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| format!("{}{}", TAB, line).trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Appends `;` unless the statement closes a brace.
pub fn terminate(stmt: &str) -> String {
    if stmt.ends_with('}') {
        stmt.to_string()
    } else {
        format!("{};", stmt)
    }
}

/// How an operator is spelled around its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// `a op b`
    Infix(&'static str),
    /// `(unsigned T) a op (unsigned T) b`
    UnsignedInfix(&'static str),
    /// `op a`
    Prefix(&'static str),
    /// `f(a[, b])`
    Call(&'static str),
    /// `(T1) (T2) a`, outermost cast first
    Cast(&'static [&'static str]),
}

pub fn binary_template(op: BinOp) -> Template {
    use BinOp::*;
    use Template::*;
    match op {
        I32Add | I64Add | F32Add | F64Add => Infix("+"),
        I32Sub | I64Sub | F32Sub | F64Sub => Infix("-"),
        I32Mul | I64Mul | F32Mul | F64Mul => Infix("*"),
        I32DivS | I64DivS | F32Div | F64Div => Infix("/"),
        I32DivU | I64DivU => UnsignedInfix("/"),
        I32RemS | I64RemS => Infix("%"),
        I32RemU | I64RemU => UnsignedInfix("%"),
        I32And | I64And => Infix("&"),
        I32Or | I64Or => Infix("|"),
        I32Xor | I64Xor => Infix("^"),
        I32Shl | I64Shl => Infix("<<"),
        I32ShrS | I64ShrS => Infix(">>"),
        I32ShrU | I64ShrU => UnsignedInfix(">>"),
        I32Rotl | I64Rotl => Call("__rotl"),
        I32Rotr | I64Rotr => Call("__rotr"),
        I32Eq | I64Eq | F32Eq | F64Eq => Infix("=="),
        I32Ne | I64Ne | F32Ne | F64Ne => Infix("!="),
        I32LtS | I64LtS | F32Lt | F64Lt => Infix("<"),
        I32LtU | I64LtU => UnsignedInfix("<"),
        I32GtS | I64GtS | F32Gt | F64Gt => Infix(">"),
        I32GtU | I64GtU => UnsignedInfix(">"),
        I32LeS | I64LeS | F32Le | F64Le => Infix("<="),
        I32LeU | I64LeU => UnsignedInfix("<="),
        I32GeS | I64GeS | F32Ge | F64Ge => Infix(">="),
        I32GeU | I64GeU => UnsignedInfix(">="),
        F32Min | F64Min => Call("fmin"),
        F32Max | F64Max => Call("fmax"),
        F32Copysign | F64Copysign => Call("copysign"),
    }
}

pub fn unary_template(op: UnOp) -> Template {
    use Template::*;
    use UnOp::*;
    match op {
        I32Clz | I64Clz => Call("__clz"),
        I32Ctz | I64Ctz => Call("__ctz"),
        I32Popcnt | I64Popcnt => Call("__popcnt"),
        I32Eqz | I64Eqz => Prefix("!"),
        F32Abs | F64Abs => Call("fabs"),
        F32Neg | F64Neg => Prefix("-"),
        F32Ceil | F64Ceil => Call("ceil"),
        F32Floor | F64Floor => Call("floor"),
        F32Trunc | F64Trunc => Call("trunc"),
        F32Nearest | F64Nearest => Call("nearbyint"),
        F32Sqrt | F64Sqrt => Call("sqrt"),
        I32WrapI64 => Cast(&["int"]),
        I64ExtendI32S => Cast(&["long"]),
        I64ExtendI32U => Cast(&["long", "unsigned int"]),
        I32Extend8S => Cast(&["int", "char"]),
        I32Extend16S => Cast(&["int", "short"]),
        I64Extend8S => Cast(&["long", "char"]),
        I64Extend16S => Cast(&["long", "short"]),
        I64Extend32S => Cast(&["long", "int"]),
        I32TruncF32S | I32TruncF64S => Cast(&["int"]),
        I32TruncF32U | I32TruncF64U => Cast(&["unsigned int"]),
        I64TruncF32S | I64TruncF64S => Cast(&["long"]),
        I64TruncF32U | I64TruncF64U => Cast(&["unsigned long"]),
        I32TruncSatF32S | I32TruncSatF64S => Call("__trunc_sat_int"),
        I32TruncSatF32U | I32TruncSatF64U => Call("__trunc_sat_uint"),
        I64TruncSatF32S | I64TruncSatF64S => Call("__trunc_sat_long"),
        I64TruncSatF32U | I64TruncSatF64U => Call("__trunc_sat_ulong"),
        F32ConvertI32S | F32ConvertI64S | F32DemoteF64 => Cast(&["float"]),
        F32ConvertI32U => Cast(&["float", "unsigned int"]),
        F32ConvertI64U => Cast(&["float", "unsigned long"]),
        F64ConvertI32S | F64ConvertI64S | F64PromoteF32 => Cast(&["double"]),
        F64ConvertI32U => Cast(&["double", "unsigned int"]),
        F64ConvertI64U => Cast(&["double", "unsigned long"]),
        I32ReinterpretF32 => Call("__bits_int"),
        I64ReinterpretF64 => Call("__bits_long"),
        F32ReinterpretI32 => Call("__bits_float"),
        F64ReinterpretI64 => Call("__bits_double"),
    }
}

/// Unsigned C type matching the operand width of an integer operator.
pub fn unsigned_operand(op: BinOp) -> &'static str {
    use BinOp::*;
    match op {
        I64DivU | I64RemU | I64ShrU | I64LtU | I64GtU | I64LeU | I64GeU => "unsigned long",
        _ => "unsigned int",
    }
}

/// Renders a binary operator. Operands arrive already parenthesized if needed.
pub fn apply_binary(op: BinOp, left: &str, right: &str) -> String {
    match binary_template(op) {
        Template::Infix(sym) => format!("{} {} {}", left, sym, right),
        Template::UnsignedInfix(sym) => {
            let ty = unsigned_operand(op);
            format!("({}) {} {} ({}) {}", ty, left, sym, ty, right)
        }
        Template::Call(f) => format!("{}({}, {})", f, left, right),
        Template::Prefix(sym) => format!("{}{} {}", sym, left, right),
        Template::Cast(types) => format!("{} {}", casts(types), left),
    }
}

/// Renders a unary operator.
pub fn apply_unary(op: UnOp, value: &str) -> String {
    match unary_template(op) {
        Template::Prefix(sym) => format!("{}{}", sym, value),
        Template::Call(f) => format!("{}({})", f, value),
        Template::Cast(types) => format!("{} {}", casts(types), value),
        Template::Infix(sym) | Template::UnsignedInfix(sym) => format!("{} {}", sym, value),
    }
}

fn casts(types: &[&str]) -> String {
    types
        .iter()
        .map(|t| format!("({})", t))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_follow_width() {
        assert_eq!(type_name(WasmType::I32, Some(1)), "char");
        assert_eq!(type_name(WasmType::I64, Some(2)), "short");
        assert_eq!(type_name(WasmType::I64, None), "long");
        assert_eq!(type_name(WasmType::F32, Some(4)), "float");
        assert_eq!(type_name(WasmType::Void, None), "void");
    }

    #[test]
    fn numbers() {
        assert_eq!(number(&IrValue::I32(16)), "0x10");
        assert_eq!(number(&IrValue::I32(-16)), "-0x10");
        assert_eq!(number(&IrValue::I64(i64::MIN)), "-0x8000000000000000");
        assert_eq!(number(&IrValue::F64(2.0)), "2.0");
        assert_eq!(number(&IrValue::F32(0.1)), "0.1");
        assert_eq!(number(&IrValue::F64(f64::NAN)), "NAN");
        assert_eq!(number(&IrValue::F64(f64::NEG_INFINITY)), "-INFINITY");
    }

    #[test]
    fn operator_templates() {
        assert_eq!(apply_binary(BinOp::I32Add, "a", "b"), "a + b");
        assert_eq!(
            apply_binary(BinOp::I64DivU, "a", "b"),
            "(unsigned long) a / (unsigned long) b"
        );
        assert_eq!(apply_binary(BinOp::I32Rotl, "a", "b"), "__rotl(a, b)");
        assert_eq!(apply_unary(UnOp::I32Eqz, "a"), "!a");
        assert_eq!(
            apply_unary(UnOp::I64ExtendI32U, "a"),
            "(long) (unsigned int) a"
        );
        assert_eq!(apply_unary(UnOp::F64Sqrt, "a"), "sqrt(a)");
    }

    #[test]
    fn layout_helpers() {
        assert_eq!(indent("a\n{\n  b\n}"), "  a\n  {\n    b\n  }");
        assert_eq!(indent("a\n\nb"), "  a\n\n  b");
        assert_eq!(terminate("x = 1"), "x = 1;");
        assert_eq!(terminate("label$1: {\n}"), "label$1: {\n}");
        assert_eq!(global_name("global$3"), "global3");
        assert_eq!(global_name("__stack_pointer"), "__stack_pointer");
        assert_eq!(slot_name(0x1c), "local_1c");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }
}
