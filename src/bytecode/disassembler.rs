//! Human-readable dumps of compiled functions.

use super::function::CompiledFunction;
use super::opcode::{
    instruction_len, read_u16, OpCode, CLOSURE_TERMINATOR, UPVALUE_LOCAL_FLAG,
    UPVALUE_LONG_INDEX_FLAG,
};
use super::value::Value;

/// Disassemble a function and, after it, every function in its constant pool.
pub fn disassemble(func: &CompiledFunction) -> String {
    let mut out = String::new();
    func.walk(&mut |f| {
        if !out.is_empty() {
            out.push('\n');
        }
        disassemble_one(f, &mut out);
    });
    out
}

fn disassemble_one(func: &CompiledFunction, out: &mut String) {
    out.push_str(&format!(
        "== {} at {} (required={}, optional={}, upvalues={}) ==\n",
        func.name, func.location, func.required_params, func.optional_params, func.upvalue_count
    ));
    if !func.constants.is_empty() {
        out.push_str("-- constants --\n");
        for (i, value) in func.constants.iter().enumerate() {
            out.push_str(&format!("{:>4}: {}\n", i, value));
        }
        out.push_str("-- code --\n");
    }

    let code = &func.instructions;
    let mut offset = 0;
    let mut index = 0;
    let mut previous_line = None;
    while offset < code.len() {
        let line = func.line_table.line_at(index);
        let line_str = match line {
            Some(_) if line == previous_line => "   |".to_string(),
            Some(n) => format!("{:4}", n),
            None => "   ?".to_string(),
        };
        previous_line = line;
        out.push_str(&format!("{:04} {} ", offset, line_str));

        let Some(len) = instruction_len(code, offset) else {
            out.push_str(&format!("<invalid byte 0x{:02X}>\n", code[offset]));
            return;
        };
        disassemble_instruction(func, offset, out);
        out.push('\n');
        offset += len;
        index += 1;
    }
}

fn disassemble_instruction(func: &CompiledFunction, offset: usize, out: &mut String) {
    use OpCode::*;

    let code = &func.instructions;
    let byte = |i: usize| code.get(offset + i).copied().unwrap_or(0);
    let wide = |i: usize| read_u16(code, offset + i).unwrap_or(0) as usize;
    let Some(op) = OpCode::from_u8(byte(0)) else {
        return;
    };
    let name = op.name();

    match op {
        LoadValue0 | LoadValue1 | LoadValue2 | LoadValue3 => {
            let index = (op as u8 - LoadValue0 as u8) as usize;
            out.push_str(&format!("{:<16} ({})", name, preview(func, index)));
        }
        LoadValue8 | GetConst8 | GetIvarName8 | SetIvarName8 => {
            let index = byte(1) as usize;
            out.push_str(&format!("{:<16} {:>5} ({})", name, index, preview(func, index)));
        }
        LoadValue16 | GetConst16 | GetIvarName16 | SetIvarName16 => {
            let index = wide(1);
            out.push_str(&format!("{:<16} {:>5} ({})", name, index, preview(func, index)));
        }
        CallMethod8 | CallSelf8 => {
            let index = byte(1) as usize;
            out.push_str(&format!(
                "{:<16} {:>5} ({}) argc={}",
                name,
                index,
                preview(func, index),
                byte(2)
            ));
        }
        CallMethod16 | CallSelf16 => {
            let index = wide(1);
            out.push_str(&format!(
                "{:<16} {:>5} ({}) argc={}",
                name,
                index,
                preview(func, index),
                byte(3)
            ));
        }
        LoadInt8 => out.push_str(&format!("{:<16} {:>5}", name, byte(1) as i8)),
        DefNamespace => {
            let kind = crate::ast::NamespaceKind::from_tag(byte(1))
                .map(|k| k.name())
                .unwrap_or("?");
            out.push_str(&format!("{:<16} {:>5} ({})", name, byte(1), kind));
        }
        Slice => out.push_str(&format!("{:<16} {:>5} {:>5}", name, byte(1), byte(2))),
        _ if op.is_jump() => {
            let distance = wide(1);
            let target = if op == Loop {
                (offset + 3).saturating_sub(distance)
            } else {
                offset + 3 + distance
            };
            out.push_str(&format!("{:<16} {:>5} (-> {:04})", name, distance, target));
        }
        Closure => {
            let index = wide(1);
            out.push_str(&format!("{:<16} {:>5} ({})", name, index, preview(func, index)));
            let captures = closure_captures(code, offset + 3);
            if !captures.is_empty() {
                out.push_str(&format!(" [{}]", captures.join(", ")));
            }
        }
        _ => match op.operand_size() {
            0 => out.push_str(name),
            1 => out.push_str(&format!("{:<16} {:>5}", name, byte(1))),
            _ => out.push_str(&format!("{:<16} {:>5}", name, wide(1))),
        },
    }
}

fn closure_captures(code: &[u8], mut cursor: usize) -> Vec<String> {
    let mut captures = Vec::new();
    while let Some(&flags) = code.get(cursor) {
        if flags == CLOSURE_TERMINATOR {
            break;
        }
        let (index, len) = if flags & UPVALUE_LONG_INDEX_FLAG != 0 {
            (read_u16(code, cursor + 1).unwrap_or(0) as usize, 3)
        } else {
            (code.get(cursor + 1).copied().unwrap_or(0) as usize, 2)
        };
        let source = if flags & UPVALUE_LOCAL_FLAG != 0 {
            "local"
        } else {
            "upvalue"
        };
        captures.push(format!("{} {}", source, index));
        cursor += len;
    }
    captures
}

fn preview(func: &CompiledFunction, index: usize) -> String {
    match func.constants.get(index) {
        Some(Value::Function(f)) => format!("<function: {}>", f.name),
        Some(Value::IvarIndices(table)) => table.to_string(),
        Some(value) => value.to_string(),
        None => "???".to_string(),
    }
}
