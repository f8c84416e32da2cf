//! Bytecode disassembler
//!
//! Converts chunks back to a human-readable listing. Used for debugging,
//! testing, and `ghost disasm` output.

use super::{Chunk, Opcode};
use crate::heap::Heap;
use crate::value::Value;
use std::fmt::Write;

/// Disassemble a whole chunk
///
/// # Format
/// ```text
/// == main ==
/// 0000    1 Constant            0 '1'
/// 0002    | Return
/// ```
pub fn disassemble(chunk: &Chunk, name: &str, heap: &Heap) -> String {
    let mut output = String::new();
    writeln!(output, "== {} ==", name).unwrap();
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, heap, &mut output);
    }
    output
}

/// Disassemble a single instruction at `offset`, appending to `out`
///
/// Returns the offset of the next instruction.
pub fn disassemble_instruction(
    chunk: &Chunk,
    offset: usize,
    heap: &Heap,
    out: &mut String,
) -> usize {
    write!(out, "{:04} ", offset).unwrap();
    if offset > 0 && chunk.line_at(offset) == chunk.line_at(offset - 1) {
        write!(out, "   | ").unwrap();
    } else {
        write!(out, "{:4} ", chunk.line_at(offset)).unwrap();
    }

    let byte = chunk.code[offset];
    let opcode = match Opcode::try_from(byte) {
        Ok(op) => op,
        Err(_) => {
            writeln!(out, "<invalid opcode {:#04x}>", byte).unwrap();
            return offset + 1;
        }
    };

    match opcode {
        // Simple opcodes (no operands)
        Opcode::Null
        | Opcode::True
        | Opcode::False
        | Opcode::Pop
        | Opcode::Equal
        | Opcode::Greater
        | Opcode::Less
        | Opcode::Add
        | Opcode::Subtract
        | Opcode::Multiply
        | Opcode::Divide
        | Opcode::Not
        | Opcode::Negate
        | Opcode::Print
        | Opcode::CloseUpvalue
        | Opcode::Return
        | Opcode::Inherit
        | Opcode::IndexSubscr
        | Opcode::StoreSubscr => {
            writeln!(out, "{:?}", opcode).unwrap();
            offset + 1
        }

        // 1-byte constant index
        Opcode::Constant
        | Opcode::GetGlobal
        | Opcode::DefineGlobal
        | Opcode::SetGlobal
        | Opcode::GetProperty
        | Opcode::SetProperty
        | Opcode::GetSuper
        | Opcode::Class
        | Opcode::Method => {
            let index = chunk.code[offset + 1];
            writeln!(
                out,
                "{:<16} {:4} '{}'",
                format!("{:?}", opcode),
                index,
                constant_display(chunk, index, heap)
            )
            .unwrap();
            offset + 2
        }

        // 1-byte slot index or argument count
        Opcode::GetLocal
        | Opcode::SetLocal
        | Opcode::GetUpvalue
        | Opcode::SetUpvalue
        | Opcode::Call => {
            let operand = chunk.code[offset + 1];
            writeln!(out, "{:<16} {:4}", format!("{:?}", opcode), operand).unwrap();
            offset + 2
        }

        // 2-byte jump offsets
        Opcode::Jump | Opcode::JumpIfFalse => {
            let jump = read_u16(chunk, offset + 1);
            let target = offset + 3 + jump as usize;
            writeln!(
                out,
                "{:<16} {:4} -> {}",
                format!("{:?}", opcode),
                offset,
                target
            )
            .unwrap();
            offset + 3
        }
        Opcode::Loop => {
            let jump = read_u16(chunk, offset + 1);
            let target = offset + 3 - jump as usize;
            writeln!(out, "{:<16} {:4} -> {}", "Loop", offset, target).unwrap();
            offset + 3
        }

        // name index + argument count
        Opcode::Invoke | Opcode::SuperInvoke => {
            let index = chunk.code[offset + 1];
            let argc = chunk.code[offset + 2];
            writeln!(
                out,
                "{:<16} ({} args) {:4} '{}'",
                format!("{:?}", opcode),
                argc,
                index,
                constant_display(chunk, index, heap)
            )
            .unwrap();
            offset + 3
        }

        // function constant followed by upvalue descriptor pairs
        Opcode::Closure => {
            let index = chunk.code[offset + 1];
            writeln!(
                out,
                "{:<16} {:4} {}",
                "Closure",
                index,
                constant_display(chunk, index, heap)
            )
            .unwrap();
            let upvalue_count = match chunk.constants.get(index as usize) {
                Some(Value::Obj(r)) => heap.function(*r).upvalue_count,
                _ => 0,
            };
            let mut next = offset + 2;
            for _ in 0..upvalue_count {
                let is_local = chunk.code[next];
                let slot = chunk.code[next + 1];
                writeln!(
                    out,
                    "{:04}    |                   {} {}",
                    next,
                    if is_local == 1 { "local" } else { "upvalue" },
                    slot
                )
                .unwrap();
                next += 2;
            }
            next
        }

        // 2-byte element count
        Opcode::BuildList => {
            let count = read_u16(chunk, offset + 1);
            writeln!(out, "{:<16} {:4}", "BuildList", count).unwrap();
            offset + 3
        }
    }
}

fn read_u16(chunk: &Chunk, offset: usize) -> u16 {
    ((chunk.code[offset] as u16) << 8) | chunk.code[offset + 1] as u16
}

fn constant_display(chunk: &Chunk, index: u8, heap: &Heap) -> String {
    match chunk.constants.get(index as usize) {
        Some(value) => value.to_display_string(heap),
        None => "<missing constant>".to_string(),
    }
}
