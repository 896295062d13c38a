//! Rendering an instruction stream back to source text.
//!
//! The output is a semantic inverse of parsing: re-parsing it yields a
//! stream with the same runtime effect, not necessarily the same text.
//! `Mul` instructions have no standalone source form; they buffer until
//! the `Clear` that terminates the group and render either as the
//! expanded decrement loop (plain mode) or as a multiply-operator chain
//! (extended mode). A `Mul` followed by anything else is an error.

use crate::instr::Instruction;
use crate::instr::Instruction::*;
use crate::parse::Syntax;
use std::fmt;

/// A `Mul` was not immediately followed by another `Mul` or a `Clear`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeError {
    pub message: String,
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SerializeError {}

fn orphaned_mul() -> SerializeError {
    SerializeError {
        message: "multiply must be followed by a multiply or clear".to_owned(),
    }
}

/// Render `instrs` as source text in the given syntax mode.
pub fn serialize(instrs: &[Instruction], syntax: Syntax) -> Result<String, SerializeError> {
    let mut out = String::new();
    let mut muls: Vec<(isize, i32)> = Vec::new();

    for ins in instrs {
        if let Mul { offset, factor } = *ins {
            muls.push((offset, factor));
            continue;
        }
        match *ins {
            Add(delta) => push_run(&mut out, delta as i64, '+', '-', syntax),
            Move(delta) => push_run(&mut out, delta as i64, '>', '<', syntax),
            Out => out.push('.'),
            In => out.push(','),
            Open { .. } => out.push('['),
            Close { .. } => out.push(']'),
            ScanLeft => out.push_str("[<]"),
            ScanRight => out.push_str("[>]"),
            Clear => render_clear(&mut out, &mut muls, syntax),
            Mul { .. } => unreachable!(),
        }
        if !muls.is_empty() {
            return Err(orphaned_mul());
        }
    }
    if !muls.is_empty() {
        return Err(orphaned_mul());
    }
    Ok(out)
}

fn push_run(out: &mut String, delta: i64, pos_ch: char, neg_ch: char, syntax: Syntax) {
    let (ch, count) = if delta >= 0 {
        (pos_ch, delta)
    } else {
        (neg_ch, -delta)
    };
    if count == 0 {
        return;
    }
    if syntax == Syntax::Extended && count != 1 {
        out.push_str(&count.to_string());
        out.push(ch);
    } else {
        for _ in 0..count {
            out.push(ch);
        }
    }
}

fn render_clear(out: &mut String, muls: &mut Vec<(isize, i32)>, syntax: Syntax) {
    match syntax {
        Syntax::Plain => {
            // Expand the group back into the decrement loop it came
            // from, walking to each target offset and returning to the
            // source cell before the close.
            out.push_str("[-");
            let mut position = 0isize;
            for &(offset, factor) in muls.iter() {
                push_run(out, (offset - position) as i64, '>', '<', Syntax::Plain);
                push_run(out, factor as i64, '+', '-', Syntax::Plain);
                position = offset;
            }
            push_run(out, -(position as i64), '>', '<', Syntax::Plain);
            out.push(']');
        }
        Syntax::Extended => {
            for &(offset, factor) in muls.iter() {
                out.push_str(&ext_number(offset as i64));
                out.push(':');
                out.push_str(&ext_number(factor as i64));
                out.push('*');
            }
            out.push('^');
        }
    }
    muls.clear();
}

fn ext_number(n: i64) -> String {
    if n < 0 {
        format!("({})", -n)
    } else {
        n.to_string()
    }
}
