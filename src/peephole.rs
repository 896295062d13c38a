//! The peephole passes.
//!
//! Three passes run in a fixed order, each a stream transformation over
//! the previous one's output: run-length contraction, scan-loop
//! recognition, then clear/multiply-loop recognition. Clear-loop
//! recognition relies on contraction having collapsed the leading
//! decrement to a single `Add(-1)`, and both loop passes share the same
//! `Open` lookahead, so the order is load-bearing.
//!
//! The passes never emit a zero-effect instruction: exact-zero `Add`
//! and `Move` results are elided and a multiply with factor 0 is
//! dropped.

use crate::instr::Instruction;
use crate::instr::Instruction::*;
use bitflags::bitflags;
use itertools::Itertools;

bitflags! {
    /// Selects which peephole passes run. `parse` uses `all`.
    pub struct OptFlags: u8 {
        const CONTRACT = 0b001;
        const SCAN_LOOPS = 0b010;
        const CLEAR_LOOPS = 0b100;
    }
}

impl Default for OptFlags {
    fn default() -> OptFlags {
        OptFlags::all()
    }
}

/// Apply the selected passes in their fixed order.
pub fn optimize(instrs: Vec<Instruction>, flags: OptFlags) -> Vec<Instruction> {
    let mut instrs = instrs;
    if flags.contains(OptFlags::CONTRACT) {
        instrs = contract(instrs);
    }
    if flags.contains(OptFlags::SCAN_LOOPS) {
        instrs = scan_loops(instrs);
    }
    if flags.contains(OptFlags::CLEAR_LOOPS) {
        instrs = clear_loops(instrs);
    }
    instrs
}

/// Merge maximal runs of same-kind `Add`/`Move` into one instruction.
fn contract(instrs: Vec<Instruction>) -> Vec<Instruction> {
    instrs
        .into_iter()
        .coalesce(|prev, cur| match (prev, cur) {
            (Add(a), Add(b)) => Ok(Add(a.wrapping_add(b))),
            (Move(a), Move(b)) => Ok(Move(a.wrapping_add(b))),
            (prev, cur) => Err((prev, cur)),
        })
        .filter(|ins| !matches!(ins, Add(0) | Move(0)))
        .collect()
}

/// Rewrite the exact pattern `Open, Move(±1), Close` to a scan
/// instruction. Any deviation re-emits the buffered originals.
fn scan_loops(instrs: Vec<Instruction>) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(instrs.len());
    let mut buf: Vec<Instruction> = Vec::new();

    for ins in instrs {
        match ins {
            Move(1) | Move(-1) if buf.len() == 1 => buf.push(ins),
            Close { .. } if buf.len() == 2 => {
                out.push(if buf[1] == Move(1) { ScanRight } else { ScanLeft });
                buf.clear();
            }
            Open { .. } => {
                out.append(&mut buf);
                buf.push(ins);
            }
            _ => {
                out.append(&mut buf);
                out.push(ins);
            }
        }
    }
    out.append(&mut buf);
    out
}

/// Rewrite decrement-to-zero loops into closed-form arithmetic.
///
/// A loop `Open, Add(-1), { Move(d) Add(a) }*, Close` whose moves sum
/// to zero runs exactly `source` times, adding `source * a` at each
/// visited offset. It becomes one `Mul` per add (in encounter order)
/// followed by a single `Clear`. A second add at the source cell, any
/// other instruction in the body, or a nonzero net offset at the close
/// aborts the rewrite and re-emits the originals verbatim.
fn clear_loops(instrs: Vec<Instruction>) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(instrs.len());
    let mut buf: Vec<Instruction> = Vec::new();
    let mut muls: Vec<Instruction> = Vec::new();
    let mut offset: isize = 0;
    let mut has_dec = false;

    for ins in instrs {
        match ins {
            Add(-1) if !buf.is_empty() && !has_dec && offset == 0 => {
                buf.push(ins);
                has_dec = true;
            }
            Close { .. } if !buf.is_empty() && has_dec && offset == 0 => {
                out.append(&mut muls);
                out.push(Clear);
                buf.clear();
                has_dec = false;
            }
            Move(d) if !buf.is_empty() => {
                buf.push(ins);
                offset += d;
            }
            Add(a) if !buf.is_empty() && offset != 0 => {
                buf.push(ins);
                if a != 0 {
                    muls.push(Mul { offset, factor: a });
                }
            }
            _ => {
                out.append(&mut buf);
                muls.clear();
                offset = 0;
                has_dec = false;
                if matches!(ins, Open { .. }) {
                    buf.push(ins);
                } else {
                    out.push(ins);
                }
            }
        }
    }
    out.append(&mut buf);
    out
}
