//! The flat instruction stream produced by the tokenizer and rewritten
//! by the peephole passes.
//!
//! Loops are not nested structures: `Open` and `Close` carry the index
//! of their matching boundary, assigned by the loop associator once all
//! structural rewrites are done.

use std::fmt;

/// One instruction of the compiled program.
///
/// `Add`, `Move`, `Out`, `In`, `Open` and `Close` have direct source
/// equivalents. `Clear`, `Mul`, `ScanLeft` and `ScanRight` are produced
/// by the optimizer (and by the extended syntax).
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Instruction {
    /// Add `delta` to the current cell, wrapping at the cell width.
    Add(i32),
    /// Add `delta` to the pointer. No bounds are enforced.
    Move(isize),
    /// Write the current cell through the output callback.
    Out,
    /// Read one value into the current cell, or the EOF sentinel when
    /// the input is exhausted.
    In,
    /// Loop entry; jumps past `pair` when the current cell is zero.
    Open { pair: usize },
    /// Loop exit; jumps past `pair` when the current cell is nonzero.
    Close { pair: usize },
    /// Set the current cell to zero.
    Clear,
    /// `tape[ptr + offset] += tape[ptr] * factor`.
    ///
    /// Only valid immediately before another `Mul` or a `Clear`; the
    /// serializer rejects anything else.
    Mul { offset: isize, factor: i32 },
    /// Move the pointer left until the current cell is zero.
    ScanLeft,
    /// Move the pointer right until the current cell is zero.
    ScanRight,
}

impl Instruction {
    /// True for anything except a loop boundary. Only these may be
    /// fused into a batch.
    pub fn is_straightline(&self) -> bool {
        !matches!(self, Instruction::Open { .. } | Instruction::Close { .. })
    }
}

/// Mnemonic rendering for debugging and traces.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Add(delta) => write!(f, "add {}", delta),
            Instruction::Move(delta) => write!(f, "move {}", delta),
            Instruction::Out => write!(f, "out"),
            Instruction::In => write!(f, "in"),
            Instruction::Open { pair } => write!(f, "open -> {}", pair),
            Instruction::Close { pair } => write!(f, "close -> {}", pair),
            Instruction::Clear => write!(f, "clear"),
            Instruction::Mul { offset, factor } => write!(f, "mul {} {}", offset, factor),
            Instruction::ScanLeft => write!(f, "scan-left"),
            Instruction::ScanRight => write!(f, "scan-right"),
        }
    }
}
