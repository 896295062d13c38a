#![warn(trivial_numeric_casts)]

//! braincrunch is an optimizing compiler and dual-strategy execution
//! engine for BF programs.
//!
//! Source text is tokenized (plain or extended syntax), run through
//! three peephole passes (run-length contraction, scan-loop
//! recognition, clear/multiply-loop recognition), and loop-associated
//! into an immutable [`Program`]. A [`Machine`] executes the program
//! with either a per-instruction interpreter or a batching engine that
//! fuses runs of non-branching instructions, with budgeted, resumable
//! `run` calls.

pub use diagnostics::{highlight, Position, Warning};
pub use instr::Instruction;
pub use io::{Flow, Reader, Writer};
pub use machine::{BuildError, Machine, MachineBuilder, Strategy};
pub use parse::{parse, parse_with_flags, tokenize, ParseError, Program, Syntax};
pub use peephole::{optimize, OptFlags};
pub use serialize::{serialize, SerializeError};

mod diagnostics;
mod engine;
mod instr;
mod io;
mod machine;
mod parse;
mod peephole;
mod serialize;
mod tape;
