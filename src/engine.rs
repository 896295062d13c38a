//! Execution units and the two dispatch strategies.
//!
//! The interpreter strategy walks the instruction stream directly. The
//! batching strategy pre-groups maximal runs of non-branching
//! instructions into units: each run becomes one `Batch` whose body is
//! either a single fused routine (a callable composed once at
//! construction) or the equivalent instruction list executed in
//! sequence. Loop boundaries stay singleton units and are re-associated
//! at unit granularity, so branches remain O(1) in either strategy.

use crate::instr::Instruction;
use crate::io::{Flow, Reader, Writer};
use crate::parse::Program;
use crate::tape::Tape;

/// Tape and pointer; the mutable half of a machine that instructions
/// act on.
pub(crate) struct State {
    pub(crate) tape: Tape,
    pub(crate) pointer: isize,
}

/// The caller-supplied callbacks plus the EOF sentinel applied when the
/// reader is exhausted.
pub(crate) struct Io {
    pub(crate) reader: Reader,
    pub(crate) writer: Writer,
    pub(crate) eof: i32,
}

/// Apply one non-branching instruction. Loop boundaries are dispatched
/// by the machine run loop, which owns the program counter.
pub(crate) fn exec_effect(ins: &Instruction, state: &mut State, io: &mut Io) -> Flow {
    match *ins {
        Instruction::Add(delta) => state.tape.add(state.pointer, delta),
        Instruction::Move(delta) => state.pointer += delta,
        Instruction::Clear => state.tape.set(state.pointer, 0),
        Instruction::Mul { offset, factor } => {
            state.tape.mul_into(state.pointer, offset, factor)
        }
        Instruction::Out => return io.writer.push(state.tape.get(state.pointer) as i32),
        Instruction::In => {
            let value = io.reader.pull().unwrap_or(io.eof);
            state.tape.set(state.pointer, value as u32);
        }
        Instruction::ScanLeft => {
            while state.tape.get(state.pointer) != 0 {
                state.pointer -= 1;
            }
        }
        Instruction::ScanRight => {
            while state.tape.get(state.pointer) != 0 {
                state.pointer += 1;
            }
        }
        Instruction::Open { .. } | Instruction::Close { .. } => {
            unreachable!("loop boundaries are never executed as effects")
        }
    }
    Flow::Continue
}

type Routine = Box<dyn FnMut(&mut State, &mut Io)>;

fn compile_effect(ins: Instruction) -> Routine {
    match ins {
        Instruction::Add(delta) => Box::new(move |state, _| state.tape.add(state.pointer, delta)),
        Instruction::Move(delta) => Box::new(move |state, _| state.pointer += delta),
        Instruction::Clear => Box::new(|state, _| state.tape.set(state.pointer, 0)),
        Instruction::Mul { offset, factor } => {
            Box::new(move |state, _| state.tape.mul_into(state.pointer, offset, factor))
        }
        Instruction::Out => Box::new(|state, io| {
            io.writer.push(state.tape.get(state.pointer) as i32);
        }),
        Instruction::In => Box::new(|state, io| {
            let value = io.reader.pull().unwrap_or(io.eof);
            state.tape.set(state.pointer, value as u32);
        }),
        Instruction::ScanLeft => Box::new(|state, _| {
            while state.tape.get(state.pointer) != 0 {
                state.pointer -= 1;
            }
        }),
        Instruction::ScanRight => Box::new(|state, _| {
            while state.tape.get(state.pointer) != 0 {
                state.pointer += 1;
            }
        }),
        Instruction::Open { .. } | Instruction::Close { .. } => {
            unreachable!("loop boundaries are never batched")
        }
    }
}

/// Compose the instructions of a batch into one callable routine.
fn fuse(instrs: &[Instruction]) -> Routine {
    let mut routine: Routine = Box::new(|_, _| {});
    for &ins in instrs {
        let mut effect = compile_effect(ins);
        let mut prev = routine;
        routine = Box::new(move |state, io| {
            prev(state, io);
            effect(state, io);
        });
    }
    routine
}

/// Check once, at machine construction, that fused routines behave:
/// build a small routine and verify its effects against the expected
/// state. Falls back to sequential batches when this fails.
pub(crate) fn codegen_available() -> bool {
    let mut state = State {
        tape: Tape::new(8, 4),
        pointer: 0,
    };
    let mut io = Io {
        reader: Reader::exhausted(),
        writer: Writer::sink(),
        eof: -1,
    };
    let mut probe = fuse(&[
        Instruction::Add(2),
        Instruction::Move(1),
        Instruction::Add(3),
    ]);
    probe(&mut state, &mut io);
    state.pointer == 1 && state.tape.get(0) == 2 && state.tape.get(1) == 3
}

enum Body {
    Fused(Routine),
    Listed(Vec<Instruction>),
}

/// A run of non-branching instructions executed atomically. Reports a
/// step count equal to the instructions it fused, applied to the budget
/// only after the whole batch completes.
pub(crate) struct Batch {
    count: usize,
    body: Body,
}

impl Batch {
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn run(&mut self, state: &mut State, io: &mut Io) {
        match &mut self.body {
            Body::Fused(routine) => routine(state, io),
            Body::Listed(instrs) => {
                for ins in instrs {
                    exec_effect(ins, state, io);
                }
            }
        }
    }
}

pub(crate) enum Unit {
    Open { pair: usize },
    Close { pair: usize },
    Step(Instruction),
    Batch(Batch),
}

pub(crate) enum Engine {
    Interpreter(Vec<Instruction>),
    Batched(Vec<Unit>),
}

impl Engine {
    pub(crate) fn interpreter(program: &Program) -> Engine {
        Engine::Interpreter(program.instructions().to_vec())
    }

    pub(crate) fn batched(program: &Program, cap: usize, fused: bool) -> Engine {
        let mut units = Vec::new();
        let mut buf: Vec<Instruction> = Vec::new();
        for &ins in program.instructions() {
            if ins.is_straightline() {
                if buf.len() < cap {
                    buf.push(ins);
                } else {
                    flush(&mut units, &mut buf, fused);
                    units.push(Unit::Step(ins));
                }
            } else {
                flush(&mut units, &mut buf, fused);
                units.push(match ins {
                    Instruction::Open { .. } => Unit::Open { pair: 0 },
                    _ => Unit::Close { pair: 0 },
                });
            }
        }
        flush(&mut units, &mut buf, fused);
        associate_units(&mut units);
        Engine::Batched(units)
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Engine::Interpreter(instrs) => instrs.len(),
            Engine::Batched(units) => units.len(),
        }
    }
}

fn flush(units: &mut Vec<Unit>, buf: &mut Vec<Instruction>, fused: bool) {
    if buf.is_empty() {
        return;
    }
    if buf.len() == 1 {
        units.push(Unit::Step(buf[0]));
        buf.clear();
        return;
    }
    let count = buf.len();
    let body = if fused {
        let routine = fuse(buf);
        buf.clear();
        Body::Fused(routine)
    } else {
        Body::Listed(std::mem::take(buf))
    };
    units.push(Unit::Batch(Batch { count, body }));
}

// Pairs must be re-resolved at unit granularity; unit indices have
// nothing to do with instruction indices.
fn associate_units(units: &mut [Unit]) {
    let mut opens = Vec::new();
    for pc in 0..units.len() {
        match units[pc] {
            Unit::Open { .. } => opens.push(pc),
            Unit::Close { .. } => {
                // The program was structurally validated at parse time.
                let open_pc = opens.pop().expect("balanced loops in validated program");
                units[open_pc] = Unit::Open { pair: pc };
                units[pc] = Unit::Close { pair: open_pc };
            }
            _ => {}
        }
    }
    debug_assert!(opens.is_empty());
}
