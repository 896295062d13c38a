//! The machine runtime: memory, pointer, program counter, budget
//! accounting and the I/O callbacks, driving one of the two execution
//! strategies.
//!
//! `run` is resumable: it executes until the program completes or the
//! step budget runs out, leaving all state in place so the next call
//! picks up exactly where it stopped. The interpreter strategy honors
//! the budget at instruction granularity; the batching strategy applies
//! a batch's step count only after the whole batch has executed and may
//! therefore overshoot. Callers that need precise suspension should use
//! the interpreter or a batch cap of 1.

use crate::diagnostics::Warning;
use crate::engine::{codegen_available, exec_effect, Engine, Io, State, Unit};
use crate::instr::Instruction;
use crate::io::{Flow, Reader, Writer};
use crate::parse::Program;
use crate::tape::Tape;
use std::fmt;

/// How the machine dispatches instructions. Both strategies are
/// observably equivalent; they differ in dispatch granularity and step
/// accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One instruction per step.
    Interpreter,
    /// Runs of non-branching instructions execute as atomic batches.
    Batched,
}

/// Invalid machine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Cell width must be 8, 16 or 32 bits.
    InvalidCellSize(u32),
    /// The batch cap must be at least 1.
    InvalidBatchCap,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BuildError::InvalidCellSize(bits) => {
                write!(f, "invalid cell size: {} (expected 8, 16 or 32)", bits)
            }
            BuildError::InvalidBatchCap => write!(f, "batch cap must be at least 1"),
        }
    }
}

impl std::error::Error for BuildError {}

/// Configures and builds a [`Machine`].
pub struct MachineBuilder {
    program: Program,
    cell_size: u32,
    cell_count: usize,
    eof: i32,
    reader: Reader,
    writer: Writer,
    strategy: Strategy,
    batch_cap: usize,
    use_codegen: bool,
}

impl MachineBuilder {
    fn new(program: Program) -> MachineBuilder {
        MachineBuilder {
            program,
            cell_size: 8,
            cell_count: 4096,
            eof: -1,
            reader: Reader::default(),
            writer: Writer::default(),
            strategy: Strategy::Batched,
            batch_cap: 200,
            use_codegen: true,
        }
    }

    /// Cell width in bits: 8 (default), 16 or 32.
    pub fn cell_size(mut self, bits: u32) -> MachineBuilder {
        self.cell_size = bits;
        self
    }

    /// Tape length, fixed for the machine's lifetime. Default 4096.
    pub fn cell_count(mut self, cells: usize) -> MachineBuilder {
        self.cell_count = cells;
        self
    }

    /// Value stored by `In` when the reader is exhausted. Default −1,
    /// itself subject to the cell width's wraparound.
    pub fn eof(mut self, value: i32) -> MachineBuilder {
        self.eof = value;
        self
    }

    pub fn read(mut self, reader: impl Into<Reader>) -> MachineBuilder {
        self.reader = reader.into();
        self
    }

    pub fn write(mut self, writer: impl Into<Writer>) -> MachineBuilder {
        self.writer = writer.into();
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> MachineBuilder {
        self.strategy = strategy;
        self
    }

    /// Maximum instructions fused into one batch. Default 200.
    pub fn batch_cap(mut self, cap: usize) -> MachineBuilder {
        self.batch_cap = cap;
        self
    }

    /// Whether batches may be compiled into fused routines at all.
    /// Default true; when the capability probe fails the machine falls
    /// back to sequential batches and records a warning.
    pub fn use_codegen(mut self, enabled: bool) -> MachineBuilder {
        self.use_codegen = enabled;
        self
    }

    pub fn build(self) -> Result<Machine, BuildError> {
        if !matches!(self.cell_size, 8 | 16 | 32) {
            return Err(BuildError::InvalidCellSize(self.cell_size));
        }
        if self.batch_cap == 0 {
            return Err(BuildError::InvalidBatchCap);
        }

        let mut warnings = Vec::new();
        let engine = match self.strategy {
            Strategy::Interpreter => Engine::interpreter(&self.program),
            Strategy::Batched => {
                let fused = self.use_codegen && codegen_available();
                if self.use_codegen && !fused {
                    warnings.push(Warning {
                        message: "fused batch routines are unavailable; \
                                  using sequential batches"
                            .to_owned(),
                        position: None,
                    });
                }
                Engine::batched(&self.program, self.batch_cap, fused)
            }
        };

        Ok(Machine {
            engine,
            state: State {
                tape: Tape::new(self.cell_size, self.cell_count),
                pointer: 0,
            },
            io: Io {
                reader: self.reader,
                writer: self.writer,
                eof: self.eof,
            },
            pc: 0,
            complete: false,
            warnings,
        })
    }
}

/// A machine executing one compiled program. Exclusively owned by its
/// caller; all execution is synchronous.
pub struct Machine {
    engine: Engine,
    state: State,
    io: Io,
    pc: usize,
    complete: bool,
    warnings: Vec<Warning>,
}

impl Machine {
    pub fn builder(program: Program) -> MachineBuilder {
        MachineBuilder::new(program)
    }

    /// True once the program counter has passed the end of the
    /// program. Sticky until the machine is reconstructed.
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Construction-time notices, such as the codegen fallback.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Execute at most `max_steps` primitive instructions, returning
    /// the number actually executed. Batches count all their fused
    /// instructions and are never split, so the return value may
    /// exceed the budget under the batching strategy.
    pub fn run(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps {
            if self.pc >= self.engine.len() {
                self.complete = true;
                break;
            }
            let Machine {
                engine,
                state,
                io,
                pc,
                ..
            } = self;
            match engine {
                Engine::Interpreter(instrs) => {
                    let mut flow = Flow::Continue;
                    match instrs[*pc] {
                        Instruction::Open { pair } => {
                            if state.tape.get(state.pointer) == 0 {
                                *pc = pair;
                            }
                        }
                        Instruction::Close { pair } => {
                            if state.tape.get(state.pointer) != 0 {
                                *pc = pair;
                            }
                        }
                        ins => flow = exec_effect(&ins, state, io),
                    }
                    *pc += 1;
                    steps += 1;
                    if flow == Flow::Interrupt {
                        break;
                    }
                }
                Engine::Batched(units) => {
                    match &mut units[*pc] {
                        Unit::Open { pair } => {
                            if state.tape.get(state.pointer) == 0 {
                                *pc = *pair;
                            }
                            steps += 1;
                        }
                        Unit::Close { pair } => {
                            if state.tape.get(state.pointer) != 0 {
                                *pc = *pair;
                            }
                            steps += 1;
                        }
                        Unit::Step(ins) => {
                            exec_effect(ins, state, io);
                            steps += 1;
                        }
                        Unit::Batch(batch) => {
                            batch.run(state, io);
                            steps += batch.count();
                        }
                    }
                    *pc += 1;
                }
            }
        }
        steps
    }

    /// Run until the program completes, ignoring write interrupts.
    pub fn run_to_completion(&mut self) -> usize {
        let mut total = 0;
        while !self.complete {
            total += self.run(usize::MAX);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, Syntax};
    use std::cell::RefCell;
    use std::rc::Rc;

    const HELLO_WORLD: &str = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>\
                               .>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";

    type Configure = fn(MachineBuilder) -> MachineBuilder;

    // Every behavioral test runs under each strategy variant; the two
    // engines are required to be observably equivalent.
    const VARIANTS: &[Configure] = &[
        |b| b.strategy(Strategy::Interpreter),
        |b| b.strategy(Strategy::Batched),
        |b| b.strategy(Strategy::Batched).use_codegen(false),
        |b| b.strategy(Strategy::Batched).batch_cap(1),
    ];

    fn build(code: &str, configure: Configure) -> (Machine, Rc<RefCell<Vec<i32>>>) {
        let out = Rc::new(RefCell::new(Vec::new()));
        let machine = configure(Machine::builder(parse(code, Syntax::Plain).unwrap()))
            .write(out.clone())
            .build()
            .unwrap();
        (machine, out)
    }

    #[test]
    fn basic_program() {
        for &variant in VARIANTS {
            let (mut machine, out) = build("+.++.-.", variant);
            assert!(!machine.complete());
            let cycles = machine.run_to_completion();
            assert!(machine.complete());
            assert!(cycles > 0);
            assert_eq!(*out.borrow(), vec![1, 3, 2]);
        }
    }

    #[test]
    fn interpreter_counts_each_instruction() {
        let (mut machine, _out) = build("+.++.-.", |b| b.strategy(Strategy::Interpreter));
        assert_eq!(machine.run_to_completion(), 6);
    }

    #[test]
    fn hello_world() {
        for &variant in VARIANTS {
            let (mut machine, out) = build(HELLO_WORLD, variant);
            machine.run_to_completion();
            let text: String = out.borrow().iter().map(|&n| n as u8 as char).collect();
            assert_eq!(text, "Hello World!\n");
        }
    }

    #[test]
    fn budgeted_runs_resume() {
        for &variant in VARIANTS {
            let (mut machine, out) = build(HELLO_WORLD, variant);
            assert!(!machine.complete());
            machine.run(10);
            assert!(!machine.complete());
            machine.run(2000);
            assert!(machine.complete());
            let text: String = out.borrow().iter().map(|&n| n as u8 as char).collect();
            assert_eq!(text, "Hello World!\n");
        }
    }

    #[test]
    fn batches_overshoot_and_report_true_step_count() {
        let (mut machine, out) = build("+.++.-.", |b| b.strategy(Strategy::Batched));
        let steps = machine.run(1);
        assert_eq!(steps, 6);
        assert_eq!(*out.borrow(), vec![1, 3, 2]);
        // Completion is observed at the top of the next call.
        assert!(!machine.complete());
        assert_eq!(machine.run(1), 0);
        assert!(machine.complete());
    }

    #[test]
    fn cell_size_defaults_to_8() {
        for &variant in VARIANTS {
            let (mut machine, out) = build("-.", variant);
            machine.run_to_completion();
            assert_eq!(*out.borrow(), vec![255]);
        }
    }

    #[test]
    fn cell_size_16() {
        let out = Rc::new(RefCell::new(Vec::new()));
        let mut machine = Machine::builder(parse("-.", Syntax::Plain).unwrap())
            .cell_size(16)
            .write(out.clone())
            .build()
            .unwrap();
        machine.run_to_completion();
        assert_eq!(*out.borrow(), vec![65535]);
    }

    #[test]
    fn cell_size_32_surfaces_twos_complement() {
        let out = Rc::new(RefCell::new(Vec::new()));
        let mut machine = Machine::builder(parse("-.", Syntax::Plain).unwrap())
            .cell_size(32)
            .write(out.clone())
            .build()
            .unwrap();
        machine.run_to_completion();
        assert_eq!(*out.borrow(), vec![-1]);
    }

    #[test]
    fn invalid_cell_size_is_a_build_error() {
        let result = Machine::builder(parse("-.", Syntax::Plain).unwrap())
            .cell_size(7)
            .build();
        assert_eq!(result.err(), Some(BuildError::InvalidCellSize(7)));
    }

    #[test]
    fn zero_batch_cap_is_a_build_error() {
        let result = Machine::builder(parse("+", Syntax::Plain).unwrap())
            .batch_cap(0)
            .build();
        assert_eq!(result.err(), Some(BuildError::InvalidBatchCap));
    }

    #[test]
    fn eof_defaults_to_minus_one() {
        for &variant in VARIANTS {
            let (mut machine, out) = build(",.", variant);
            machine.run_to_completion();
            assert_eq!(*out.borrow(), vec![255]);
        }
    }

    #[test]
    fn eof_can_be_zero() {
        let out = Rc::new(RefCell::new(Vec::new()));
        let mut machine = Machine::builder(parse(",.", Syntax::Plain).unwrap())
            .eof(0)
            .write(out.clone())
            .build()
            .unwrap();
        machine.run_to_completion();
        assert_eq!(*out.borrow(), vec![0]);
    }

    #[test]
    fn read_from_function() {
        for &variant in VARIANTS {
            let out = Rc::new(RefCell::new(Vec::new()));
            let mut machine =
                variant(Machine::builder(parse(",.>,.", Syntax::Plain).unwrap()))
                    .read(Reader::from_fn(|| Some(42)))
                    .write(out.clone())
                    .build()
                    .unwrap();
            machine.run_to_completion();
            assert_eq!(*out.borrow(), vec![42, 42]);
        }
    }

    #[test]
    fn read_from_vec() {
        for &variant in VARIANTS {
            let out = Rc::new(RefCell::new(Vec::new()));
            let mut machine =
                variant(Machine::builder(parse(",>,>,>,.<.<.<.", Syntax::Plain).unwrap()))
                    .read(vec![1, 2, 3])
                    .write(out.clone())
                    .build()
                    .unwrap();
            machine.run_to_completion();
            assert_eq!(*out.borrow(), vec![255, 3, 2, 1]);
        }
    }

    #[test]
    fn read_from_string() {
        for &variant in VARIANTS {
            let out = Rc::new(RefCell::new(Vec::new()));
            let mut machine =
                variant(Machine::builder(parse(",>,>,>,.<.<.<.", Syntax::Plain).unwrap()))
                    .read("Abc")
                    .write(out.clone())
                    .build()
                    .unwrap();
            machine.run_to_completion();
            assert_eq!(*out.borrow(), vec![255, 99, 98, 65]);
        }
    }

    #[test]
    fn default_reader_is_exhausted() {
        for &variant in VARIANTS {
            let (mut machine, out) = build(",>,>,>,.<.<.<.", variant);
            machine.run_to_completion();
            assert_eq!(*out.borrow(), vec![255, 255, 255, 255]);
        }
    }

    #[test]
    fn negative_pointer_reads_zero() {
        for &variant in VARIANTS {
            let (mut machine, out) = build("<+.", variant);
            machine.run_to_completion();
            assert_eq!(*out.borrow(), vec![0]);
        }
    }

    #[test]
    fn past_end_writes_drop_and_reads_zero() {
        for &variant in VARIANTS {
            let out = Rc::new(RefCell::new(Vec::new()));
            let mut machine =
                variant(Machine::builder(parse("+.>++.>+++.", Syntax::Plain).unwrap()))
                    .cell_count(2)
                    .write(out.clone())
                    .build()
                    .unwrap();
            machine.run_to_completion();
            assert_eq!(*out.borrow(), vec![1, 2, 0]);
        }
    }

    #[test]
    fn write_interrupt_pauses_interpreter_without_completing() {
        let out = Rc::new(RefCell::new(Vec::new()));
        let sink = out.clone();
        let mut machine = Machine::builder(parse("+.+.+.", Syntax::Plain).unwrap())
            .strategy(Strategy::Interpreter)
            .write(Writer::from_flow_fn(move |value| {
                sink.borrow_mut().push(value);
                Flow::Interrupt
            }))
            .build()
            .unwrap();

        assert!(machine.run(usize::MAX) > 0);
        assert_eq!(*out.borrow(), vec![1]);
        assert!(!machine.complete());

        machine.run(usize::MAX);
        machine.run(usize::MAX);
        machine.run(usize::MAX);
        assert!(machine.complete());
        assert_eq!(*out.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn fused_machines_report_no_warnings() {
        let (machine, _out) = build("+.", |b| b.strategy(Strategy::Batched));
        assert!(machine.warnings().is_empty());
    }

    #[test]
    fn disabling_codegen_is_not_a_fallback() {
        let (machine, _out) = build("+.", |b| {
            b.strategy(Strategy::Batched).use_codegen(false)
        });
        assert!(machine.warnings().is_empty());
    }
}
