//! Turning source text into a resolved instruction stream.
//!
//! Two syntax modes exist. Plain mode is the eight classic operators
//! with everything else ignored. Extended mode additionally strips `//`
//! comments, accepts `^` as an explicit clear, numeric run-length
//! prefixes on `+ - > <` (a parenthesized count is negated) and the
//! chainable multiply operator `offset:factor*`, which must be
//! terminated by `^`.
//!
//! `parse` runs the tokenizer, the peephole passes and finally the loop
//! associator. Association must come last: it records absolute
//! instruction indices, so no pass may move instructions afterwards.

use crate::diagnostics::Position;
use crate::instr::Instruction;
use crate::peephole::{optimize, OptFlags};
use std::fmt;

/// The two accepted source dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Plain,
    Extended,
}

/// Compilation failure: either a malformed extended-syntax token or an
/// unbalanced loop. No partial program is ever produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Syntax { message: String, position: Position },
    UnmatchedOpen,
    UnmatchedClose,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Syntax { message, position } => {
                write!(f, "{} (at {:?})", message, position)
            }
            ParseError::UnmatchedOpen => write!(f, "this [ has no matching ]"),
            ParseError::UnmatchedClose => write!(f, "this ] has no matching ["),
        }
    }
}

impl std::error::Error for ParseError {}

fn syntax_error(message: &str, start: usize, end: usize) -> ParseError {
    ParseError::Syntax {
        message: message.to_owned(),
        position: Position { start, end },
    }
}

// Placeholder pair index before association. `Program::new` rewrites
// every pair, so the value is never observable through a `Program`.
const UNPAIRED: usize = usize::MAX;

/// An ordered instruction sequence with every `Open`/`Close` pair
/// mutually resolved. Constructing one runs the loop associator, so a
/// `Program` in hand is structurally valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    instrs: Vec<Instruction>,
}

impl Program {
    /// Validate bracket structure and resolve all jump targets.
    /// Incoming `pair` values are ignored and rewritten.
    pub fn new(mut instrs: Vec<Instruction>) -> Result<Program, ParseError> {
        associate_loops(&mut instrs)?;
        Ok(Program { instrs })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instrs
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }
}

/// Compile `source` with all optimizations enabled.
pub fn parse(source: &str, syntax: Syntax) -> Result<Program, ParseError> {
    parse_with_flags(source, syntax, OptFlags::all())
}

/// Compile `source`, running only the peephole passes named in `flags`.
pub fn parse_with_flags(
    source: &str,
    syntax: Syntax,
    flags: OptFlags,
) -> Result<Program, ParseError> {
    let tokens = tokenize(source, syntax)?;
    Program::new(optimize(tokens, flags))
}

/// Produce the primitive instruction sequence for `source` without
/// optimizing or resolving loops.
pub fn tokenize(source: &str, syntax: Syntax) -> Result<Vec<Instruction>, ParseError> {
    match syntax {
        Syntax::Plain => Ok(plain_tokens(source).collect()),
        Syntax::Extended => {
            let stripped = strip_comments(source);
            ExtScanner::new(&stripped).collect()
        }
    }
}

fn plain_tokens(source: &str) -> impl Iterator<Item = Instruction> + '_ {
    source.chars().filter_map(|c| match c {
        '+' => Some(Instruction::Add(1)),
        '-' => Some(Instruction::Add(-1)),
        '>' => Some(Instruction::Move(1)),
        '<' => Some(Instruction::Move(-1)),
        '.' => Some(Instruction::Out),
        ',' => Some(Instruction::In),
        '[' => Some(Instruction::Open { pair: UNPAIRED }),
        ']' => Some(Instruction::Close { pair: UNPAIRED }),
        _ => None,
    })
}

// Blank out `//`-to-end-of-line comments instead of deleting them, so
// error positions still index the caller's text.
fn strip_comments(source: &str) -> Vec<u8> {
    let mut out = source.as_bytes().to_vec();
    let mut i = 0;
    while i < out.len() {
        if out[i] == b'/' && out.get(i + 1) == Some(&b'/') {
            while i < out.len() && out[i] != b'\n' {
                out[i] = b' ';
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    out
}

/// Lazy scanner for the extended syntax. Restartable only by building a
/// new one.
struct ExtScanner<'a> {
    src: &'a [u8],
    pos: usize,
    pending_mul: bool,
    finished: bool,
}

impl<'a> ExtScanner<'a> {
    fn new(src: &'a [u8]) -> ExtScanner<'a> {
        ExtScanner {
            src,
            pos: 0,
            pending_mul: false,
            finished: false,
        }
    }

    // A multiply must be part of a chain ending in a clear; anything
    // else after a pending multiply is an error.
    fn emit(&mut self, token: Instruction, at: usize) -> Result<Instruction, ParseError> {
        match token {
            Instruction::Mul { .. } => self.pending_mul = true,
            Instruction::Clear => self.pending_mul = false,
            _ if self.pending_mul => {
                return Err(syntax_error(
                    "multiply operator must be followed by a multiply or clear",
                    at,
                    at,
                ));
            }
            _ => {}
        }
        Ok(token)
    }

    // Parses `(?digits)?`, returning the signed value, or `None` when
    // the cursor is not on a numeric literal at all.
    fn scan_number(&mut self) -> Result<Option<i32>, ParseError> {
        let start = self.pos;
        let open = self.src.get(self.pos) == Some(&b'(');
        if open {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while matches!(self.src.get(self.pos), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            self.pos = start;
            return Ok(None);
        }
        // The slice is ASCII digits by construction.
        let digits = std::str::from_utf8(&self.src[digits_start..self.pos]).unwrap();
        let magnitude: i32 = digits.parse().map_err(|_| {
            syntax_error("numeric literal out of range", start, self.pos - 1)
        })?;
        let close = self.src.get(self.pos) == Some(&b')');
        if close {
            self.pos += 1;
        }
        if open != close {
            return Err(syntax_error(
                "unmatched parenthesis in numeric literal",
                start,
                self.pos - 1,
            ));
        }
        Ok(Some(if open { -magnitude } else { magnitude }))
    }

    // Cursor sits on a digit or '('. Either a run-length prefix, a
    // multiply operator, or a stray number (skipped, like any other
    // unrecognized text).
    fn scan_numeric(&mut self, at: usize) -> Result<Option<Instruction>, ParseError> {
        let count = match self.scan_number()? {
            Some(count) => count,
            None => {
                // A bare '(' with no digits is not a literal.
                self.pos = at + 1;
                return Ok(None);
            }
        };
        match self.src.get(self.pos) {
            Some(b':') => {
                self.pos += 1;
                let factor_at = self.pos;
                let factor = self.scan_number()?.ok_or_else(|| {
                    syntax_error("expected a factor after ':'", factor_at, factor_at)
                })?;
                if self.src.get(self.pos) != Some(&b'*') {
                    return Err(syntax_error(
                        "expected '*' after multiply operands",
                        at,
                        self.pos.saturating_sub(1),
                    ));
                }
                self.pos += 1;
                if count == 0 {
                    return Err(syntax_error(
                        "multiply operator offset must not be zero",
                        at,
                        self.pos - 1,
                    ));
                }
                Ok(Some(Instruction::Mul {
                    offset: count as isize,
                    factor,
                }))
            }
            Some(b'+') => {
                self.pos += 1;
                Ok(Some(Instruction::Add(count)))
            }
            Some(b'-') => {
                self.pos += 1;
                Ok(Some(Instruction::Add(-count)))
            }
            Some(b'>') => {
                self.pos += 1;
                Ok(Some(Instruction::Move(count as isize)))
            }
            Some(b'<') => {
                self.pos += 1;
                Ok(Some(Instruction::Move(-(count as isize))))
            }
            _ => Ok(None),
        }
    }
}

impl<'a> Iterator for ExtScanner<'a> {
    type Item = Result<Instruction, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos >= self.src.len() {
                if self.pending_mul && !self.finished {
                    self.finished = true;
                    let at = self.src.len().saturating_sub(1);
                    return Some(Err(syntax_error(
                        "multiply operator must be followed by a multiply or clear",
                        at,
                        at,
                    )));
                }
                return None;
            }
            let at = self.pos;
            let c = self.src[self.pos];
            self.pos += 1;
            let token = match c {
                b'+' => Instruction::Add(1),
                b'-' => Instruction::Add(-1),
                b'>' => Instruction::Move(1),
                b'<' => Instruction::Move(-1),
                b'.' => Instruction::Out,
                b',' => Instruction::In,
                b'[' => Instruction::Open { pair: UNPAIRED },
                b']' => Instruction::Close { pair: UNPAIRED },
                b'^' => Instruction::Clear,
                b'*' => {
                    return Some(Err(syntax_error(
                        "* must be preceded by offset:factor",
                        at,
                        at,
                    )));
                }
                b'(' | b'0'..=b'9' => {
                    self.pos = at;
                    match self.scan_numeric(at) {
                        Ok(Some(token)) => token,
                        Ok(None) => continue,
                        Err(err) => return Some(Err(err)),
                    }
                }
                _ => continue,
            };
            return Some(self.emit(token, at));
        }
    }
}

/// Resolve matching `Open`/`Close` pairs into direct jump targets.
///
/// Must run after every structural rewrite; it records absolute
/// positions.
fn associate_loops(instrs: &mut [Instruction]) -> Result<(), ParseError> {
    let mut opens = Vec::new();
    for pc in 0..instrs.len() {
        match instrs[pc] {
            Instruction::Open { .. } => opens.push(pc),
            Instruction::Close { .. } => {
                let open_pc = opens.pop().ok_or(ParseError::UnmatchedClose)?;
                instrs[open_pc] = Instruction::Open { pair: pc };
                instrs[pc] = Instruction::Close { pair: open_pc };
            }
            _ => {}
        }
    }
    if opens.is_empty() {
        Ok(())
    } else {
        Err(ParseError::UnmatchedOpen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::Instruction::*;
    use pretty_assertions::assert_eq;

    fn ext(source: &str) -> Result<Vec<Instruction>, ParseError> {
        tokenize(source, Syntax::Extended)
    }

    #[test]
    fn plain_tokenizes_primitives() {
        assert_eq!(
            tokenize("+-><.,", Syntax::Plain).unwrap(),
            vec![Add(1), Add(-1), Move(1), Move(-1), Out, In]
        );
    }

    #[test]
    fn plain_skips_unrecognized_characters() {
        assert_eq!(tokenize("foo! bar\n", Syntax::Plain).unwrap(), vec![]);
    }

    #[test]
    fn extended_accepts_run_length_prefixes() {
        assert_eq!(
            ext("3+2-4>5<").unwrap(),
            vec![Add(3), Add(-2), Move(4), Move(-5)]
        );
    }

    #[test]
    fn extended_parenthesized_count_negates() {
        assert_eq!(ext("(3)+(2)>").unwrap(), vec![Add(-3), Move(-2)]);
    }

    #[test]
    fn extended_clear_operator() {
        assert_eq!(ext("^").unwrap(), vec![Clear]);
    }

    #[test]
    fn extended_multiply_chain() {
        assert_eq!(
            ext("(1):2*2:3*^").unwrap(),
            vec![
                Mul {
                    offset: -1,
                    factor: 2
                },
                Mul {
                    offset: 2,
                    factor: 3
                },
                Clear
            ]
        );
    }

    #[test]
    fn extended_strips_comments() {
        assert_eq!(
            ext("++ // add twice\n>").unwrap(),
            vec![Add(1), Add(1), Move(1)]
        );
    }

    #[test]
    fn extended_skips_stray_numbers() {
        assert_eq!(ext("12^").unwrap(), vec![Clear]);
    }

    #[test]
    fn extended_rejects_bare_star() {
        assert!(matches!(ext("*"), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn extended_rejects_zero_offset_multiply() {
        assert!(matches!(ext("0:2*^"), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn extended_rejects_unterminated_multiply_chain() {
        assert!(matches!(ext("1:2*"), Err(ParseError::Syntax { .. })));
        assert!(matches!(ext("1:2*+^"), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn extended_rejects_multiply_missing_star() {
        assert!(matches!(ext("1:2^"), Err(ParseError::Syntax { .. })));
        assert!(matches!(ext("1:^"), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn extended_rejects_unmatched_paren_in_literal() {
        assert!(matches!(ext("(5+"), Err(ParseError::Syntax { .. })));
        assert!(matches!(ext("5)+"), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn extended_reports_positions_in_original_text() {
        let err = ext("++ // ok\n*").unwrap_err();
        match err {
            ParseError::Syntax { position, .. } => {
                assert_eq!(position, Position { start: 9, end: 9 });
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn association_resolves_pairs() {
        let program = parse("[[]]", Syntax::Plain).unwrap();
        assert_eq!(
            program.instructions(),
            &[
                Open { pair: 3 },
                Open { pair: 2 },
                Close { pair: 1 },
                Close { pair: 0 }
            ]
        );
    }

    #[test]
    fn unmatched_open_fails() {
        assert_eq!(parse("[[", Syntax::Plain), Err(ParseError::UnmatchedOpen));
        assert_eq!(parse("[][", Syntax::Plain), Err(ParseError::UnmatchedOpen));
    }

    #[test]
    fn unmatched_close_fails() {
        assert_eq!(parse("]", Syntax::Plain), Err(ParseError::UnmatchedClose));
        assert_eq!(parse("][", Syntax::Plain), Err(ParseError::UnmatchedClose));
    }

    #[test]
    fn program_new_rewrites_stale_pairs() {
        let program = Program::new(vec![
            Open { pair: 99 },
            Add(1),
            Close { pair: 99 },
        ])
        .unwrap();
        assert_eq!(
            program.instructions(),
            &[Open { pair: 2 }, Add(1), Close { pair: 0 }]
        );
    }
}
