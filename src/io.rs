//! Read/write callback normalization.
//!
//! The machine only ever sees one pull shape and one push shape; the
//! conversions here accept the convenient forms (strings, vectors,
//! shared sinks, closures) and produce them.

use std::cell::RefCell;
use std::rc::Rc;

/// Returned by a write callback to either continue or stop the current
/// `run` call. An interrupt stops execution immediately after the write
/// without marking the machine complete; it is honored at instruction
/// granularity by the interpreter strategy and ignored by the batching
/// strategy.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Flow {
    Continue,
    Interrupt,
}

/// A pull source of input values. `None` signals exhaustion.
pub struct Reader(Box<dyn FnMut() -> Option<i32>>);

impl Reader {
    pub fn from_fn(f: impl FnMut() -> Option<i32> + 'static) -> Reader {
        Reader(Box::new(f))
    }

    /// A source that is exhausted from the start.
    pub fn exhausted() -> Reader {
        Reader::from_fn(|| None)
    }

    pub(crate) fn pull(&mut self) -> Option<i32> {
        (self.0)()
    }
}

impl Default for Reader {
    fn default() -> Reader {
        Reader::exhausted()
    }
}

/// Characters are delivered as their scalar values, in order.
impl From<&str> for Reader {
    fn from(s: &str) -> Reader {
        let mut chars: Vec<i32> = s.chars().map(|c| c as i32).collect();
        chars.reverse();
        Reader::from_fn(move || chars.pop())
    }
}

impl From<String> for Reader {
    fn from(s: String) -> Reader {
        Reader::from(s.as_str())
    }
}

impl From<Vec<i32>> for Reader {
    fn from(values: Vec<i32>) -> Reader {
        let mut values = values;
        values.reverse();
        Reader::from_fn(move || values.pop())
    }
}

/// A push sink for output values.
pub struct Writer(Box<dyn FnMut(i32) -> Flow>);

impl Writer {
    pub fn from_fn(mut f: impl FnMut(i32) + 'static) -> Writer {
        Writer(Box::new(move |value| {
            f(value);
            Flow::Continue
        }))
    }

    /// Like `from_fn`, but the callback decides whether to interrupt
    /// the current `run` call.
    pub fn from_flow_fn(f: impl FnMut(i32) -> Flow + 'static) -> Writer {
        Writer(Box::new(f))
    }

    /// Discards everything written to it.
    pub fn sink() -> Writer {
        Writer::from_fn(|_| {})
    }

    pub(crate) fn push(&mut self, value: i32) -> Flow {
        (self.0)(value)
    }
}

impl Default for Writer {
    fn default() -> Writer {
        Writer::sink()
    }
}

/// Appends written values to a shared vector, the usual shape for
/// collecting output.
impl From<Rc<RefCell<Vec<i32>>>> for Writer {
    fn from(sink: Rc<RefCell<Vec<i32>>>) -> Writer {
        Writer::from_fn(move |value| sink.borrow_mut().push(value))
    }
}
