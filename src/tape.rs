//! Fixed-width wraparound cell memory.
//!
//! Cells are stored as `u32` and masked down to the configured width
//! after every write, so 8, 16 and 32 bit tapes share one
//! representation. The pointer is unconstrained: reads outside the tape
//! yield 0 and writes outside it are dropped.

pub(crate) struct Tape {
    cells: Vec<u32>,
    mask: u32,
}

impl Tape {
    /// `cell_size` must already be validated as 8, 16 or 32.
    pub(crate) fn new(cell_size: u32, cell_count: usize) -> Tape {
        let mask = if cell_size == 32 {
            u32::MAX
        } else {
            (1 << cell_size) - 1
        };
        Tape {
            cells: vec![0; cell_count],
            mask,
        }
    }

    pub(crate) fn get(&self, index: isize) -> u32 {
        if index >= 0 {
            self.cells.get(index as usize).copied().unwrap_or(0)
        } else {
            0
        }
    }

    pub(crate) fn set(&mut self, index: isize, value: u32) {
        if index >= 0 {
            if let Some(cell) = self.cells.get_mut(index as usize) {
                *cell = value & self.mask;
            }
        }
    }

    pub(crate) fn add(&mut self, index: isize, delta: i32) {
        let value = self.get(index).wrapping_add(delta as u32);
        self.set(index, value);
    }

    pub(crate) fn mul_into(&mut self, index: isize, offset: isize, factor: i32) {
        let product = self.get(index).wrapping_mul(factor as u32);
        let value = self.get(index + offset).wrapping_add(product);
        self.set(index + offset, value);
    }
}
