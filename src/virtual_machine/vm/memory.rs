use crate::virtual_machine::errors::Fault;

/// Default number of data memory cells.
pub const DEFAULT_MEMORY_CELLS: usize = 0xFFFF;

/// Flat data memory of `i64` cells addressed by `STORE` and `RECALL`.
///
/// Every cell starts at zero. Addresses are signed as they come off the
/// operand stack; anything outside `0..size` is a fault.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Memory {
    cells: Vec<i64>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Self {
            cells: vec![0; size],
        }
    }

    /// Number of cells.
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    fn index(&self, address: i64, offset: usize) -> Result<usize, Fault> {
        usize::try_from(address)
            .ok()
            .filter(|&a| a < self.cells.len())
            .ok_or(Fault::MemoryOutOfBounds {
                offset,
                address,
                size: self.cells.len(),
            })
    }

    /// Reads the cell at `address` for the instruction at `offset`.
    pub fn get(&self, address: i64, offset: usize) -> Result<i64, Fault> {
        let index = self.index(address, offset)?;
        Ok(self.cells[index])
    }

    /// Writes `value` into the cell at `address` for the instruction at `offset`.
    pub fn set(&mut self, address: i64, value: i64, offset: usize) -> Result<(), Fault> {
        let index = self.index(address, offset)?;
        self.cells[index] = value;
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CELLS)
    }
}
