//! Keypad matrix.
//!
//! Eight rows of eight columns; the host posts key transitions with a key
//! id whose low three bits pick the row and whose high bits pick the
//! column. The firmware scans rows through port 0x09 (see [`crate::io`]).
//! Key 0x0F is the power key and asserts the whole row-7 mask except bit 0.

/// Key id of the power key.
pub const POWER_KEY: u8 = 0x0F;

/// Pressed-key bitmap, one byte per row.
#[derive(Debug, Clone)]
pub struct Keypad {
    pub matrix: [u8; 8],
}

impl Keypad {
    pub fn new() -> Self {
        Keypad { matrix: [0; 8] }
    }

    pub fn reset(&mut self) {
        self.matrix = [0; 8];
    }

    /// Post one key transition. Ids above the 8×8 matrix are ignored.
    pub fn set(&mut self, id: u8, down: bool) {
        if id >= 0x40 {
            return;
        }
        let row = (id % 8) as usize;
        let bits = if id == POWER_KEY { 0xFE } else { 1 << (id / 8) };
        if down {
            self.matrix[row] |= bits;
        } else {
            self.matrix[row] &= !bits;
        }
    }

    /// OR of every row, used by the any-key scan.
    pub fn rows_or(&self) -> u8 {
        self.matrix.iter().fold(0, |acc, &row| acc | row)
    }

    /// Wake-up code reported for a key pressed while asleep.
    ///
    /// Only the function-key block wakes the machine; 0x0E (download) does
    /// not.
    pub fn wake_code(id: u8) -> Option<u8> {
        match id {
            0x08 => Some(0x00),
            0x09 => Some(0x0A),
            0x0A => Some(0x08),
            0x0B => Some(0x06),
            0x0C => Some(0x04),
            0x0D => Some(0x02),
            0x0F => Some(0x00),
            _ => None,
        }
    }
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}
