//! NOR flash command state machine.
//!
//! CPU writes into the 0x4000..0xC000 window while a NOR bank is mapped do
//! not hit memory; they walk this state machine, which models the chip's
//! JEDEC-style command protocol:
//!
//! ```text
//! step 0 ── 0x5555<-AA ──> 1 ── 0xAAAA<-55 ──> 2 ── 0x5555<-cmd ──> 3
//!
//! cmd: 0x90 identify   0xA0 program byte    0x80 erase prefix
//!      0xA8 buffered   0x88 buffer erase    0x78 (reserved)
//! ```
//!
//! Programming can only clear bits (`dest &= value`, as real flash does);
//! erases fill with 0xFF. Program and sector-erase flush the bank scratch
//! through [`Hal::save_nor_page`]; the full-chip erase goes through
//! [`Hal::wipe_nor_flash`]. After a program or sector erase completes, the
//! next read from the window returns the 0x88 "write complete" sentinel
//! once. Any write a step does not accept drops the machine back to step 0
//! (the dedicated 0x8000<-F0 reset included).

use crate::hal::Hal;

/// Flash command state. All of it is captured by the snapshot.
#[derive(Debug, Clone)]
pub struct FlashCtl {
    /// Position in the unlock/command walk, 0..=6.
    pub step: u8,
    /// Selected command, 1..=6; meaningful while `step >= 3`.
    pub ty: u8,
    /// Bank captured at identify time.
    pub bank: u8,
    pub bak1: u8,
    pub bak2: u8,
    /// Buffered-program scratch.
    pub buf: [u8; 0x100],
}

impl FlashCtl {
    pub fn new() -> Self {
        FlashCtl { step: 0, ty: 0, bank: 0, bak1: 0, bak2: 0, buf: [0; 0x100] }
    }

    /// Power-on reset clears the walk and the program buffer; the command
    /// type and identify backups are battery-backed and survive.
    pub fn reset(&mut self) {
        self.buf = [0; 0x100];
        self.step = 0;
    }

    /// True when the next window read must return the completion sentinel.
    pub fn read_pending(&self) -> bool {
        (self.step == 4 && self.ty == 2) || (self.step == 6 && self.ty == 3)
    }

    /// Consume the completion sentinel.
    pub fn finish_read(&mut self) {
        self.step = 0;
    }

    /// Feed one CPU write at `addr` (0x4000..0xC000) into the machine.
    ///
    /// `bank` is the currently mapped NOR page; its image is accessed and
    /// flushed through `hal`.
    pub fn write<H: Hal>(&mut self, hal: &mut H, bank: u8, addr: u16, value: u8) {
        match self.step {
            0 => {
                if addr == 0x5555 && value == 0xAA {
                    self.step = 1;
                }
                return;
            }
            1 => {
                if addr == 0xAAAA && value == 0x55 {
                    self.step = 2;
                    return;
                }
            }
            2 => {
                if addr == 0x5555 {
                    let ty = match value {
                        0x90 => 1,
                        0xA0 => 2,
                        0x80 => 3,
                        0xA8 => 4,
                        0x88 => 5,
                        0x78 => 6,
                        _ => 0,
                    };
                    if ty != 0 {
                        self.ty = ty;
                        if ty == 1 {
                            self.bank = bank;
                            let page = hal.page();
                            self.bak1 = page[0x4000];
                            // The second capture lands in bak1 as well;
                            // bak2 keeps whatever it held before. Restore
                            // writes both back, so the pair must stay
                            // byte-compatible with the original record.
                            self.bak1 = page[0x4001];
                        }
                        self.step = 3;
                        return;
                    }
                }
            }
            3 => match self.ty {
                1 => {
                    if value == 0xF0 {
                        let page = hal.page_mut();
                        page[0x4000] = self.bak1;
                        page[0x4001] = self.bak2;
                        if !hal.save_nor_page(bank) {
                            log::warn!("NOR page {bank:#04x} flush failed after identify restore");
                        }
                        self.step = 0;
                        return;
                    }
                }
                2 => {
                    hal.page_mut()[(addr - 0x4000) as usize] &= value;
                    if !hal.save_nor_page(bank) {
                        log::warn!("NOR page {bank:#04x} flush failed after program");
                    }
                    self.step = 4;
                    return;
                }
                4 => {
                    self.buf[(addr & 0xFF) as usize] &= value;
                    self.step = 4;
                    return;
                }
                3 | 5 => {
                    if addr == 0x5555 && value == 0xAA {
                        self.step = 4;
                        return;
                    }
                }
                _ => {}
            },
            4 => {
                if (self.ty == 3 || self.ty == 5) && addr == 0xAAAA && value == 0x55 {
                    self.step = 5;
                    return;
                }
            }
            5 => {
                if addr == 0x5555 && value == 0x10 {
                    if !hal.wipe_nor_flash() {
                        log::warn!("NOR chip erase failed");
                    }
                    if self.ty == 5 {
                        self.buf = [0xFF; 0x100];
                    }
                    self.step = 6;
                    return;
                }
                if self.ty == 3 && value == 0x30 {
                    // Erase the 2 KiB sector containing addr within the bank.
                    let start = addr as usize - addr as usize % 0x800 - 0x4000;
                    hal.page_mut()[start..start + 0x800].fill(0xFF);
                    if !hal.save_nor_page(bank) {
                        log::warn!("NOR page {bank:#04x} flush failed after sector erase");
                    }
                    self.step = 6;
                    return;
                }
                if self.ty == 5 && value == 0x48 {
                    self.buf = [0xFF; 0x100];
                    self.step = 6;
                    return;
                }
            }
            _ => {}
        }
        // Unaccepted write: abort the walk.
        self.step = 0;
    }
}

impl Default for FlashCtl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{Hal, MemHal};
    use crate::PAGE_SIZE;

    fn unlocked(hal: &mut MemHal, ctl: &mut FlashCtl, cmd: u8) {
        ctl.write(hal, 0, 0x5555, 0xAA);
        ctl.write(hal, 0, 0xAAAA, 0x55);
        ctl.write(hal, 0, 0x5555, cmd);
    }

    #[test]
    fn test_unlock_walk() {
        let mut hal = MemHal::new();
        hal.load_nor_page(0);
        let mut ctl = FlashCtl::new();
        ctl.write(&mut hal, 0, 0x5555, 0xAA);
        assert_eq!(ctl.step, 1);
        ctl.write(&mut hal, 0, 0xAAAA, 0x55);
        assert_eq!(ctl.step, 2);
        ctl.write(&mut hal, 0, 0x5555, 0xA0);
        assert_eq!(ctl.step, 3);
        assert_eq!(ctl.ty, 2);
    }

    #[test]
    fn test_mismatch_resets_walk() {
        let mut hal = MemHal::new();
        hal.load_nor_page(0);
        let mut ctl = FlashCtl::new();
        ctl.write(&mut hal, 0, 0x5555, 0xAA);
        ctl.write(&mut hal, 0, 0x4000, 0x12);
        assert_eq!(ctl.step, 0);
    }

    #[test]
    fn test_program_byte_clears_bits_and_flushes() {
        let mut hal = MemHal::new();
        hal.load_nor_page(0);
        let mut ctl = FlashCtl::new();
        unlocked(&mut hal, &mut ctl, 0xA0);
        ctl.write(&mut hal, 0, 0x5000, 0x42);
        assert_eq!(hal.page()[0x1000], 0x42);
        assert_eq!(hal.nor[0x1000], 0x42);
        assert_eq!(hal.nor_saves, 1);
        assert_eq!(ctl.step, 4);
        assert!(ctl.read_pending());
    }

    #[test]
    fn test_program_is_and_only() {
        let mut hal = MemHal::new();
        hal.nor[0x1000] = 0x0F;
        hal.load_nor_page(0);
        let mut ctl = FlashCtl::new();
        unlocked(&mut hal, &mut ctl, 0xA0);
        ctl.write(&mut hal, 0, 0x5000, 0xF1);
        assert_eq!(hal.nor[0x1000], 0x01);
    }

    #[test]
    fn test_sector_erase_round_trip() {
        let mut hal = MemHal::new();
        for b in hal.nor[0x1800..0x2000].iter_mut() {
            *b = 0x00;
        }
        hal.load_nor_page(0);
        let mut ctl = FlashCtl::new();
        unlocked(&mut hal, &mut ctl, 0x80);
        ctl.write(&mut hal, 0, 0x5555, 0xAA);
        ctl.write(&mut hal, 0, 0xAAAA, 0x55);
        ctl.write(&mut hal, 0, 0x5801, 0x30); // inside the 0x5800 sector
        assert_eq!(ctl.step, 6);
        assert!(hal.nor[0x1800..0x2000].iter().all(|&b| b == 0xFF));
        // Neighboring sectors untouched.
        assert_eq!(hal.nor[0x2000], 0xFF);
        assert!(ctl.read_pending());
        ctl.finish_read();
        assert_eq!(ctl.step, 0);
    }

    #[test]
    fn test_chip_erase() {
        let mut hal = MemHal::new();
        hal.nor[5] = 0;
        hal.nor[PAGE_SIZE + 9] = 0;
        hal.load_nor_page(0);
        let mut ctl = FlashCtl::new();
        unlocked(&mut hal, &mut ctl, 0x80);
        ctl.write(&mut hal, 0, 0x5555, 0xAA);
        ctl.write(&mut hal, 0, 0xAAAA, 0x55);
        ctl.write(&mut hal, 0, 0x5555, 0x10);
        assert_eq!(hal.nor_wipes, 1);
        assert_eq!(ctl.step, 6);
        assert!(hal.nor.iter().all(|&b| b == 0xFF));
        // Type 3 does not touch the program buffer.
        assert_eq!(ctl.buf[0], 0);
    }

    #[test]
    fn test_buffered_program_and_buffer_erase() {
        let mut hal = MemHal::new();
        hal.load_nor_page(0);
        let mut ctl = FlashCtl::new();
        unlocked(&mut hal, &mut ctl, 0xA8);
        ctl.buf = [0xFF; 0x100];
        ctl.write(&mut hal, 0, 0x4012, 0x3C);
        assert_eq!(ctl.buf[0x12], 0x3C);
        assert_eq!(ctl.step, 4);

        let mut ctl = FlashCtl::new();
        unlocked(&mut hal, &mut ctl, 0x88);
        ctl.write(&mut hal, 0, 0x5555, 0xAA);
        ctl.write(&mut hal, 0, 0xAAAA, 0x55);
        ctl.write(&mut hal, 0, 0x4000, 0x48);
        assert!(ctl.buf.iter().all(|&b| b == 0xFF));
        assert_eq!(ctl.step, 6);
    }

    #[test]
    fn test_identify_restore() {
        let mut hal = MemHal::new();
        // Scratch offsets 0x4000/0x4001 inside the bank window.
        hal.nor[0x4000] = 0x11;
        hal.nor[0x4001] = 0x22;
        hal.load_nor_page(0);
        let mut ctl = FlashCtl::new();
        unlocked(&mut hal, &mut ctl, 0x90);
        assert_eq!(ctl.ty, 1);
        // Both capture writes land in bak1.
        assert_eq!(ctl.bak1, 0x22);
        assert_eq!(ctl.bak2, 0x00);
        ctl.write(&mut hal, 0, 0x4000, 0xF0);
        assert_eq!(ctl.step, 0);
        assert_eq!(hal.nor[0x4000], 0x22);
        assert_eq!(hal.nor[0x4001], 0x00);
        assert_eq!(hal.nor_saves, 1);
    }

    #[test]
    fn test_dedicated_reset_write() {
        let mut hal = MemHal::new();
        hal.load_nor_page(0);
        let mut ctl = FlashCtl::new();
        unlocked(&mut hal, &mut ctl, 0x80);
        assert_eq!(ctl.step, 3);
        ctl.write(&mut hal, 0, 0x8000, 0xF0);
        assert_eq!(ctl.step, 0);
    }
}
