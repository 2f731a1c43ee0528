//! Banked memory map.
//!
//! The 64 KiB address space is eight 8 KiB slots, each backed by one of:
//! internal RAM, the HAL page scratch (NOR or ROM bank window), the BBS page
//! scratch, or the fixed shadow BBS. The original firmware flips slots at
//! runtime through I/O ports 0x00 (bank), 0x0A (BBS page), 0x0D (volume), and
//! 0x0F (zero-page window); the switch routines here mirror that behavior.
//!
//! Layout after reset:
//!
//! | Slot | Range         | Backing                                        |
//! |------|---------------|------------------------------------------------|
//! | 0    | 0x0000–0x1FFF | RAM page 0 (I/O shadow, zp window, stack)      |
//! | 1    | 0x2000–0x3FFF | RAM page 1 or 2 (bit 2 of port 0x0A)           |
//! | 2–5  | 0x4000–0xBFFF | 32 KiB bank: NOR page (<0x20) or ROM (>=0x80)  |
//! | 6    | 0xC000–0xDFFF | BBS page (or RAM page 3 in the shadow case)    |
//! | 7    | 0xE000–0xFFFF | Shadow BBS                                     |

use crate::hal::Hal;
use crate::{Nc1020, IO_LIMIT};

/// Backing store of one 8 KiB slot.
///
/// `Ram`/`Page` carry the base offset of the slot inside the 32 KiB RAM
/// array or HAL page scratch. `Unmapped` covers bank ids in 0x20..0x80,
/// which select neither NOR nor ROM; reads there yield 0xFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemSlot {
    Ram(usize),
    Page(usize),
    Bbs,
    ShadowBbs,
    Unmapped,
}

impl<H: Hal> Nc1020<H> {
    /// Raw mapped read, no I/O or flash interception.
    pub(crate) fn peek(&self, addr: u16) -> u8 {
        let off = (addr & 0x1FFF) as usize;
        match self.memmap[(addr >> 13) as usize] {
            MemSlot::Ram(base) => self.ram[base + off],
            MemSlot::Page(base) => self.hal.page()[base + off],
            MemSlot::Bbs => self.hal.bbs()[off],
            MemSlot::ShadowBbs => self.hal.shadow_bbs()[off],
            MemSlot::Unmapped => 0xFF,
        }
    }

    /// Little-endian word read; the second byte comes from `addr + 1`
    /// without any page wrap-around.
    pub(crate) fn peek_word(&self, addr: u16) -> u16 {
        self.peek(addr) as u16 | (self.peek(addr.wrapping_add(1)) as u16) << 8
    }

    /// Bus read as seen by the CPU: I/O ports, the flash write-complete
    /// sentinel, and the wake-up key injection come before the plain map.
    pub(crate) fn load(&mut self, addr: u16) -> u8 {
        if addr < IO_LIMIT {
            return self.io_read(addr as u8);
        }
        if self.flash.read_pending() && (0x4000..0xC000).contains(&addr) {
            self.flash.finish_read();
            return 0x88;
        }
        if addr == 0x045F && self.pending_wake_up {
            self.pending_wake_up = false;
            self.ram[0x045F] = self.wake_up_key;
        }
        self.peek(addr)
    }

    /// Bus write as seen by the CPU.
    ///
    /// Ports go to the I/O decoder, RAM-backed slots accept the write, the
    /// top 8 KiB is read-only, and everything else lands in the NOR command
    /// state machine when a NOR bank is selected.
    pub(crate) fn store(&mut self, addr: u16, value: u8) {
        if addr < IO_LIMIT {
            self.io_write(addr as u8, value);
            return;
        }
        let slot = (addr >> 13) as usize;
        if let MemSlot::Ram(base) = self.memmap[slot] {
            self.ram[base + (addr & 0x1FFF) as usize] = value;
            return;
        }
        // The flash command window ends at the BBS slot; writes above it
        // land in ROM-backed slots and are dropped.
        if addr >= 0xC000 {
            return;
        }
        let bank = self.ram[0x00];
        if bank >= 0x20 {
            return;
        }
        self.flash.write(&mut self.hal, bank, addr, value);
    }

    /// Remap slots 2–5 from the bank selected by port 0x00.
    pub(crate) fn switch_bank(&mut self) {
        let bank = self.ram[0x00];
        let mapped = if bank < 0x20 {
            if !self.hal.load_nor_page(bank) {
                log::warn!("NOR page {bank:#04x} load failed");
            }
            true
        } else if bank >= 0x80 {
            let volume = self.ram[0x0D] & 0x0F;
            if !self.hal.load_rom_page(volume, bank - 0x80) {
                log::warn!("ROM page {:#04x} load failed (volume {volume})", bank - 0x80);
            }
            true
        } else {
            false
        };
        for i in 0..4 {
            self.memmap[2 + i] = if mapped { MemSlot::Page(i * 0x2000) } else { MemSlot::Unmapped };
        }
    }

    /// Remap slots 1, 6, 7 for the volume selected by port 0x0D, then
    /// re-run the bank switch.
    ///
    /// Volume 0 with BBS page 1 selected maps RAM page 3 into slot 6
    /// instead of the BBS scratch.
    pub(crate) fn switch_volume(&mut self) {
        let mut volume = self.ram[0x0D];
        if volume > 2 {
            volume = 0;
        }
        let roa_bbs = self.ram[0x0A] & 0x0F;
        self.memmap[1] = if roa_bbs & 0x04 != 0 { MemSlot::Ram(0x4000) } else { MemSlot::Ram(0x2000) };
        if volume == 0 && roa_bbs == 1 {
            self.memmap[6] = MemSlot::Ram(0x6000);
        } else {
            if !self.hal.load_bbs_page(volume, roa_bbs) {
                log::warn!("BBS page {roa_bbs:#04x} load failed (volume {volume})");
            }
            self.memmap[6] = MemSlot::Bbs;
        }
        self.memmap[7] = MemSlot::ShadowBbs;
        self.switch_bank();
    }

    /// Reload slot 6 when port 0x0A changes. Unlike the full volume switch
    /// this never maps the RAM shadow page.
    pub(crate) fn reload_bbs(&mut self, value: u8) {
        let mut volume = self.ram[0x0D];
        if volume > 2 {
            volume = 0;
        }
        if !self.hal.load_bbs_page(volume, value & 0x0F) {
            log::warn!("BBS page {:#04x} load failed (volume {volume})", value & 0x0F);
        }
        self.memmap[6] = MemSlot::Bbs;
    }

    /// Backing range of one 64-byte zero-page block.
    ///
    /// Blocks 1–3 alias the I/O shadow at the bottom of RAM, exactly like
    /// the original pointer table; block 0 is handled by the caller via the
    /// dedicated backup buffer.
    fn zp40_range(block: u8) -> std::ops::Range<usize> {
        if block < 4 {
            0x00..0x40
        } else {
            let base = block as usize * 0x40;
            base..base + 0x40
        }
    }

    /// Swap the visible zero-page window (0x0040..0x0080) from block `old`
    /// to block `new`. Both are pre-masked to 3 bits and differ.
    pub(crate) fn switch_zp40(&mut self, old: u8, new: u8) {
        if old != 0 {
            let r = Self::zp40_range(old);
            self.ram.copy_within(0x40..0x80, r.start);
            if new != 0 {
                let r = Self::zp40_range(new);
                self.ram.copy_within(r, 0x40);
            } else {
                self.ram[0x40..0x80].copy_from_slice(&self.bak40);
            }
        } else {
            self.bak40.copy_from_slice(&self.ram[0x40..0x80]);
            let r = Self::zp40_range(new);
            self.ram.copy_within(r, 0x40);
        }
    }
}
