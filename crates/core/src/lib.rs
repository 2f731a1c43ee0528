//! # wqx-core
//!
//! Emulation core for the Wenquxing NC1020 pocket dictionary.
//!
//! The NC1020 is a 6502-class machine with 32 KiB of battery-backed RAM, a
//! banked 64 KiB address space windowing 12 MiB of mask ROM and 1 MiB of NOR
//! flash, a 160×80 monochrome LCD mapped into RAM, an 8×8 keypad matrix, a
//! real-time clock, and two interrupt timers (2 Hz wall clock, 256 Hz tick).
//!
//! ## Architecture
//!
//! - [`Nc1020`] — top-level machine wiring CPU, memory map, and peripherals
//! - [`Cpu`] — 6502 register file; execution lives in [`cpu`]
//! - [`opcodes`] — declarative opcode/cycle table driving the interpreter
//! - [`Hal`] — host-implemented paging and persistence (scratch-buffer based)
//! - [`peripherals`] — RTC, NOR flash command machine, keypad, JG waveform
//! - [`savestate`] — fixed-layout versioned snapshot
//!
//! The core is single-threaded and never blocks: [`Nc1020::run_time_slice`]
//! executes instructions until a millisecond budget is spent, servicing the
//! timers and the IRQ line between instructions. Hosts drive it from their
//! own loop and post key events with [`Nc1020::set_key`].

pub mod cpu;
pub mod hal;
pub mod io;
pub mod memory;
pub mod opcodes;
pub mod peripherals;
pub mod savestate;

pub use cpu::Cpu;
pub use hal::{Hal, MemHal};
pub use peripherals::{FlashCtl, JgWav, Keypad, Rtc};
pub use savestate::{SnapshotError, SNAPSHOT_SIZE, SNAPSHOT_VERSION};

use cpu::FLAG_I;
use memory::MemSlot;
use peripherals::keypad;

/// Default CPU frequency in Hz.
pub const CLOCK_HZ: u32 = 5_120_000;
/// Wall-clock timer frequency (toggles at 2 Hz, seconds advance at 1 Hz).
pub const TIMER0_FREQ: u32 = 2;
/// Tick timer frequency.
pub const TIMER1_FREQ: u32 = 256;
/// Tick timer acceleration under speed-up.
pub const SPEED_UP_RATIO: u32 = 20;

/// Internal RAM size.
pub const RAM_SIZE: usize = 0x8000;
/// ROM/NOR page scratch size (one 32 KiB bank).
pub const PAGE_SIZE: usize = 0x8000;
/// BBS page size.
pub const BBS_SIZE: usize = 0x2000;
/// NOR flash page count.
pub const NOR_PAGE_COUNT: usize = 0x20;
/// ROM pages per volume.
pub const ROM_PAGE_COUNT: usize = 0x80;
/// ROM volumes.
pub const ROM_VOLUME_COUNT: usize = 3;
/// BBS pages per volume.
pub const BBS_PAGE_COUNT: usize = 0x10;

/// I/O ports occupy addresses below this.
pub(crate) const IO_LIMIT: u16 = 0x40;

pub const NMI_VEC: u16 = 0xFFFA;
pub const RESET_VEC: u16 = 0xFFFC;
pub const IRQ_VEC: u16 = 0xFFFE;

/// LCD bitmap width in pixels.
pub const LCD_WIDTH: usize = 160;
/// LCD bitmap height in pixels.
pub const LCD_HEIGHT: usize = 80;
/// Size of the 1-bpp LCD bitmap in RAM.
pub const LCD_BUFFER_SIZE: usize = LCD_WIDTH * LCD_HEIGHT / 8;

/// Cycle budgets derived from the CPU frequency at construction time.
#[derive(Debug, Clone, Copy)]
struct Timing {
    cycles_per_ms: u32,
    timer0_period: u32,
    timer1_period: u32,
    timer1_period_speed_up: u32,
}

impl Timing {
    fn from_hz(hz: u32) -> Self {
        Timing {
            cycles_per_ms: hz / 1000,
            timer0_period: hz / TIMER0_FREQ,
            timer1_period: hz / TIMER1_FREQ,
            timer1_period_speed_up: hz / TIMER1_FREQ / SPEED_UP_RATIO,
        }
    }
}

/// The NC1020 machine.
///
/// Owns every piece of mutable state; the only external dependency is the
/// [`Hal`], which pages ROM/NOR/BBS bytes in and out and persists snapshots.
pub struct Nc1020<H: Hal> {
    pub hal: H,
    pub cpu: Cpu,
    /// Internal RAM. The low 0x40 bytes shadow the I/O ports, 0x40..0x100
    /// is the switchable zero-page window, 0x100..0x200 the stack.
    pub ram: [u8; RAM_SIZE],
    pub rtc: Rtc,
    pub flash: FlashCtl,
    pub keypad: Keypad,
    pub jg_wav: JgWav,
    memmap: [MemSlot; 8],
    /// Backup of zero-page block 0 while another block is switched in.
    bak40: [u8; 0x40],
    slept: bool,
    should_wake_up: bool,
    pending_wake_up: bool,
    wake_up_key: u8,
    timer0_toggle: bool,
    /// Cycles consumed in the current slice (plus carry from the last one).
    cycles: u32,
    timer0_cycles: u32,
    timer1_cycles: u32,
    should_irq: bool,
    /// RAM address of the LCD bitmap; zero until the firmware programs it.
    lcd_addr: u32,
    timing: Timing,
}

impl<H: Hal> Nc1020<H> {
    /// Build a machine around `hal` and reset it.
    ///
    /// `cpu_hz_override` replaces the stock 5.12 MHz clock; `None` or
    /// `Some(0)` keeps the default.
    pub fn new(hal: H, cpu_hz_override: Option<u32>) -> Self {
        let hz = cpu_hz_override.filter(|&hz| hz != 0).unwrap_or(CLOCK_HZ);
        let timing = Timing::from_hz(hz);
        let mut machine = Nc1020 {
            hal,
            cpu: Cpu::new(),
            ram: [0; RAM_SIZE],
            rtc: Rtc::new(),
            flash: FlashCtl::new(),
            keypad: Keypad::new(),
            jg_wav: JgWav::new(),
            memmap: [MemSlot::Unmapped; 8],
            bak40: [0; 0x40],
            slept: false,
            should_wake_up: false,
            pending_wake_up: false,
            wake_up_key: 0,
            timer0_toggle: false,
            cycles: 0,
            timer0_cycles: 0,
            timer1_cycles: 0,
            should_irq: false,
            lcd_addr: 0,
            timing,
        };
        machine.reset();
        machine
    }

    /// Power-on reset: clear RAM and peripherals, rebuild the memory map,
    /// fetch PC from the reset vector, restart the timers.
    ///
    /// The sleep latch, wake-up key, LCD base, and zero-page backup are
    /// battery-backed and survive a reset.
    pub fn reset(&mut self) {
        self.ram = [0; RAM_SIZE];
        self.memmap[0] = MemSlot::Ram(0);
        self.keypad.reset();
        self.rtc.reset();
        self.jg_wav.reset();
        self.flash.reset();
        self.timer0_toggle = false;
        self.should_wake_up = false;
        self.pending_wake_up = false;
        self.should_irq = false;
        self.cycles = 0;
        self.cpu = Cpu::new();
        self.switch_volume();
        self.cpu.pc = self.peek_word(RESET_VEC);
        self.timer0_cycles = self.timing.timer0_period;
        self.timer1_cycles = self.timing.timer1_period;
    }

    /// Run the CPU for `time_slice_ms` milliseconds of emulated time.
    ///
    /// Timer expiry and IRQ dispatch are folded between instructions. With
    /// `speed_up` the 256 Hz tick runs twenty times faster, which the
    /// firmware perceives as time acceleration.
    pub fn run_time_slice(&mut self, time_slice_ms: u32, speed_up: bool) {
        let end_cycles = time_slice_ms.saturating_mul(self.timing.cycles_per_ms);
        while self.cycles < end_cycles {
            let spent = self.step();
            self.cycles = self.cycles.wrapping_add(spent);
            self.service_timer0();
            if self.should_irq && self.cpu.p & FLAG_I == 0 {
                self.service_irq();
            }
            self.service_timer1(speed_up);
        }
        // Carry the overshoot into the next slice.
        self.cycles -= end_cycles;
        self.timer0_cycles = self.timer0_cycles.saturating_sub(end_cycles);
        self.timer1_cycles = self.timer1_cycles.saturating_sub(end_cycles);
    }

    /// 2 Hz wall-clock timer: advances the RTC on the falling edge, drives
    /// the countdown status port, and raises the IRQ line.
    fn service_timer0(&mut self) {
        if self.cycles < self.timer0_cycles {
            return;
        }
        self.timer0_cycles = self.timer0_cycles.wrapping_add(self.timing.timer0_period);
        self.timer0_toggle = !self.timer0_toggle;
        if !self.timer0_toggle {
            self.rtc.adjust_time();
        }
        if self.rtc.is_count_down() && self.timer0_toggle {
            self.ram[0x3D] = 0x20;
            self.rtc.flags &= 0xFD;
        } else {
            self.ram[0x3D] = 0;
        }
        self.should_irq = true;
    }

    /// 256 Hz tick timer: counts into the clock buffer and either completes
    /// a pending wake-up (jumping to the reset vector) or raises the IRQ
    /// line.
    fn service_timer1(&mut self, speed_up: bool) {
        if self.cycles < self.timer1_cycles {
            return;
        }
        let period = if speed_up {
            self.timing.timer1_period_speed_up
        } else {
            self.timing.timer1_period
        };
        self.timer1_cycles = self.timer1_cycles.wrapping_add(period);
        self.rtc.data[4] = self.rtc.data[4].wrapping_add(1);
        if self.should_wake_up {
            self.should_wake_up = false;
            self.ram[0x01] |= 0x01;
            self.ram[0x02] |= 0x01;
            self.cpu.pc = self.peek_word(RESET_VEC);
        } else {
            self.ram[0x01] |= 0x08;
            self.should_irq = true;
        }
    }

    /// Post a key transition from the host.
    ///
    /// While the machine sleeps, pressing a function key schedules a
    /// wake-up: the 256 Hz tick restarts the firmware, which then picks the
    /// wake key code up from address 0x045F. Pressing the power key while
    /// awake puts the machine to sleep.
    pub fn set_key(&mut self, key_id: u8, down: bool) {
        self.keypad.set(key_id, down);
        if !down {
            return;
        }
        if self.slept {
            if let Some(code) = Keypad::wake_code(key_id) {
                self.wake_up_key = code;
                self.should_wake_up = true;
                self.pending_wake_up = true;
                self.slept = false;
            }
        } else if key_id == keypad::POWER_KEY {
            self.slept = true;
        }
    }

    /// Release every key (host focus loss, lid close).
    pub fn release_all_keys(&mut self) {
        self.keypad.reset();
    }

    /// Copy the 1-bpp LCD bitmap out of RAM.
    ///
    /// Returns false while the firmware has not programmed the LCD base
    /// address yet (or a corrupt snapshot put it out of range).
    pub fn copy_lcd_buffer(&self, dst: &mut [u8; LCD_BUFFER_SIZE]) -> bool {
        let start = self.lcd_addr as usize;
        if start == 0 || start + LCD_BUFFER_SIZE > RAM_SIZE {
            return false;
        }
        dst.copy_from_slice(&self.ram[start..start + LCD_BUFFER_SIZE]);
        true
    }

    /// Persist the machine state through the HAL.
    pub fn save_snapshot(&mut self) -> bool {
        let blob = self.encode_snapshot();
        self.hal.save_state(&blob)
    }

    /// Restore the machine state through the HAL.
    ///
    /// On any failure (missing blob, wrong version) the machine is left
    /// freshly reset and `false` is returned.
    pub fn load_snapshot(&mut self) -> bool {
        self.reset();
        let mut blob = vec![0u8; SNAPSHOT_SIZE];
        if !self.hal.load_state(&mut blob) {
            return false;
        }
        match self.apply_snapshot(&blob) {
            Ok(()) => {
                self.switch_volume();
                true
            }
            Err(err) => {
                log::warn!("discarding saved state: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::{MemHal, Nc1020, BBS_SIZE};

    /// Machine over blank in-memory images.
    pub(crate) fn machine() -> Nc1020<MemHal> {
        Nc1020::new(MemHal::new(), None)
    }

    /// Machine whose reset/IRQ vectors (read through the shadow BBS page)
    /// are pre-wired.
    pub(crate) fn machine_with_vectors(reset: u16, irq: u16) -> Nc1020<MemHal> {
        let mut hal = MemHal::new();
        let shadow = BBS_SIZE; // shadow BBS backs 0xE000..0xFFFF
        hal.bbs_rom[shadow + 0x1FFC] = reset as u8;
        hal.bbs_rom[shadow + 0x1FFD] = (reset >> 8) as u8;
        hal.bbs_rom[shadow + 0x1FFE] = irq as u8;
        hal.bbs_rom[shadow + 0x1FFF] = (irq >> 8) as u8;
        Nc1020::new(hal, None)
    }
}
