//! Persistent machine snapshot.
//!
//! One packed little-endian record carries everything needed to resume:
//! CPU registers, RAM, the zero-page backup, clock, waveform recorder,
//! flash command machine, sleep/wake latches, timer state, LCD base, and
//! the keypad matrix. The layout is fixed and versioned — it is the
//! on-disk contract, so fields are written explicitly rather than through
//! a serializer:
//!
//! ```text
//! +--------------------+
//! | version            |  u32 LE (currently 6)
//! +--------------------+
//! | pc u16, a p x y sp |  CPU registers
//! +--------------------+
//! | ram                |  0x8000 bytes
//! | bak40              |  0x40 bytes
//! | clock + flags      |  80 + 1 bytes
//! | jg wav             |  0x20 + 3 bytes
//! | flash              |  5 + 0x100 bytes
//! | sleep/wake         |  4 bytes
//! | timers             |  1 + 4 + 4 + 4 + 1 bytes
//! | lcd_addr           |  u32 LE
//! | keypad             |  8 bytes
//! +--------------------+
//! ```
//!
//! Booleans are single bytes (nonzero decodes as true). A version mismatch
//! rejects the whole record; the caller continues from a fresh reset.

use thiserror::Error;

use crate::hal::Hal;
use crate::Nc1020;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 0x06;

/// Exact size of an encoded snapshot in bytes.
pub const SNAPSHOT_SIZE: usize = 33_250;

/// Why a snapshot could not be applied.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot truncated: {0} bytes, need {SNAPSHOT_SIZE}")]
    Truncated(usize),
    #[error("snapshot version {0:#x} does not match {SNAPSHOT_VERSION:#x}")]
    VersionMismatch(u32),
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn bytes(&mut self, dst: &mut [u8]) {
        dst.copy_from_slice(&self.buf[self.pos..self.pos + dst.len()]);
        self.pos += dst.len();
    }
}

impl<H: Hal> Nc1020<H> {
    /// Encode the full machine state into the packed record.
    pub fn encode_snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SNAPSHOT_SIZE);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.cpu.pc.to_le_bytes());
        out.push(self.cpu.a);
        out.push(self.cpu.p);
        out.push(self.cpu.x);
        out.push(self.cpu.y);
        out.push(self.cpu.sp);
        out.extend_from_slice(&self.ram);
        out.extend_from_slice(&self.bak40);
        out.extend_from_slice(&self.rtc.data);
        out.push(self.rtc.flags);
        out.extend_from_slice(&self.jg_wav.data);
        out.push(self.jg_wav.flags);
        out.push(self.jg_wav.index);
        out.push(self.jg_wav.playing as u8);
        out.push(self.flash.step);
        out.push(self.flash.ty);
        out.push(self.flash.bank);
        out.push(self.flash.bak1);
        out.push(self.flash.bak2);
        out.extend_from_slice(&self.flash.buf);
        out.push(self.slept as u8);
        out.push(self.should_wake_up as u8);
        out.push(self.pending_wake_up as u8);
        out.push(self.wake_up_key);
        out.push(self.timer0_toggle as u8);
        out.extend_from_slice(&self.cycles.to_le_bytes());
        out.extend_from_slice(&self.timer0_cycles.to_le_bytes());
        out.extend_from_slice(&self.timer1_cycles.to_le_bytes());
        out.push(self.should_irq as u8);
        out.extend_from_slice(&self.lcd_addr.to_le_bytes());
        out.extend_from_slice(&self.keypad.matrix);
        debug_assert_eq!(out.len(), SNAPSHOT_SIZE);
        out
    }

    /// Apply a packed record. On error the machine is left untouched.
    ///
    /// The caller is responsible for re-running the volume switch
    /// afterwards; the memory map is derived state and not serialized.
    pub fn apply_snapshot(&mut self, buf: &[u8]) -> Result<(), SnapshotError> {
        if buf.len() < SNAPSHOT_SIZE {
            return Err(SnapshotError::Truncated(buf.len()));
        }
        let mut r = Reader::new(buf);
        let version = r.u32();
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch(version));
        }
        self.cpu.pc = r.u16();
        self.cpu.a = r.u8();
        self.cpu.p = r.u8();
        self.cpu.x = r.u8();
        self.cpu.y = r.u8();
        self.cpu.sp = r.u8();
        r.bytes(&mut self.ram);
        r.bytes(&mut self.bak40);
        r.bytes(&mut self.rtc.data);
        self.rtc.flags = r.u8();
        r.bytes(&mut self.jg_wav.data);
        self.jg_wav.flags = r.u8();
        self.jg_wav.index = r.u8();
        self.jg_wav.playing = r.bool();
        self.flash.step = r.u8();
        self.flash.ty = r.u8();
        self.flash.bank = r.u8();
        self.flash.bak1 = r.u8();
        self.flash.bak2 = r.u8();
        r.bytes(&mut self.flash.buf);
        self.slept = r.bool();
        self.should_wake_up = r.bool();
        self.pending_wake_up = r.bool();
        self.wake_up_key = r.u8();
        self.timer0_toggle = r.bool();
        self.cycles = r.u32();
        self.timer0_cycles = r.u32();
        self.timer1_cycles = r.u32();
        self.should_irq = r.bool();
        self.lcd_addr = r.u32();
        r.bytes(&mut self.keypad.matrix);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::machine;
    use proptest::prelude::*;

    #[test]
    fn test_snapshot_size() {
        let m = machine();
        assert_eq!(m.encode_snapshot().len(), SNAPSHOT_SIZE);
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let mut m = machine();
        m.cpu.pc = 0x1234;
        m.cpu.a = 0x56;
        m.ram[0x2000] = 0x78;
        m.rtc.data[0] = 42;
        m.flash.step = 3;
        m.flash.ty = 2;
        m.keypad.matrix[4] = 0x10;
        let blob = m.encode_snapshot();

        let mut fresh = machine();
        fresh.apply_snapshot(&blob).unwrap();
        assert_eq!(fresh.encode_snapshot(), blob);
        assert_eq!(fresh.cpu.pc, 0x1234);
        assert_eq!(fresh.ram[0x2000], 0x78);
        assert_eq!(fresh.flash.step, 3);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let m = machine();
        let mut blob = m.encode_snapshot();
        blob[0] = 0x05;
        let mut fresh = machine();
        assert_eq!(
            fresh.apply_snapshot(&blob),
            Err(SnapshotError::VersionMismatch(0x05))
        );
    }

    #[test]
    fn test_truncated_rejected() {
        let m = machine();
        let blob = m.encode_snapshot();
        let mut fresh = machine();
        assert_eq!(
            fresh.apply_snapshot(&blob[..100]),
            Err(SnapshotError::Truncated(100))
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_round_trip_arbitrary_state(
            pc in any::<u16>(),
            a in any::<u8>(),
            sp in any::<u8>(),
            step in 0u8..7,
            lcd in 0u32..0x4000,
        ) {
            let mut m = machine();
            m.cpu.pc = pc;
            m.cpu.a = a;
            m.cpu.sp = sp;
            m.flash.step = step;
            m.lcd_addr = lcd;
            let blob = m.encode_snapshot();
            let mut fresh = machine();
            fresh.apply_snapshot(&blob).unwrap();
            prop_assert_eq!(fresh.encode_snapshot(), blob);
        }
    }
}
