//! NC1020 desktop frontend.
//!
//! Drives [`wqx_core`] in a minifb window:
//!
//! - loads `rom.bin` / `nor.bin` / `bbs.bin` images from the working
//!   directory (or a directory given on the command line),
//! - maps the host keyboard onto the NC1020 keypad matrix,
//! - blits the 160×80 1-bpp LCD at 4× scale,
//! - resumes from `nc1020.sts` on start; F5 saves, F9 reloads,
//! - flushes modified NOR pages back to `nor.bin` on exit.
//!
//! ```text
//! wqx-emu [dir] [--turbo] [--hz <cpu-hz>]
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use minifb::{Key, Scale, Window, WindowOptions};
use wqx_core::{Hal, MemHal, Nc1020, LCD_BUFFER_SIZE, LCD_HEIGHT, LCD_WIDTH};

const ROM_FILE: &str = "rom.bin";
const NOR_FILE: &str = "nor.bin";
const BBS_FILE: &str = "bbs.bin";
const STATE_FILE: &str = "nc1020.sts";

/// Magic bytes of a state file.
const STATE_MAGIC: &[u8; 4] = b"WQXS";
/// State file wrapper version (the snapshot payload carries its own).
const STATE_FORMAT_VERSION: u32 = 1;

/// Emulated milliseconds per host frame.
const SLICE_MS: u32 = 30;

/// LCD palette: unlit and lit pixels.
const LCD_OFF: u32 = 0xFFA9BCA4;
const LCD_ON: u32 = 0xFF18241C;

// ─── HAL over plain image files ─────────────────────────────────────────────

/// File-backed HAL: whole images in memory, NOR flushed back on demand.
struct FileHal {
    mem: MemHal,
    nor_path: PathBuf,
    state_path: PathBuf,
    nor_dirty: bool,
}

impl FileHal {
    fn open(dir: &Path) -> Result<Self, String> {
        let rom = fs::read(dir.join(ROM_FILE))
            .map_err(|e| format!("{}: {e}", dir.join(ROM_FILE).display()))?;
        let nor = fs::read(dir.join(NOR_FILE))
            .map_err(|e| format!("{}: {e}", dir.join(NOR_FILE).display()))?;
        // The BBS image is optional; some dumps fold it into the ROM file.
        let bbs = fs::read(dir.join(BBS_FILE)).unwrap_or_default();
        Ok(FileHal {
            mem: MemHal::with_images(&nor, &rom, &bbs),
            nor_path: dir.join(NOR_FILE),
            state_path: dir.join(STATE_FILE),
            nor_dirty: false,
        })
    }

    /// Write the NOR image back if any page was programmed or erased.
    fn flush_nor(&mut self) {
        if !self.nor_dirty {
            return;
        }
        match fs::write(&self.nor_path, &self.mem.nor) {
            Ok(()) => {
                self.nor_dirty = false;
                log::info!("NOR image flushed to {}", self.nor_path.display());
            }
            Err(e) => log::error!("NOR flush failed: {e}"),
        }
    }
}

impl Hal for FileHal {
    fn load_nor_page(&mut self, page: u8) -> bool {
        self.mem.load_nor_page(page)
    }

    fn save_nor_page(&mut self, page: u8) -> bool {
        self.nor_dirty = true;
        self.mem.save_nor_page(page)
    }

    fn wipe_nor_flash(&mut self) -> bool {
        self.nor_dirty = true;
        self.mem.wipe_nor_flash()
    }

    fn load_rom_page(&mut self, volume: u8, page: u8) -> bool {
        self.mem.load_rom_page(volume, page)
    }

    fn load_bbs_page(&mut self, volume: u8, page: u8) -> bool {
        self.mem.load_bbs_page(volume, page)
    }

    fn save_state(&mut self, data: &[u8]) -> bool {
        let compressed = miniz_oxide::deflate::compress_to_vec(data, 6);
        let mut out = Vec::with_capacity(8 + compressed.len());
        out.extend_from_slice(STATE_MAGIC);
        out.extend_from_slice(&STATE_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&compressed);
        match fs::write(&self.state_path, &out) {
            Ok(()) => true,
            Err(e) => {
                log::error!("state save failed: {e}");
                false
            }
        }
    }

    fn load_state(&mut self, data: &mut [u8]) -> bool {
        let raw = match fs::read(&self.state_path) {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        if raw.len() < 8 || &raw[0..4] != STATE_MAGIC {
            log::warn!("{}: not a state file", self.state_path.display());
            return false;
        }
        let version = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        if version != STATE_FORMAT_VERSION {
            log::warn!("state file version {version} unsupported");
            return false;
        }
        let payload = match miniz_oxide::inflate::decompress_to_vec(&raw[8..]) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("state file corrupt: {e:?}");
                return false;
            }
        };
        let n = payload.len().min(data.len());
        data[..n].copy_from_slice(&payload[..n]);
        n == data.len()
    }

    fn page(&self) -> &[u8; wqx_core::PAGE_SIZE] {
        self.mem.page()
    }

    fn page_mut(&mut self) -> &mut [u8; wqx_core::PAGE_SIZE] {
        self.mem.page_mut()
    }

    fn bbs(&self) -> &[u8; wqx_core::BBS_SIZE] {
        self.mem.bbs()
    }

    fn shadow_bbs(&self) -> &[u8; wqx_core::BBS_SIZE] {
        self.mem.shadow_bbs()
    }
}

// ─── Key bindings ───────────────────────────────────────────────────────────

/// Map a host key to an NC1020 key id (row = id % 8, column = id / 8).
fn key_binding(key: Key) -> Option<u8> {
    Some(match key {
        // Letter block.
        Key::A => 0x28, Key::B => 0x34, Key::C => 0x32, Key::D => 0x2A,
        Key::E => 0x22, Key::F => 0x2B, Key::G => 0x2C, Key::H => 0x2D,
        Key::I => 0x27, Key::J => 0x2E, Key::K => 0x2F, Key::L => 0x19,
        Key::M => 0x36, Key::N => 0x35, Key::O => 0x18, Key::P => 0x1C,
        Key::Q => 0x20, Key::R => 0x23, Key::S => 0x29, Key::T => 0x24,
        Key::U => 0x26, Key::V => 0x33, Key::W => 0x21, Key::X => 0x31,
        Key::Y => 0x25, Key::Z => 0x30,
        // Digit row doubles as the application hotkeys.
        Key::Key0 => 0x08, Key::Key1 => 0x10, Key::Key2 => 0x11,
        Key::Key3 => 0x12, Key::Key4 => 0x13, Key::Key5 => 0x0B,
        Key::Key6 => 0x0C, Key::Key7 => 0x0D, Key::Key8 => 0x0A,
        Key::Key9 => 0x09,
        Key::F1 => 0x10, Key::F2 => 0x11, Key::F3 => 0x12, Key::F4 => 0x13,
        // Navigation and editing.
        Key::Escape => 0x3B,
        Key::Up => 0x1A,
        Key::Down => 0x1B,
        Key::Left => 0x3F,
        Key::Right => 0x1F,
        Key::PageUp => 0x37,
        Key::PageDown => 0x1E,
        Key::Enter => 0x1D,
        Key::Space => 0x3E,
        Key::Period => 0x3D,
        Key::LeftShift | Key::RightShift => 0x39,
        Key::Tab => 0x3A, // caps
        Key::Backslash => 0x3C, // symbol
        Key::F10 => 0x38, // help
        Key::Home => 0x0E, // download
        Key::End => 0x0F, // power
        _ => return None,
    })
}

// ─── Rendering ──────────────────────────────────────────────────────────────

/// Expand the 1-bpp bitmap into the ARGB window buffer, MSB first.
fn blit(frame: &[u8; LCD_BUFFER_SIZE], out: &mut [u32]) {
    for (i, &byte) in frame.iter().enumerate() {
        let base = i * 8;
        for bit in 0..8 {
            out[base + bit] = if byte & (0x80 >> bit) != 0 { LCD_ON } else { LCD_OFF };
        }
    }
}

// ─── Entry point ────────────────────────────────────────────────────────────

struct Args {
    dir: PathBuf,
    turbo: bool,
    cpu_hz: Option<u32>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args { dir: PathBuf::from("."), turbo: false, cpu_hz: None };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--turbo" => args.turbo = true,
            "--hz" => {
                let v = it.next().ok_or("--hz needs a value")?;
                args.cpu_hz = Some(v.parse().map_err(|_| format!("bad --hz value: {v}"))?);
            }
            "--help" | "-h" => {
                return Err("usage: wqx-emu [dir] [--turbo] [--hz <cpu-hz>]".into());
            }
            other if !other.starts_with('-') => args.dir = PathBuf::from(other),
            other => return Err(format!("unknown option {other}")),
        }
    }
    Ok(args)
}

fn main() {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let hal = match FileHal::open(&args.dir) {
        Ok(hal) => hal,
        Err(msg) => {
            eprintln!("cannot open machine images: {msg}");
            std::process::exit(1);
        }
    };

    let mut machine = Nc1020::new(hal, args.cpu_hz);
    if machine.load_snapshot() {
        log::info!("resumed from saved state");
    }

    let mut window = Window::new(
        "NC1020",
        LCD_WIDTH,
        LCD_HEIGHT,
        WindowOptions { scale: Scale::X4, ..WindowOptions::default() },
    )
    .unwrap_or_else(|e| {
        eprintln!("cannot open window: {e}");
        std::process::exit(1);
    });
    window.set_target_fps(60);

    let mut frame = [0u8; LCD_BUFFER_SIZE];
    let mut pixels = vec![LCD_OFF; LCD_WIDTH * LCD_HEIGHT];
    let mut held: HashSet<Key> = HashSet::new();
    let mut last_slice = Instant::now();

    while window.is_open() && !window.is_key_down(Key::F12) {
        // Key transitions since the previous frame.
        let down: HashSet<Key> = window.get_keys().into_iter().collect();
        for key in down.difference(&held) {
            match *key {
                Key::F5 => {
                    if machine.save_snapshot() {
                        log::info!("state saved");
                        machine.hal.flush_nor();
                    }
                }
                Key::F9 => {
                    if machine.load_snapshot() {
                        log::info!("state reloaded");
                    }
                }
                key => {
                    if let Some(id) = key_binding(key) {
                        machine.set_key(id, true);
                    }
                }
            }
        }
        for key in held.difference(&down) {
            if let Some(id) = key_binding(*key) {
                machine.set_key(id, false);
            }
        }
        held = down;

        // Cap the budget so a stall does not snowball.
        let elapsed = last_slice.elapsed();
        last_slice = Instant::now();
        let ms = (elapsed.as_millis() as u32).clamp(SLICE_MS, 3 * SLICE_MS);
        machine.run_time_slice(ms, args.turbo);

        if machine.copy_lcd_buffer(&mut frame) {
            blit(&frame, &mut pixels);
        }
        window
            .update_with_buffer(&pixels, LCD_WIDTH, LCD_HEIGHT)
            .unwrap_or_else(|e| log::error!("window update failed: {e}"));

        if elapsed < Duration::from_millis(1) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    machine.release_all_keys();
    if machine.save_snapshot() {
        log::info!("state saved on exit");
    }
    machine.hal.flush_nor();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings_fit_the_matrix() {
        for key in [Key::A, Key::Z, Key::Key0, Key::Enter, Key::Space, Key::End] {
            let id = key_binding(key).unwrap();
            assert!(id < 0x40);
        }
        assert_eq!(key_binding(Key::F11), None);
    }

    #[test]
    fn test_blit_expands_msb_first() {
        let mut frame = [0u8; LCD_BUFFER_SIZE];
        frame[0] = 0b1000_0001;
        let mut out = vec![0u32; LCD_WIDTH * LCD_HEIGHT];
        blit(&frame, &mut out);
        assert_eq!(out[0], LCD_ON);
        assert_eq!(out[1], LCD_OFF);
        assert_eq!(out[7], LCD_ON);
        assert_eq!(out[8], LCD_OFF);
    }
}
