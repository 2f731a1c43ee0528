//! On-board peripherals: real-time clock, NOR flash command machine,
//! keypad matrix, and the waveform command recorder.

pub mod jg_wav;
pub mod keypad;
pub mod nor_flash;
pub mod rtc;

pub use jg_wav::JgWav;
pub use keypad::Keypad;
pub use nor_flash::FlashCtl;
pub use rtc::Rtc;
