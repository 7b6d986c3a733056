//! The core of a ZX Spectrum 48K emulator: Z80 CPU, flat memory, ULA
//! port, raster blitter, frame driver, and a CP/M test-binary runner.
//!
//! Tape and audio concerns live in sibling crates (`zx48-formats`,
//! `zx48-audio`); this crate only defines the [`ula::BeeperSink`] and
//! [`ula::TapeDeck`] traits they plug into.
pub mod frame;
pub mod keyboard;
pub mod memory;
pub mod testrunner;
pub mod ula;
pub mod video;
pub mod z80;

pub use frame::{FrameDriver, Spectrum};
pub use memory::Memory;
