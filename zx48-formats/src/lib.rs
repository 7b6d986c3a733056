//! Tape image parsing (TAP, TZX, WAV), pulse-waveform synthesis, and the
//! playback/recording sessions that plug a tape deck into a
//! `zx48_core::ula::Ula`.
pub mod pulse;
pub mod tap;
pub mod tape;
pub mod tzx;
pub mod wav;

pub use pulse::{synthesize, TapePulse, TapeWaveform};
pub use tap::{read_tap, read_tap_file, write_tap, TapeBlock};
pub use tape::playback::TapePlayer;
pub use tape::recorder::{OutputFormat, TapeRecorder};
pub use tape::TapeTransport;
pub use tzx::read_tzx;
