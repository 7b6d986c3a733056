//! Tape playback and recording session state machines, and the
//! combinator that wires both into the single [`zx48_core::ula::TapeDeck`]
//! slot a [`zx48_core::ula::Ula`] expects.
pub mod playback;
pub mod recorder;

use zx48_core::ula::TapeDeck;

use playback::TapePlayer;
use recorder::TapeRecorder;

/// Combines an optional playback session and an optional recording
/// session behind one [`TapeDeck`]. Real hardware only ever drives one
/// direction at a time, but nothing stops a host from wiring up both
/// (e.g. monitoring EAR while MIC is being captured for a debug dump).
#[derive(Default)]
pub struct TapeTransport {
    pub player: Option<TapePlayer>,
    pub recorder: Option<TapeRecorder>,
}

impl TapeDeck for TapeTransport {
    fn ear_level(&mut self, t_state: u64) -> bool {
        match &mut self.player {
            Some(player) => player.advance_to(t_state),
            // No cassette loaded: the line floats high, same as real
            // hardware with nothing plugged into EAR IN.
            None => true,
        }
    }

    fn mic_edge(&mut self, t_state: u64, level: bool) {
        if let Some(recorder) = &mut self.recorder {
            recorder.record_edge(t_state, level);
        }
    }
}
