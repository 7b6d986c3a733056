//! Walks a [`TapeWaveform`] on a T-state timeline, toggling the `EAR`
//! input level at each scheduled pulse boundary. TAP/TZX and WAV
//! sources both end up as a flat pulse list (see [`crate::pulse`] and
//! [`crate::wav`]), so one state machine serves both — the spec's
//! separate PILOT/SYNC/DATA phase bookkeeping is already baked into
//! the pulse list by synthesis time.
use crate::pulse::TapeWaveform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Playing,
    Paused,
    Done,
}

pub struct TapePlayer {
    waveform: TapeWaveform,
    pulse_index: usize,
    level: bool,
    next_transition_t: u64,
    /// Remaining T-states to the next transition, captured by
    /// [`TapePlayer::pause`] so [`TapePlayer::resume`] can re-anchor it
    /// to a new `t_now` without losing timing.
    paused_remaining: Option<u64>,
    state: TransportState,
}

impl TapePlayer {
    pub fn new(waveform: TapeWaveform) -> Self {
        let level = waveform.initial_level;
        TapePlayer { waveform, pulse_index: 0, level, next_transition_t: 0, paused_remaining: None, state: TransportState::Idle }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// `start(t_start)`: resets to the first pulse and begins playing.
    pub fn play(&mut self, t_now: u64) {
        self.pulse_index = 0;
        self.level = self.waveform.initial_level;
        self.paused_remaining = None;
        if self.waveform.pulses.is_empty() {
            self.state = TransportState::Done;
            return;
        }
        self.next_transition_t = t_now + self.waveform.pulses[0].duration_tstates as u64;
        self.state = TransportState::Playing;
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Idle;
        self.paused_remaining = None;
    }

    pub fn pause(&mut self, t_now: u64) {
        if self.state == TransportState::Playing {
            self.paused_remaining = Some(self.next_transition_t.saturating_sub(t_now));
            self.state = TransportState::Paused;
        }
    }

    pub fn resume(&mut self, t_now: u64) {
        if let Some(remaining) = self.paused_remaining.take() {
            self.next_transition_t = t_now + remaining;
            self.state = TransportState::Playing;
        }
    }

    pub fn rewind(&mut self) {
        self.pulse_index = 0;
        self.level = self.waveform.initial_level;
        self.paused_remaining = None;
        self.state = TransportState::Idle;
    }

    /// Advances the state machine to `t_state`, flipping `level` at
    /// every pulse boundary crossed, and returns the resulting level.
    /// A no-op (returns the held level) when not [`TransportState::Playing`].
    pub fn advance_to(&mut self, t_state: u64) -> bool {
        if self.state != TransportState::Playing {
            return self.level;
        }
        while self.state == TransportState::Playing && t_state >= self.next_transition_t {
            self.level = !self.level;
            self.pulse_index += 1;
            match self.waveform.pulses.get(self.pulse_index) {
                Some(pulse) => self.next_transition_t += pulse.duration_tstates as u64,
                None => self.state = TransportState::Done,
            }
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::TapePulse;

    fn two_pulse_waveform() -> TapeWaveform {
        TapeWaveform {
            pulses: vec![TapePulse { duration_tstates: 100 }, TapePulse { duration_tstates: 200 }],
            initial_level: true,
            sample_rate: None,
        }
    }

    #[test]
    fn level_holds_until_first_transition() {
        let mut player = TapePlayer::new(two_pulse_waveform());
        player.play(0);
        assert_eq!(player.advance_to(50), true);
        assert_eq!(player.advance_to(99), true);
    }

    #[test]
    fn level_flips_at_each_pulse_boundary() {
        let mut player = TapePlayer::new(two_pulse_waveform());
        player.play(0);
        assert_eq!(player.advance_to(100), false);
        assert_eq!(player.advance_to(300), true);
    }

    #[test]
    fn finishes_after_the_last_pulse() {
        let mut player = TapePlayer::new(two_pulse_waveform());
        player.play(0);
        player.advance_to(1000);
        assert_eq!(player.state(), TransportState::Done);
    }

    #[test]
    fn pause_then_resume_preserves_remaining_time() {
        let mut player = TapePlayer::new(two_pulse_waveform());
        player.play(0);
        player.pause(60); // 40 T-states remained to the first transition
        player.resume(1000);
        assert_eq!(player.advance_to(1039), true);
        assert_eq!(player.advance_to(1040), false);
    }

    #[test]
    fn not_playing_holds_the_current_level() {
        let mut player = TapePlayer::new(two_pulse_waveform());
        assert_eq!(player.advance_to(1_000_000), true);
    }
}
