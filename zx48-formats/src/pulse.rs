//! Pulse-waveform synthesis: turns a sequence of [`TapeBlock`]s into the
//! flat T-state pulse train the ZX Spectrum ROM loader actually sees.
//!
//! Timing constants are grounded on the teacher's `tap::pulse::consts`
//! module; the values themselves are also independently mandated by
//! spec, so they agree.
use crate::tap::TapeBlock;

pub const LEAD_PULSE_LENGTH: u32 = 2168;
pub const SYNC_PULSE1_LENGTH: u32 = 667;
pub const SYNC_PULSE2_LENGTH: u32 = 735;
pub const ZERO_PULSE_LENGTH: u32 = 855;
pub const ONE_PULSE_LENGTH: u32 = 1710;

pub const LEAD_PULSES_HEAD: u32 = 8063;
pub const LEAD_PULSES_DATA: u32 = 3223;

/// T-states per millisecond at the Z80's 3.5 MHz clock.
const TSTATES_PER_MS: u32 = 3500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapePulse {
    pub duration_tstates: u32,
}

/// A flat pulse train ready for playback: level toggles once per pulse,
/// starting from `initial_level`. `sample_rate` is set only for
/// waveforms decoded from a WAV capture, where it documents the source
/// rate used to derive pulse durations from sample-run lengths.
#[derive(Debug, Clone)]
pub struct TapeWaveform {
    pub pulses: Vec<TapePulse>,
    pub initial_level: bool,
    pub sample_rate: Option<u32>,
}

impl TapeWaveform {
    pub fn empty() -> Self {
        TapeWaveform { pulses: Vec::new(), initial_level: true, sample_rate: None }
    }
}

/// Expands every block into its pilot/sync/data pulses, folding each
/// block's `pause_ms` into the duration of the *first* pulse of the
/// next block (or, for the last block, appending one trailing pulse)
/// so the level-alternation invariant holds across the whole waveform:
/// consecutive pulses always mean a level flip (spec §9).
pub fn synthesize(blocks: &[TapeBlock]) -> TapeWaveform {
    let mut pulses = Vec::new();
    let mut pending_pause_tstates = 0u32;

    for block in blocks {
        push_block_pulses(block, &mut pulses, &mut pending_pause_tstates);
        pending_pause_tstates = block.pause_ms.saturating_mul(TSTATES_PER_MS);
    }
    if pending_pause_tstates > 0 {
        pulses.push(TapePulse { duration_tstates: pending_pause_tstates });
    }

    TapeWaveform { pulses, initial_level: true, sample_rate: None }
}

fn push_block_pulses(block: &TapeBlock, pulses: &mut Vec<TapePulse>, pending_pause_tstates: &mut u32) {
    let lead_count = match block.data.first() {
        Some(&flag) if flag == 0x00 => LEAD_PULSES_HEAD,
        _ => LEAD_PULSES_DATA,
    };

    for i in 0..lead_count {
        let extra = if i == 0 { std::mem::take(pending_pause_tstates) } else { 0 };
        pulses.push(TapePulse { duration_tstates: LEAD_PULSE_LENGTH + extra });
    }
    pulses.push(TapePulse { duration_tstates: SYNC_PULSE1_LENGTH });
    pulses.push(TapePulse { duration_tstates: SYNC_PULSE2_LENGTH });

    for &byte in &block.data {
        for bit_index in 0..8 {
            let bit = (byte >> (7 - bit_index)) & 1;
            let duration = if bit == 0 { ZERO_PULSE_LENGTH } else { ONE_PULSE_LENGTH };
            pulses.push(TapePulse { duration_tstates: duration });
            pulses.push(TapePulse { duration_tstates: duration });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_header_block_gets_8063_lead_pulses() {
        let block = TapeBlock { data: vec![0x00, 0xAA, 0xBB], pause_ms: 1000 };
        let waveform = synthesize(&[block]);
        let leads: Vec<_> = waveform.pulses.iter().take(8063).collect();
        assert_eq!(leads.len(), 8063);
        assert!(leads.iter().all(|p| p.duration_tstates >= LEAD_PULSE_LENGTH));
        assert_eq!(waveform.pulses[8063].duration_tstates, SYNC_PULSE1_LENGTH);
        assert_eq!(waveform.pulses[8064].duration_tstates, SYNC_PULSE2_LENGTH);
    }

    #[test]
    fn data_block_gets_3223_lead_pulses() {
        let block = TapeBlock { data: vec![0xFF, 0x00], pause_ms: 0 };
        let waveform = synthesize(&[block]);
        assert_eq!(waveform.pulses.iter().take_while(|p| p.duration_tstates == LEAD_PULSE_LENGTH).count(), 3223);
    }

    #[test]
    fn pause_is_folded_into_next_blocks_first_pulse() {
        let blocks = vec![
            TapeBlock { data: vec![0xFF], pause_ms: 1 },
            TapeBlock { data: vec![0xFF], pause_ms: 0 },
        ];
        let waveform = synthesize(&blocks);
        let first_block_len = 3223 + 2 + 16; // lead + sync + 8 bits * 2 pulses
        let second_block_first_pulse = waveform.pulses[first_block_len];
        assert_eq!(second_block_first_pulse.duration_tstates, LEAD_PULSE_LENGTH + TSTATES_PER_MS);
    }

    #[test]
    fn bits_are_encoded_msb_first_as_two_equal_pulses() {
        let block = TapeBlock { data: vec![0x80], pause_ms: 0 };
        let waveform = synthesize(&[block]);
        let data_start = 3223 + 2;
        assert_eq!(waveform.pulses[data_start].duration_tstates, ONE_PULSE_LENGTH);
        assert_eq!(waveform.pulses[data_start + 1].duration_tstates, ONE_PULSE_LENGTH);
        assert_eq!(waveform.pulses[data_start + 2].duration_tstates, ZERO_PULSE_LENGTH);
    }
}
