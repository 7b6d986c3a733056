//! Captures `MIC` edges into TAP blocks or a WAV sample stream.
//!
//! Pulse durations between consecutive edges are buffered; a gap of
//! [`SILENCE_GAP_TSTATES`] or more (or an explicit [`TapeRecorder::stop`])
//! finalizes whatever has been captured so far into a block. TAP decode
//! follows spec's tolerance-scaled pilot/sync/data matching: the pilot
//! run's *observed* average pulse length becomes the scale factor for
//! recognizing sync and data pulses, so a capture that ran slightly fast
//! or slow still decodes correctly.
use std::io;

use crate::pulse::{TapePulse, TapeWaveform, LEAD_PULSE_LENGTH, ONE_PULSE_LENGTH, ZERO_PULSE_LENGTH};
use crate::tap::{self, TapeBlock};
use crate::wav;

/// A gap this long between MIC edges means the block has ended; on real
/// hardware the ROM loader's own pause conventions never leave a gap
/// anywhere near this large mid-block.
pub const SILENCE_GAP_TSTATES: u64 = 350_000;

const MIN_PILOT_PULSES: usize = 100;
const PILOT_TOLERANCE_FLOOR: f64 = 200.0;
const PILOT_TOLERANCE_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Tap,
    Wav,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderState {
    Idle,
    Recording,
    Stopped,
}

pub struct TapeRecorder {
    format: OutputFormat,
    state: RecorderState,
    current_pulses: Vec<TapePulse>,
    last_edge_t: Option<u64>,
    finalized_blocks: Vec<TapeBlock>,
}

impl TapeRecorder {
    pub fn new(format: OutputFormat) -> Self {
        TapeRecorder { format, state: RecorderState::Idle, current_pulses: Vec::new(), last_edge_t: None, finalized_blocks: Vec::new() }
    }

    pub fn arm(&mut self) {
        self.state = RecorderState::Recording;
        self.current_pulses.clear();
        self.last_edge_t = None;
    }

    /// Records one `MIC` transition. Called on every edge the ULA
    /// forwards, regardless of direction — duration since the previous
    /// edge is what matters, not the level itself.
    pub fn record_edge(&mut self, t_state: u64, _level: bool) {
        if self.state != RecorderState::Recording {
            return;
        }
        if let Some(last) = self.last_edge_t {
            let gap = t_state.saturating_sub(last);
            if gap >= SILENCE_GAP_TSTATES {
                self.finalize_current_block();
            } else {
                self.current_pulses.push(TapePulse { duration_tstates: gap as u32 });
            }
        }
        self.last_edge_t = Some(t_state);
    }

    /// Flushes whatever has been captured so far, finalizing any
    /// in-progress block. Stopping mid-capture must never lose data.
    pub fn stop(&mut self) {
        self.finalize_current_block();
        self.state = RecorderState::Stopped;
    }

    fn finalize_current_block(&mut self) {
        if self.current_pulses.is_empty() {
            return;
        }
        if let Some(block) = decode_tap_block(&self.current_pulses) {
            self.finalized_blocks.push(block);
        }
        self.current_pulses.clear();
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn blocks(&self) -> &[TapeBlock] {
        &self.finalized_blocks
    }

    pub fn to_tap_bytes(&self) -> io::Result<Vec<u8>> {
        tap::write_tap(&self.finalized_blocks)
    }

    /// Renders the capture (any block already finalized, plus whatever
    /// is still open) as WAV. When `existing` holds the bytes of a WAV
    /// file already on disk (the same-file-as-playback-input case), the
    /// new samples are appended after its existing `data` chunk instead
    /// of overwriting it.
    pub fn to_wav_bytes(&self, sample_rate: u32, existing: Option<&[u8]>) -> io::Result<Vec<u8>> {
        let pulses: Vec<TapePulse> = self
            .finalized_blocks
            .iter()
            .flat_map(|block| crate::pulse::synthesize(std::slice::from_ref(block)).pulses)
            .chain(self.current_pulses.iter().copied())
            .collect();
        let waveform = TapeWaveform { pulses, initial_level: true, sample_rate: Some(sample_rate) };
        let mut samples = wav::render_samples(&waveform, sample_rate);

        if let Some(existing_bytes) = existing {
            let layout = wav::locate(existing_bytes)?;
            if layout.bits_per_sample != 16 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "append target must be 16-bit PCM"));
            }
            let prior = existing_bytes[layout.data_offset..layout.data_offset + layout.data_len]
                .chunks_exact(2)
                .map(|s| i16::from_le_bytes([s[0], s[1]]));
            let mut combined: Vec<i16> = prior.collect();
            combined.append(&mut samples);
            return Ok(wav::encode(&combined, layout.sample_rate));
        }

        Ok(wav::encode(&samples, sample_rate))
    }
}

/// Decodes a captured pulse run into one TAP block, following spec's
/// tolerance-scaled pilot/sync/data algorithm. Returns `None` if the
/// capture doesn't start with a recognizable pilot tone.
fn decode_tap_block(pulses: &[TapePulse]) -> Option<TapeBlock> {
    let tolerance = (LEAD_PULSE_LENGTH as f64 * PILOT_TOLERANCE_FRACTION).max(PILOT_TOLERANCE_FLOOR);

    let mut pilot_count = 0usize;
    let mut pilot_sum = 0u64;
    for pulse in pulses {
        let duration = pulse.duration_tstates as f64;
        if (duration - LEAD_PULSE_LENGTH as f64).abs() <= tolerance {
            pilot_count += 1;
            pilot_sum += pulse.duration_tstates as u64;
        } else {
            break;
        }
    }
    if pilot_count < MIN_PILOT_PULSES {
        return None;
    }

    let observed_pilot = pilot_sum as f64 / pilot_count as f64;
    let scale = observed_pilot / LEAD_PULSE_LENGTH as f64;

    let mut cursor = pilot_count;
    if cursor + 2 > pulses.len() {
        return None;
    }
    cursor += 2; // sync1, sync2: presence is enough, they're not repeated

    let zero_target = ZERO_PULSE_LENGTH as f64 * scale;
    let one_target = ONE_PULSE_LENGTH as f64 * scale;

    let mut bits = Vec::new();
    while cursor + 1 < pulses.len() {
        let a = pulses[cursor].duration_tstates as f64;
        let b = pulses[cursor + 1].duration_tstates as f64;
        let observed = (a + b) / 2.0;
        let bit = if (observed - zero_target).abs() <= (observed - one_target).abs() { 0u8 } else { 1u8 };
        bits.push(bit);
        cursor += 2;
    }

    let mut data = Vec::with_capacity(bits.len() / 8);
    for byte_bits in bits.chunks_exact(8) {
        let byte = byte_bits.iter().fold(0u8, |acc, &bit| (acc << 1) | bit);
        data.push(byte);
    }
    if data.is_empty() {
        None
    } else {
        Some(TapeBlock { data, pause_ms: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::synthesize;

    fn feed_waveform(recorder: &mut TapeRecorder, waveform: &TapeWaveform, start: u64) -> u64 {
        let mut t = start;
        for pulse in &waveform.pulses {
            t += pulse.duration_tstates as u64;
            recorder.record_edge(t, true);
        }
        t
    }

    #[test]
    fn round_trips_a_block_through_tap_capture() {
        let block = TapeBlock { data: vec![0x00, 0xAA, 0x55, 0xFF], pause_ms: 0 };
        let waveform = synthesize(&[block.clone()]);

        let mut recorder = TapeRecorder::new(OutputFormat::Tap);
        recorder.arm();
        feed_waveform(&mut recorder, &waveform, 0);
        recorder.stop();

        assert_eq!(recorder.blocks().len(), 1);
        assert_eq!(recorder.blocks()[0].data, block.data);
    }

    #[test]
    fn a_long_silence_gap_finalizes_the_block_without_stop() {
        let block = TapeBlock { data: vec![0x00, 0x11, 0x22, 0x33], pause_ms: 0 };
        let waveform = synthesize(&[block.clone()]);

        let mut recorder = TapeRecorder::new(OutputFormat::Tap);
        recorder.arm();
        let t = feed_waveform(&mut recorder, &waveform, 0);
        recorder.record_edge(t + SILENCE_GAP_TSTATES + 1, true);

        assert_eq!(recorder.blocks().len(), 1);
        assert_eq!(recorder.blocks()[0].data, block.data);
    }

    #[test]
    fn stop_flushes_a_still_open_capture() {
        let block = TapeBlock { data: vec![0x00, 0xFF, 0x0F, 0xF0], pause_ms: 0 };
        let waveform = synthesize(&[block.clone()]);

        let mut recorder = TapeRecorder::new(OutputFormat::Tap);
        recorder.arm();
        feed_waveform(&mut recorder, &waveform, 0);
        recorder.stop();

        assert!(!recorder.blocks().is_empty());
    }

    #[test]
    fn appending_wav_bytes_preserves_prior_samples() {
        let first = TapeRecorder::new(OutputFormat::Wav).to_wav_bytes(44100, None).unwrap();

        let block = TapeBlock { data: vec![0x00, 0xAB], pause_ms: 0 };
        let waveform = synthesize(&[block]);
        let mut recorder = TapeRecorder::new(OutputFormat::Wav);
        recorder.arm();
        feed_waveform(&mut recorder, &waveform, 0);

        let appended = recorder.to_wav_bytes(44100, Some(&first)).unwrap();
        let layout_before = wav::locate(&first).unwrap();
        let layout_after = wav::locate(&appended).unwrap();
        assert!(layout_after.data_len >= layout_before.data_len);
    }
}
