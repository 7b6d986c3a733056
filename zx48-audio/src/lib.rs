//! Beeper audio: a ring-buffered `EAR`/`MIC` edge queue feeding a
//! single-pole high-pass filter, plus an optional host playback
//! backend.
//!
//! The Z80 only ever tells the ULA "the beeper level changed at this
//! T-state"; turning that into a continuous sample stream at the
//! host's audio rate, and filtering out the DC offset a naive
//! square-wave render would leave in, is this crate's whole job.
//! [`BeeperQueue`] also carries the producer/consumer cursor
//! comparison that detects timeline rewinds and backpressure, so a
//! stalled or seeking producer doesn't desync or unboundedly grow the
//! queue relative to what's actually being played back.
use std::collections::VecDeque;
use std::sync::Mutex;

use zx48_core::ula::BeeperSink;
use zx48_core::z80::CPU_CLOCK_HZ;

#[cfg(feature = "cpal")]
pub mod host;

/// Edges queued past this many are dropped oldest-first, same
/// overflow policy as the ULA's own write queue: a producer that
/// can't keep up loses the oldest, least-relevant history first.
pub const EDGE_QUEUE_CAPACITY: usize = 4096;

/// Consecutive filtered samples with no new edges before the filter's
/// running state is reset to silence, so a paused or idle beeper
/// doesn't let quantization error accumulate into an audible drift.
pub const IDLE_RESET_SAMPLES: u32 = 512;

const HIGH_PASS_POLE: f32 = 0.995;

/// Beyond this many samples behind the playback cursor, an incoming
/// edge is treated as a genuine timeline seek: the queue is dropped
/// and the baseline resyncs to the new edge instead of replaying stale
/// history. At or under this many samples behind, the edge is simply
/// clamped forward to the playback cursor (covers the common case of
/// a handful of samples of jitter, which is not a rewind).
const REWIND_RESYNC_SAMPLES: u64 = 256;

/// Soft backpressure threshold, in samples: once the producer is
/// running this far ahead of playback, the oldest queued edges are
/// trimmed back down to it.
const THROTTLE_TRIM_SAMPLES: u64 = 2205; // ~50ms at 44.1kHz

/// Hard backpressure limit, in samples: beyond this, [`BeeperQueue::overshoot_samples`]
/// reports how far over so the frame driver can throttle CPU
/// execution itself via `zx48_core::frame::audio_throttle_delay`.
const THROTTLE_HARD_LIMIT_SAMPLES: u64 = 8820; // ~200ms at 44.1kHz

#[derive(Debug, Clone, Copy)]
struct EdgeEvent {
    t_state: u64,
    level: bool,
}

struct QueueState {
    edges: VecDeque<EdgeEvent>,
    /// The consumer's last-known position on the CPU T-state timeline.
    playback_cursor: u64,
    /// How far past the hard backpressure limit the last push was, in
    /// samples; 0 once the producer is back within budget.
    overshoot_samples: u32,
}

/// Shared producer/consumer queue of beeper edges. The emulation
/// thread owns the [`QueuedBeeper`] sink, the render thread owns the
/// [`SampleRenderer`] consumer, and both sides just take
/// `&BeeperQueue`.
pub struct BeeperQueue {
    state: Mutex<QueueState>,
    t_states_per_sample: f64,
}

impl BeeperQueue {
    pub fn new(sample_rate: u32) -> Self {
        BeeperQueue {
            state: Mutex::new(QueueState {
                edges: VecDeque::with_capacity(EDGE_QUEUE_CAPACITY),
                playback_cursor: 0,
                overshoot_samples: 0,
            }),
            t_states_per_sample: CPU_CLOCK_HZ as f64 / sample_rate as f64,
        }
    }

    fn samples_to_tstates(&self, samples: u64) -> u64 {
        (samples as f64 * self.t_states_per_sample) as u64
    }

    fn tstates_to_samples(&self, t_states: u64) -> u64 {
        (t_states as f64 / self.t_states_per_sample) as u64
    }

    /// Pushes an edge, applying the rewind and backpressure policy
    /// described in the module docs. Returns `true` if an edge had to
    /// be dropped to enforce the trim threshold or hard capacity.
    fn push(&self, mut event: EdgeEvent) -> bool {
        let mut state = self.state.lock().unwrap();
        let mut dropped = false;

        if event.t_state < state.playback_cursor {
            let behind = self.tstates_to_samples(state.playback_cursor - event.t_state);
            if behind > REWIND_RESYNC_SAMPLES {
                state.edges.clear();
                state.playback_cursor = event.t_state;
            } else {
                event.t_state = state.playback_cursor;
            }
            state.overshoot_samples = 0;
        } else {
            let ahead = self.tstates_to_samples(event.t_state - state.playback_cursor);
            state.overshoot_samples = ahead.saturating_sub(THROTTLE_HARD_LIMIT_SAMPLES) as u32;
            if ahead > THROTTLE_TRIM_SAMPLES {
                let keep_from = event.t_state.saturating_sub(self.samples_to_tstates(THROTTLE_TRIM_SAMPLES));
                while state.edges.front().map_or(false, |oldest| oldest.t_state < keep_from) {
                    state.edges.pop_front();
                    dropped = true;
                }
            }
        }

        if state.edges.len() >= EDGE_QUEUE_CAPACITY {
            state.edges.pop_front();
            dropped = true;
        }
        state.edges.push_back(event);
        dropped
    }

    fn pop(&self) -> Option<EdgeEvent> {
        self.state.lock().unwrap().edges.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().edges.len()
    }

    /// Advances the consumer's position on the CPU T-state timeline.
    /// Called by [`SampleRenderer`] after each render batch; read by
    /// [`Self::push`] to detect rewinds and backpressure.
    pub fn advance_playback_cursor(&self, t_state: u64) {
        let mut state = self.state.lock().unwrap();
        if t_state > state.playback_cursor {
            state.playback_cursor = t_state;
        }
    }

    /// How many samples beyond the hard backpressure limit the
    /// producer was running ahead of playback as of the last pushed
    /// edge, or 0 if within budget. Feed this into
    /// `zx48_core::frame::audio_throttle_delay` to size the frame
    /// driver's sleep.
    pub fn overshoot_samples(&self) -> u32 {
        self.state.lock().unwrap().overshoot_samples
    }
}

/// A [`BeeperSink`] that queues edges onto a [`BeeperQueue`] for later
/// rendering, logging (at debug level) whenever backpressure forces an
/// edge to be dropped.
pub struct QueuedBeeper<'q> {
    queue: &'q BeeperQueue,
}

impl<'q> QueuedBeeper<'q> {
    pub fn new(queue: &'q BeeperQueue) -> Self {
        QueuedBeeper { queue }
    }
}

impl<'q> BeeperSink for QueuedBeeper<'q> {
    fn push_edge(&mut self, t_state: u64, level: bool) {
        if self.queue.push(EdgeEvent { t_state, level }) {
            log::debug!("beeper edge queue overflowed, dropped oldest edge");
        }
    }
}

/// `y = raw - last_in + 0.995 * last_out`: a single-pole high-pass
/// filter that removes the DC bias a naive 0/1 square-wave render
/// would otherwise leave in the output.
#[derive(Default)]
struct HighPassFilter {
    last_in: f32,
    last_out: f32,
}

impl HighPassFilter {
    fn process(&mut self, raw: f32) -> f32 {
        let out = raw - self.last_in + HIGH_PASS_POLE * self.last_out;
        self.last_in = raw;
        self.last_out = out;
        out
    }

    fn reset(&mut self) {
        self.last_in = 0.0;
        self.last_out = 0.0;
    }
}

/// Drains a [`BeeperQueue`] and renders it into a host sample stream
/// at a fixed sample rate, applying [`HighPassFilter`] and resetting
/// it after a long enough run of silence.
pub struct SampleRenderer {
    sample_rate: u32,
    level: bool,
    next_edge_t: Option<u64>,
    t_state_cursor: u64,
    filter: HighPassFilter,
    idle_samples: u32,
}

impl SampleRenderer {
    pub fn new(sample_rate: u32) -> Self {
        SampleRenderer {
            sample_rate,
            level: false,
            next_edge_t: None,
            t_state_cursor: 0,
            filter: HighPassFilter::default(),
            idle_samples: 0,
        }
    }

    /// Renders `count` samples into `out`, pulling new edges off
    /// `queue` as the T-state cursor reaches them.
    pub fn render(&mut self, queue: &BeeperQueue, out: &mut [f32]) {
        let t_states_per_sample = CPU_CLOCK_HZ as f64 / self.sample_rate as f64;

        for sample in out.iter_mut() {
            let mut crossed_edge = false;
            while self.next_edge_t.is_none() {
                match queue.pop() {
                    Some(edge) => {
                        self.level = edge.level;
                        self.next_edge_t = Some(edge.t_state);
                    }
                    None => break,
                }
            }
            if let Some(edge_t) = self.next_edge_t {
                if self.t_state_cursor >= edge_t {
                    self.next_edge_t = None;
                    crossed_edge = true;
                }
            }
            self.idle_samples = if crossed_edge { 0 } else { self.idle_samples.saturating_add(1) };

            *sample = if self.idle_samples >= IDLE_RESET_SAMPLES {
                self.filter.reset();
                0.0
            } else {
                let raw = if self.level { 1.0 } else { -1.0 };
                self.filter.process(raw)
            };
            self.t_state_cursor += t_states_per_sample.round() as u64;
        }
        queue.advance_playback_cursor(self.t_state_cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_push_and_pop_in_fifo_order() {
        let queue = BeeperQueue::new(44100);
        let mut sink = QueuedBeeper::new(&queue);
        sink.push_edge(100, true);
        sink.push_edge(200, false);
        assert_eq!(queue.pop().unwrap().t_state, 100);
        assert_eq!(queue.pop().unwrap().t_state, 200);
    }

    #[test]
    fn overflow_drops_the_oldest_edge() {
        let queue = BeeperQueue::new(44100);
        let mut sink = QueuedBeeper::new(&queue);
        for t in 0..(EDGE_QUEUE_CAPACITY as u64 + 1) {
            sink.push_edge(t, t % 2 == 0);
        }
        assert_eq!(queue.pending(), EDGE_QUEUE_CAPACITY);
        assert_eq!(queue.pop().unwrap().t_state, 1);
    }

    #[test]
    fn render_produces_one_sample_per_output_slot() {
        let queue = BeeperQueue::new(44100);
        let mut sink = QueuedBeeper::new(&queue);
        sink.push_edge(0, true);
        sink.push_edge(1000, false);
        let mut renderer = SampleRenderer::new(44100);
        let mut out = [0.0f32; 16];
        renderer.render(&queue, &mut out);
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn idle_silence_resets_the_filter() {
        let queue = BeeperQueue::new(44100);
        let mut renderer = SampleRenderer::new(44100);
        let mut out = vec![0.0f32; (IDLE_RESET_SAMPLES as usize) + 10];
        renderer.render(&queue, &mut out);
        assert_eq!(renderer.filter.last_in, 0.0);
        assert_eq!(renderer.filter.last_out, 0.0);
    }

    #[test]
    fn small_jitter_behind_the_cursor_is_clamped_forward_not_rejected() {
        let queue = BeeperQueue::new(44100);
        let mut sink = QueuedBeeper::new(&queue);
        queue.advance_playback_cursor(1_000);
        sink.push_edge(990, true); // 10T behind, nowhere near a real rewind
        let edge = queue.pop().unwrap();
        assert_eq!(edge.t_state, 1_000);
    }

    #[test]
    fn a_large_rewind_purges_the_queue_and_resyncs_the_baseline() {
        let queue = BeeperQueue::new(44100);
        let mut sink = QueuedBeeper::new(&queue);
        sink.push_edge(4_000_000, true);
        sink.push_edge(4_100_000, false);
        queue.advance_playback_cursor(4_100_000);
        assert_eq!(queue.pending(), 2);

        // Tape rewound to the start: far more than REWIND_RESYNC_SAMPLES
        // behind the cursor, so the stale queue is dropped and the
        // baseline resyncs to the new position instead of replaying it.
        sink.push_edge(0, true);
        assert_eq!(queue.pending(), 1);
        let edge = queue.pop().unwrap();
        assert_eq!(edge.t_state, 0);
    }

    #[test]
    fn running_far_ahead_of_playback_trims_the_backlog_and_reports_overshoot() {
        let queue = BeeperQueue::new(44100);
        let mut sink = QueuedBeeper::new(&queue);
        sink.push_edge(0, true);
        // ~50ms worth of edges the consumer hasn't caught up to yet.
        for t in (100_000u64..300_000).step_by(1000) {
            sink.push_edge(t, t % 2 == 0);
        }
        assert!(queue.pending() < 202, "backlog should have been trimmed toward the throttle threshold");

        // Push an edge far enough ahead to also cross the hard limit
        // (~200ms): overshoot_samples should report the excess.
        sink.push_edge(3_500_000, true);
        assert!(queue.overshoot_samples() > 0);
    }
}
