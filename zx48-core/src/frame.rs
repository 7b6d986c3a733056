//! The outer loop: wall-clock time in, CPU steps and frame interrupts
//! out. Ties [`Cpu`], [`Memory`] and [`Ula`] together behind the
//! [`Bus`] trait and exposes a single [`FrameDriver::run_until_frame`]
//! entry point for the binary's event loop.
use std::time::{Duration, Instant};

use crate::memory::Memory;
use crate::ula::{BeeperSink, TapeDeck, Ula};
use crate::video::{self, Frame};
use crate::z80::{Bus, Cpu};

/// T-states per 50 Hz frame: `3_500_000 / 50`.
pub const T_STATES_PER_FRAME: u32 = 69888;

/// Caps a single outer-loop catch-up to 0.25 s of CPU time, so a stall
/// (debugger breakpoint, OS scheduling hiccup) can't demand years of
/// emulated cycles in one go.
const MAX_CATCH_UP: Duration = Duration::from_millis(250);

/// A 48K machine: CPU, flat memory, and the ULA port, wired together.
pub struct Spectrum<S, T> {
    pub cpu: Cpu,
    pub memory: Memory,
    pub ula: Ula<S, T>,
    pub flash: video::FlashPhase,
    frame_t_states: u32,
}

impl<S: BeeperSink, T: TapeDeck> Spectrum<S, T> {
    pub fn new(beeper: S, tape: T) -> Self {
        Spectrum {
            cpu: Cpu::new(),
            memory: Memory::new(),
            ula: Ula::new(beeper, tape),
            flash: video::FlashPhase::default(),
            frame_t_states: 0,
        }
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// Executes exactly one CPU instruction (draining any ULA writes it
    /// queued), advances the per-frame T-state counter, and fires the
    /// frame interrupt plus a render when a frame boundary is crossed.
    fn step(&mut self) -> (u32, Option<Frame>) {
        let base_ts = self.frame_t_states as u64;
        let t = {
            let mut bus = SpectrumBus { memory: &mut self.memory, ula: &mut self.ula };
            self.cpu.step(&mut bus, base_ts)
        };
        self.ula.drain_writes();
        self.frame_t_states += t;

        if self.frame_t_states >= T_STATES_PER_FRAME {
            self.frame_t_states -= T_STATES_PER_FRAME;
            if self.cpu.regs.iff1 {
                let mut bus = SpectrumBus { memory: &mut self.memory, ula: &mut self.ula };
                self.cpu.interrupt(&mut bus, 0xFF);
            }
            self.flash.tick();
            let frame = video::render(&self.memory, self.ula.border, self.flash.phase);
            return (t, Some(frame));
        }
        (t, None)
    }
}

struct SpectrumBus<'a, S, T> {
    memory: &'a mut Memory,
    ula: &'a mut Ula<S, T>,
}

impl<'a, S: BeeperSink, T: TapeDeck> Bus for SpectrumBus<'a, S, T> {
    fn read_mem(&mut self, addr: u16) -> u8 {
        self.memory.read(addr)
    }
    fn write_mem(&mut self, addr: u16, value: u8) {
        self.memory.write(addr, value);
    }
    fn read_io(&mut self, port: u16, ts: u64) -> u8 {
        self.ula.read_io(port, ts)
    }
    fn write_io(&mut self, port: u16, value: u8, ts: u64) {
        self.ula.write_io(port, value, ts);
    }
}

/// Converts wall-clock elapsed time into a T-state budget and steps the
/// CPU to drain it, producing a rendered [`Frame`] each time a frame
/// boundary is crossed.
pub struct FrameDriver {
    last_now: Option<Instant>,
    /// Fractional T-states owed to the CPU; kept as `f64` since a
    /// sample of wall-clock time rarely divides evenly into 3.5 MHz
    /// cycles.
    cycle_accumulator: f64,
}

impl Default for FrameDriver {
    fn default() -> Self {
        FrameDriver { last_now: None, cycle_accumulator: 0.0 }
    }
}

impl FrameDriver {
    pub fn new() -> Self {
        FrameDriver::default()
    }

    /// Runs `spectrum` forward to catch up with wall-clock time since
    /// the previous call, returning the most recently rendered frame if
    /// at least one frame boundary was crossed (a long stall can cross
    /// several; only the last is returned, matching a real display that
    /// only shows the current frame).
    pub fn run_until_frame<S: BeeperSink, T: TapeDeck>(
        &mut self,
        spectrum: &mut Spectrum<S, T>,
    ) -> Option<Frame> {
        let now = Instant::now();
        let elapsed = match self.last_now {
            Some(last) => now.duration_since(last).min(MAX_CATCH_UP),
            None => Duration::from_secs(0),
        };
        self.last_now = Some(now);

        self.cycle_accumulator += elapsed.as_secs_f64() * crate::z80::CPU_CLOCK_HZ as f64;

        let mut latest_frame = None;
        while self.cycle_accumulator >= 1.0 {
            let (t, frame) = spectrum.step();
            self.cycle_accumulator -= t as f64;
            if frame.is_some() {
                latest_frame = frame;
            }
        }
        latest_frame
    }

    /// True when the driver has no more than a fraction of a T-state's
    /// worth of work queued and the caller should yield briefly instead
    /// of busy-looping (spec §5: "yields... when the cycle accumulator
    /// is below 1.0").
    pub fn should_yield(&self) -> bool {
        self.cycle_accumulator < 1.0
    }
}

/// How long the emulation loop should sleep when the beeper queue is
/// backed up by `overshoot_samples` beyond the throttle threshold.
/// Grows with the overshoot, capped at 8 ms (spec §5).
pub fn audio_throttle_delay(overshoot_samples: u32) -> Duration {
    let ms = (1 + overshoot_samples / 64).min(8);
    Duration::from_millis(ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ula::NullPeripheral;
    use crate::z80::InterruptMode;

    #[test]
    fn frame_boundary_fires_interrupt_and_renders() {
        let mut spectrum = Spectrum::new(NullPeripheral, NullPeripheral);
        spectrum.reset();
        spectrum.cpu.regs.iff1 = true;
        spectrum.cpu.regs.im = InterruptMode::Im1;
        let mut frames = 0;
        let mut ts = 0u32;
        loop {
            let (t, frame) = spectrum.step();
            ts += t;
            if frame.is_some() {
                frames += 1;
                break;
            }
            if ts > T_STATES_PER_FRAME * 2 {
                panic!("frame boundary never crossed");
            }
        }
        assert_eq!(frames, 1);
    }

    #[test]
    fn throttle_delay_is_capped_at_8ms() {
        assert!(audio_throttle_delay(100_000) <= Duration::from_millis(8));
        assert!(audio_throttle_delay(0) >= Duration::from_millis(1));
    }
}
