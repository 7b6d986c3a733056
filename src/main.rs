//! `zx48emu`: CLI entry point wiring the Z80 core, ULA, tape subsystem
//! and beeper audio together behind the frame driver.
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use log::{error, info, warn};

use zx48_audio::{BeeperQueue, QueuedBeeper, SampleRenderer};
use zx48_core::frame::{audio_throttle_delay, FrameDriver};
use zx48_core::testrunner::{self, TestOutcome};
use zx48_core::Spectrum;
use zx48_formats::tape::playback::TransportState;
use zx48_formats::tape::recorder::{OutputFormat, TapeRecorder};
use zx48_formats::tape::TapeTransport;
use zx48_formats::TapePlayer;

const ROM_SIZE: usize = 0x4000;
const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// A ZX Spectrum 48K emulator core: Z80 interpreter, ULA, tape
/// subsystem and beeper audio.
#[derive(Parser, Debug)]
#[command(name = "zx48emu", version, about)]
struct Cli {
    /// ROM image (defaults to `48.rom`), or a bare tape image path
    /// (`.tap`/`.tzx`/`.wav`) equivalent to the matching `--tap`/`--tzx`/`--wav` flag.
    rom_or_tape: Option<PathBuf>,

    /// Write rendered audio to a mono 16-bit PCM WAV file.
    #[arg(long)]
    audio_dump: Option<PathBuf>,

    /// Emit beeper-subsystem diagnostics to stderr.
    #[arg(long)]
    beeper_log: bool,

    /// Emit tape-subsystem diagnostics to stderr.
    #[arg(long)]
    tape_debug: bool,

    /// Load a TAP tape image.
    #[arg(long, group = "tape_in")]
    tap: Option<PathBuf>,
    /// Load a TZX tape image.
    #[arg(long, group = "tape_in")]
    tzx: Option<PathBuf>,
    /// Load a WAV tape capture.
    #[arg(long, group = "tape_in")]
    wav: Option<PathBuf>,

    /// Recorder output path, TAP format.
    #[arg(long, group = "tape_out")]
    save_tap: Option<PathBuf>,
    /// Recorder output path, WAV format.
    #[arg(long, group = "tape_out")]
    save_wav: Option<PathBuf>,

    /// Run the CPU self-test harness against CP/M-convention test
    /// binaries instead of emulating.
    #[arg(long)]
    run_tests: bool,
    /// Directory of ZEXDOC/ZEXALL-style test binaries for `--run-tests`.
    #[arg(long)]
    test_rom_dir: Option<PathBuf>,
}

enum TapeInput {
    Tap(PathBuf),
    Tzx(PathBuf),
    Wav(PathBuf),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.run_tests {
        return run_self_tests(&cli);
    }

    match run_emulation(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(log::LevelFilter::Warn);
    if cli.beeper_log {
        builder.filter_module("zx48_audio", log::LevelFilter::Debug);
    }
    if cli.tape_debug {
        builder.filter_module("zx48_formats::tape", log::LevelFilter::Debug);
    }
    builder.init();
}

fn run_self_tests(cli: &Cli) -> ExitCode {
    let dir = match &cli.test_rom_dir {
        Some(dir) => dir.clone(),
        None => {
            error!("--run-tests requires --test-rom-dir DIR");
            return ExitCode::FAILURE;
        }
    };
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!("cannot read test ROM directory {}: {err}", dir.display());
            return ExitCode::FAILURE;
        }
    };

    let mut any_failed = false;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("com") {
            continue;
        }
        let rom = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("cannot read {}: {err}", path.display());
                any_failed = true;
                continue;
            }
        };
        info!("running test binary {}", path.display());
        let TestOutcome { output, timed_out } = testrunner::run_cpm_test_binary(&rom, 200_000_000);
        print!("{output}");
        if timed_out {
            warn!("{} did not reach warm boot within the iteration budget", path.display());
            any_failed = true;
        }
    }

    if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_emulation(cli: &Cli) -> Result<(), String> {
    let (rom_path, tape_from_positional) = classify_positional(cli.rom_or_tape.clone());
    let rom_path = resolve_rom_path(rom_path)?;
    let rom_bytes = fs::read(&rom_path).map_err(|e| format!("cannot read ROM {}: {e}", rom_path.display()))?;
    if rom_bytes.len() != ROM_SIZE {
        return Err(format!("ROM {} must be exactly {ROM_SIZE} bytes, got {}", rom_path.display(), rom_bytes.len()));
    }

    let tape_input = tape_from_positional
        .or_else(|| cli.tap.clone().map(TapeInput::Tap))
        .or_else(|| cli.tzx.clone().map(TapeInput::Tzx))
        .or_else(|| cli.wav.clone().map(TapeInput::Wav));

    let mut transport = TapeTransport::default();
    if let Some(input) = &tape_input {
        let waveform = load_tape(input)?;
        info!("loaded tape image");
        let mut player = TapePlayer::new(waveform);
        player.play(0);
        transport.player = Some(player);
    }

    let recorder_format = match (&cli.save_tap, &cli.save_wav) {
        (Some(_), Some(_)) => unreachable!("clap ArgGroup rejects both"),
        (Some(_), None) => Some(OutputFormat::Tap),
        (None, Some(_)) => Some(OutputFormat::Wav),
        (None, None) => None,
    };
    if let Some(format) = recorder_format {
        let mut recorder = TapeRecorder::new(format);
        recorder.arm();
        transport.recorder = Some(recorder);
    }

    let queue = BeeperQueue::new(AUDIO_SAMPLE_RATE);
    let beeper = QueuedBeeper::new(&queue);
    let mut spectrum = Spectrum::new(beeper, transport);
    spectrum.memory.load_rom(&rom_bytes).map_err(|e| format!("failed to load ROM into memory: {e}"))?;
    spectrum.reset();

    let mut renderer = SampleRenderer::new(AUDIO_SAMPLE_RATE);
    let mut dumped_samples: Vec<f32> = Vec::new();
    let mut driver = FrameDriver::new();

    loop {
        driver.run_until_frame(&mut spectrum);

        if cli.audio_dump.is_some() {
            let mut batch = vec![0.0f32; AUDIO_SAMPLE_RATE as usize / 50];
            renderer.render(&queue, &mut batch);
            dumped_samples.extend_from_slice(&batch);
        }

        if let Some(player) = &spectrum.ula.tape().player {
            if player.state() == TransportState::Done {
                break;
            }
        } else if tape_input.is_none() {
            // No tape and no way to request a stop (host input is out
            // of scope): batch mode has nothing left to wait for.
            break;
        }

        let overshoot = queue.overshoot_samples();
        if overshoot > 0 {
            thread::sleep(audio_throttle_delay(overshoot));
        } else if driver.should_yield() {
            thread::sleep(audio_throttle_delay(0));
        }
    }

    if let Some(dump_path) = &cli.audio_dump {
        let bytes = render_dump(&dumped_samples, AUDIO_SAMPLE_RATE);
        fs::write(dump_path, bytes).map_err(|e| format!("failed to write audio dump {}: {e}", dump_path.display()))?;
    }

    if let Some(recorder) = &mut spectrum.ula.tape_mut().recorder {
        recorder.stop();
        if let Some(path) = &cli.save_tap {
            let bytes = recorder.to_tap_bytes().map_err(|e| format!("failed to encode TAP output: {e}"))?;
            fs::write(path, bytes).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        } else if let Some(path) = &cli.save_wav {
            let existing = fs::read(path).ok();
            let bytes = recorder
                .to_wav_bytes(AUDIO_SAMPLE_RATE, existing.as_deref())
                .map_err(|e| format!("failed to encode WAV output: {e}"))?;
            fs::write(path, bytes).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        }
    }

    Ok(())
}

fn render_dump(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let pcm: Vec<i16> = samples.iter().map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).collect();
    let mut waveform_samples = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm {
        waveform_samples.extend_from_slice(&sample.to_le_bytes());
    }
    let data_len = waveform_samples.len();
    let byte_rate = sample_rate * 2;
    let mut out = Vec::with_capacity(44 + data_len);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data_len as u32).to_le_bytes());
    out.extend_from_slice(&waveform_samples);
    out
}

fn classify_positional(positional: Option<PathBuf>) -> (Option<PathBuf>, Option<TapeInput>) {
    match positional {
        Some(path) => match path.extension().and_then(|e| e.to_str()) {
            Some("tap") => (None, Some(TapeInput::Tap(path))),
            Some("tzx") => (None, Some(TapeInput::Tzx(path))),
            Some("wav") => (None, Some(TapeInput::Wav(path))),
            _ => (Some(path), None),
        },
        None => (None, None),
    }
}

fn resolve_rom_path(explicit: Option<PathBuf>) -> Result<PathBuf, String> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let cwd_candidate = Path::new("48.rom");
    if cwd_candidate.exists() {
        return Ok(cwd_candidate.to_path_buf());
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("48.rom");
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }
    Err("no ROM path given and 48.rom not found in the working directory or next to the executable".to_string())
}

fn load_tape(input: &TapeInput) -> Result<zx48_formats::TapeWaveform, String> {
    let (path, blocks) = match input {
        TapeInput::Tap(path) => {
            let bytes = fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            let blocks = zx48_formats::read_tap(&bytes).map_err(|e| format!("malformed TAP {}: {e}", path.display()))?;
            (path, blocks)
        }
        TapeInput::Tzx(path) => {
            let bytes = fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            let blocks = zx48_formats::read_tzx(&bytes).map_err(|e| format!("malformed TZX {}: {e}", path.display()))?;
            (path, blocks)
        }
        TapeInput::Wav(path) => {
            let bytes = fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            let waveform = zx48_formats::wav::read_wav(&bytes).map_err(|e| format!("malformed WAV {}: {e}", path.display()))?;
            info!("loaded WAV tape capture from {}", path.display());
            return Ok(waveform);
        }
    };
    info!("loaded {} tape blocks from {}", blocks.len(), path.display());
    Ok(zx48_formats::synthesize(&blocks))
}
