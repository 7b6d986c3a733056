//! Exercises the tape pipeline purely through the public API: encoding
//! blocks to a pulse waveform, playing that waveform back as EAR edges,
//! recording those edges on the MIC side, and decoding them back to the
//! same blocks.
use zx48_formats::tape::playback::{TapePlayer, TransportState};
use zx48_formats::tape::recorder::{OutputFormat, TapeRecorder};
use zx48_formats::{synthesize, TapeBlock};

#[test]
fn encode_then_decode_round_trips_a_multi_block_tape() {
    let blocks = vec![
        TapeBlock { data: vec![0x00, 0x03, b'A', b'B', b'C'], pause_ms: 1000 },
        TapeBlock { data: vec![0xFF, 0xDE, 0xAD, 0xBE, 0xEF], pause_ms: 1000 },
    ];
    let waveform = synthesize(&blocks);

    let mut player = TapePlayer::new(waveform);
    player.play(0);
    let mut recorder = TapeRecorder::new(OutputFormat::Tap);
    recorder.arm();

    // Sample EAR in small steps and feed every level flip to the
    // recorder as a MIC edge, the way a host loop wires playback
    // monitoring into a capture session. Runs until playback exhausts
    // the waveform rather than a fixed T-state budget, since a full
    // pilot tone is millions of T-states long.
    let mut last_level = true;
    let mut t = 0u64;
    loop {
        t += 100;
        let level = player.advance_to(t);
        if level != last_level {
            recorder.record_edge(t, level);
            last_level = level;
        }
        if player.state() == TransportState::Done {
            break;
        }
    }
    recorder.stop();

    let decoded = recorder.blocks();
    assert_eq!(decoded.len(), blocks.len());
    for (decoded_block, original) in decoded.iter().zip(&blocks) {
        assert_eq!(decoded_block.data, original.data);
    }
}

#[test]
fn wav_capture_can_append_to_its_own_playback_source() {
    // The same file used as a playback source can also be the target of
    // a recording session; appended bytes must come after the original
    // data chunk rather than overwrite it.
    let source_blocks = vec![TapeBlock { data: vec![0x00, 0x01, 0x02], pause_ms: 0 }];
    let source_waveform = synthesize(&source_blocks);
    let source_wav = zx48_formats::wav::write_wav(&source_waveform, 44100);

    let mut recorder = TapeRecorder::new(OutputFormat::Wav);
    recorder.arm();
    let capture_blocks = vec![TapeBlock { data: vec![0x00, 0x09, 0x09], pause_ms: 0 }];
    let capture_waveform = synthesize(&capture_blocks);
    let mut t = 0u64;
    for pulse in &capture_waveform.pulses {
        t += pulse.duration_tstates as u64;
        recorder.record_edge(t, true);
    }

    let appended = recorder.to_wav_bytes(44100, Some(&source_wav)).unwrap();
    let original_layout = zx48_formats::wav::locate(&source_wav).unwrap();
    let appended_layout = zx48_formats::wav::locate(&appended).unwrap();
    assert!(appended_layout.data_len > original_layout.data_len);
    assert_eq!(&appended[44..44 + original_layout.data_len], &source_wav[44..]);
}
