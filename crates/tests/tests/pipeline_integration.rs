//! Integration tests for the gain stage pipeline
//!
//! These tests drive complete blocks through metering, gain and clipping the
//! way an audio callback does, and poll the meters the way a UI does.

use gainstage_core::domain::audio::ProcessSpec;
use gainstage_core::domain::buffer::AudioBuffer;
use gainstage_core::domain::config::{ConfigManager, GainstageConfig};
use gainstage_core::domain::dsp::{gain_to_db, SILENCE_FLOOR_DB};
use gainstage_core::domain::params::{Command, ParameterStore, ProcessParams};
use gainstage_core::domain::stage::{BlockOutcome, GainStage, StageSettings};
use gainstage_infra::{BlockRunner, SampleQueue, StreamStats};
use gainstage_tests::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// BLOCK SCENARIOS
// ============================================================================

#[test]
fn test_half_gain_stereo_block() {
    let mut stage = prepared_stage(2);
    let mut buffer = constant_block(1.0, 2);

    let outcome = stage.process_block(&mut buffer, ProcessParams::new(0.5, false));

    assert_eq!(outcome, BlockOutcome::Processed);
    for channel in buffer.channels() {
        assert!(channel.iter().all(|&s| s == 0.5));
    }

    let levels = stage.levels();
    assert!(levels.input_db.abs() < 0.01, "input {}", levels.input_db);
    assert!(
        (levels.output_db - (-6.02)).abs() < 0.01,
        "output {}",
        levels.output_db
    );
}

#[test]
fn test_clipped_stereo_block() {
    let mut stage = prepared_stage(2);
    let mut buffer = constant_block(1.0, 2);

    stage.process_block(&mut buffer, ProcessParams::new(2.0, true));

    for channel in buffer.channels() {
        for &sample in channel {
            assert_eq!(sample, 2.0_f32.tanh());
            assert!((sample - 0.9640).abs() < 1e-4);
        }
    }
}

#[test]
fn test_bypass_after_signal_reads_silence() {
    let mut stage = prepared_stage(2);
    let sine = generate_sine_wave(440.0, 0.8, BLOCK_SIZE);

    for _ in 0..8 {
        let mut buffer = block_of(&sine, 2);
        stage.process_block(&mut buffer, ProcessParams::new(0.7, true));
    }
    assert!(stage.levels().input_db > -3.0);
    assert!(stage.levels().output_db > -6.0);

    let mut buffer = block_of(&sine, 2);
    let outcome = stage.process_block(&mut buffer, ProcessParams::default().with_bypass(true));

    assert_eq!(outcome, BlockOutcome::Bypassed);
    assert_eq!(buffer.channel(0).unwrap(), sine.as_slice());
    assert_eq!(stage.input_meter().mono_peak_db(), SILENCE_FLOOR_DB);
    assert_eq!(stage.output_meter().mono_peak_db(), SILENCE_FLOOR_DB);
}

#[test]
fn test_resume_after_bypass() {
    let mut stage = prepared_stage(1);

    let mut buffer = constant_block(0.5, 1);
    stage.process_block(&mut buffer, ProcessParams::default().with_bypass(true));

    let mut buffer = constant_block(0.5, 1);
    stage.process_block(&mut buffer, ProcessParams::default());
    assert!((stage.levels().input_db - gain_to_db(0.5, SILENCE_FLOOR_DB)).abs() < 0.01);
}

// ============================================================================
// METER BALLISTICS
// ============================================================================

#[test]
fn test_release_falls_20_db_over_release_time() {
    let mut stage = prepared_stage(1);
    let params = ProcessParams::default();

    // One full-scale sample, then exactly 1.7 s of silence
    let release_samples = (SAMPLE_RATE * 1.7).round() as usize;
    let mut first = generate_silence(BLOCK_SIZE);
    first[0] = 1.0;
    let mut buffer = block_of(&first, 1);
    stage.process_block(&mut buffer, params);

    let mut remaining = release_samples - (BLOCK_SIZE - 1);
    let mut silence = AudioBuffer::new(1, BLOCK_SIZE);
    while remaining > 0 {
        silence.set_num_samples(remaining.min(BLOCK_SIZE));
        remaining -= silence.num_samples();
        stage.process_block(&mut silence, params);
    }

    let level = stage.input_meter().level_db(0);
    assert!((level - (-20.0)).abs() < 0.1, "level after release {level}");
}

#[test]
fn test_attack_is_instantaneous() {
    let mut stage = prepared_stage(1);
    let mut samples = generate_silence(BLOCK_SIZE);
    samples[BLOCK_SIZE - 1] = 0.25;

    let mut buffer = block_of(&samples, 1);
    stage.process_block(&mut buffer, ProcessParams::default());

    let expected = 20.0 * 0.25_f32.log10();
    assert!((stage.input_meter().level_db(0) - expected).abs() < 1e-4);
}

#[test]
fn test_channels_are_metered_independently() {
    let mut stage = prepared_stage(2);
    let mut buffer = AudioBuffer::from_channels(vec![
        generate_sine_wave(1000.0, 1.0, BLOCK_SIZE),
        generate_silence(BLOCK_SIZE),
    ]);
    stage.process_block(&mut buffer, ProcessParams::default());

    let meter = stage.input_meter();
    assert!(meter.level_db(0) > -0.1);
    assert_eq!(meter.level_db(1), SILENCE_FLOOR_DB);
    assert_eq!(meter.mono_peak_db(), meter.level_db(0));
    assert_eq!(meter.level_db(2), SILENCE_FLOOR_DB);
    assert_eq!(meter.level_db(usize::MAX), SILENCE_FLOOR_DB);
}

#[test]
fn test_reprepare_resets_meters() {
    let mut stage = prepared_stage(2);
    let mut buffer = constant_block(1.0, 2);
    stage.process_block(&mut buffer, ProcessParams::default());

    stage
        .prepare(ProcessSpec::new(96000.0, 256, 2))
        .expect("re-prepare");

    assert_eq!(stage.levels().input_db, SILENCE_FLOOR_DB);
    assert_eq!(stage.levels().output_db, SILENCE_FLOOR_DB);
}

// ============================================================================
// CROSS-THREAD POLLING
// ============================================================================

#[test]
fn test_ui_thread_polls_while_processing() {
    let mut stage = prepared_stage(2);
    let input_meter = stage.input_meter();
    let output_meter = stage.output_meter();
    let running = Arc::new(AtomicBool::new(true));

    let poller = {
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            let mut polls = 0usize;
            while running.load(Ordering::Relaxed) {
                for level in [input_meter.mono_peak_db(), output_meter.mono_peak_db()] {
                    assert!(level.is_finite());
                    assert!((SILENCE_FLOOR_DB..=0.01).contains(&level));
                }
                polls += 1;
            }
            polls
        })
    };

    let sine = generate_sine_wave(220.0, 1.0, BLOCK_SIZE);
    for i in 0..500 {
        let mut buffer = block_of(&sine, 2);
        let params = ProcessParams::new(0.5, i % 2 == 0).with_bypass(i % 50 == 0);
        stage.process_block(&mut buffer, params);
    }

    running.store(false, Ordering::Relaxed);
    let polls = poller.join().expect("poller thread");
    assert!(polls > 0);
}

// ============================================================================
// PARAMETERS AND CONFIGURATION
// ============================================================================

#[test]
fn test_commands_drive_the_stage() {
    let mut stage = prepared_stage(2);
    let store = ParameterStore::default();

    for line in ["gain 0.5", "clip off"] {
        store.execute(line.parse::<Command>().expect("valid command"));
    }
    let mut buffer = constant_block(1.0, 2);
    stage.process_block(&mut buffer, store.snapshot());
    assert!(buffer.channels().all(|ch| ch.iter().all(|&s| s == 0.5)));

    store.execute("bypass toggle".parse().expect("valid command"));
    let mut buffer = constant_block(1.0, 2);
    assert_eq!(
        stage.process_block(&mut buffer, store.snapshot()),
        BlockOutcome::Bypassed
    );

    // Gain requests beyond the host range are clamped before reaching the core
    store.execute("bypass off".parse().expect("valid command"));
    store.execute("gain 4".parse().expect("valid command"));
    let mut buffer = constant_block(0.25, 2);
    stage.process_block(&mut buffer, store.snapshot());
    assert!(buffer.channels().all(|ch| ch.iter().all(|&s| s == 0.25)));
}

#[tokio::test]
async fn test_configured_stage() {
    let temp_dir = tempfile::TempDir::new().expect("temp dir");
    let manager = ConfigManager::new(temp_dir.path().to_path_buf());

    let mut config = GainstageConfig::factory_default();
    config.audio.channels = 1;
    config.meter.input_enabled = false;
    config.meter.floor_db = -80.0;
    config.parameters.gain = 0.5;
    config.parameters.clipping = true;
    manager.save(&config).await.expect("save config");

    let loaded = manager.load().await;
    assert_eq!(loaded, config);

    let mut stage = GainStage::new(loaded.stage_settings());
    stage.prepare(loaded.process_spec()).expect("prepare");

    let mut buffer = constant_block(1.0, 1);
    stage.process_block(&mut buffer, loaded.initial_params());

    assert_eq!(buffer.channel(0).unwrap()[0], 0.5_f32.tanh());
    let levels = stage.levels();
    assert_eq!(levels.input_db, -80.0);
    assert!((levels.output_db - 20.0 * 0.5_f32.tanh().log10()).abs() < 0.01);
}

#[test]
fn test_stage_without_meters() {
    let mut stage = GainStage::new(StageSettings {
        input_meter_enabled: false,
        output_meter_enabled: false,
        ..StageSettings::default()
    });
    stage.prepare(ProcessSpec::default()).expect("prepare");

    let mut buffer = constant_block(1.0, 2);
    assert_eq!(
        stage.process_block(&mut buffer, ProcessParams::new(0.5, false)),
        BlockOutcome::Processed
    );
    assert_eq!(buffer.channel(1).unwrap()[0], 0.5);
    assert_eq!(stage.levels().output_db, SILENCE_FLOOR_DB);
}

// ============================================================================
// HOST TRANSPORT
// ============================================================================

#[test]
fn test_interleaved_transport_round_trip() {
    let stage = prepared_stage(2);
    let output_meter = stage.output_meter();
    let queue = Arc::new(SampleQueue::with_capacity(BLOCK_SIZE * 2 * 4, 2));
    let stats = Arc::new(StreamStats::new());
    let store = Arc::new(ParameterStore::new(ProcessParams::new(0.5, false)));
    let mut runner = BlockRunner::new(stage, store, Arc::clone(&queue), Arc::clone(&stats), 2)
        .expect("prepared stage");

    // Capture callback delivers 480 frames, playback asks for 480
    let left = generate_sine_wave(440.0, 1.0, 480);
    let interleaved: Vec<f32> = left.iter().flat_map(|&s| [s, -s]).collect();
    assert_eq!(queue.push_slice(&interleaved), 0);

    let mut output = vec![0.0; interleaved.len()];
    runner.process(&mut output, 2);

    for (out, inp) in output.iter().zip(interleaved.iter()) {
        assert_eq!(*out, inp * 0.5);
    }
    assert_eq!(stats.snapshot().underruns, 0);
    assert!(output_meter.mono_peak_db() > -6.1);
}
