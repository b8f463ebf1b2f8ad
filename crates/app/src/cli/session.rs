//! Live session: stream, meter display and stdin commands

use crate::RunArgs;
use gainstage_core::domain::config::GainstageConfig;
use gainstage_core::domain::params::{Command, ParameterStore};
use gainstage_core::domain::stage::{GainStage, MeterSnapshot};
use gainstage_infra::{DuplexStream, StatsSnapshot};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Width of the plain-text level bar
const BAR_WIDTH: usize = 30;

/// One meter reading as printed with `--json`
#[derive(Debug, Serialize)]
struct MeterLine {
    #[serde(flatten)]
    levels: MeterSnapshot,
    #[serde(flatten)]
    stats: StatsSnapshot,
}

/// Level bar scaled between `floor_db` and 0 dB
fn level_bar(db: f32, floor_db: f32) -> String {
    let fraction = if floor_db < 0.0 {
        ((db - floor_db) / -floor_db).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (fraction * BAR_WIDTH as f32).round() as usize;
    format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn format_levels(levels: &MeterSnapshot, floor_db: f32) -> String {
    format!(
        "in {:>7.1} dB [{}]  out {:>7.1} dB [{}]",
        levels.input_db,
        level_bar(levels.input_db, floor_db),
        levels.output_db,
        level_bar(levels.output_db, floor_db)
    )
}

/// A new backend error, or a counter that grew by more than one block since `last`
fn is_glitch(last: &StatsSnapshot, now: &StatsSnapshot, block_samples: u64) -> bool {
    now.stream_errors > last.stream_errors
        || now.overruns.saturating_sub(last.overruns) > block_samples
        || now.underruns.saturating_sub(last.underruns) > block_samples
}

/// Apply commands typed on stdin until it closes
async fn read_commands(store: Arc<ParameterStore>, done: mpsc::Sender<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match line.parse::<Command>() {
                Ok(command) => eprintln!("{}", store.execute(command)),
                Err(e) => eprintln!("{e} (try: gain 0.5 | gain -6db | clip on|off|toggle | bypass on|off|toggle | status)"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }

    let _ = done.send(()).await;
}

pub async fn run(config: GainstageConfig, args: &RunArgs) -> anyhow::Result<()> {
    let store = Arc::new(ParameterStore::new(config.initial_params()));
    if let Some(gain) = args.gain {
        store.set_gain(gain);
    }
    if args.clip {
        store.set_clipping(true);
    }
    if args.bypass {
        store.set_bypass(true);
    }

    let stage = GainStage::new(config.stage_settings());
    let stream = DuplexStream::start(&config.audio, stage, Arc::clone(&store))?;
    info!(
        input = stream.input_device(),
        output = stream.output_device(),
        params = %store.snapshot(),
        "Streaming, press Ctrl-C to stop"
    );

    let (done_tx, mut done_rx) = mpsc::channel(1);
    let reader = tokio::spawn(read_commands(Arc::clone(&store), done_tx));

    let floor_db = config.meter.floor_db;
    let mut ticker = tokio::time::interval(Duration::from_millis(config.meter.poll_interval_ms));
    let block_samples = u64::from(config.audio.block_size) * u64::from(config.audio.channels);
    let mut last_stats = stream.stats();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let levels = stream.levels();
                let stats = stream.stats();

                if args.json {
                    println!("{}", serde_json::to_string(&MeterLine { levels, stats })?);
                } else {
                    println!("{}", format_levels(&levels, floor_db));
                }

                if is_glitch(&last_stats, &stats, block_samples) {
                    warn!(
                        overruns = stats.overruns,
                        underruns = stats.underruns,
                        stream_errors = stats.stream_errors,
                        "Audio transport glitch"
                    );
                }
                last_stats = stats;
            }
            Some(()) = done_rx.recv(), if stdin_open => {
                stdin_open = false;
                info!("stdin closed, commands disabled");
            }
            result = &mut ctrl_c => {
                result?;
                break;
            }
        }
    }

    reader.abort();
    stream.stop();
    Ok(())
}
