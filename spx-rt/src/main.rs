//! Experiment Runtime (spx-rt) - Main entry point
//!
//! Loads the levers and the stimulus manifest, selects and locks the output
//! device, then runs one session. Session records are written as JSON lines
//! for the export collaborator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use spx_common::config::load_levers;
use spx_common::time::millis_to_duration;
use spx_common::SessionRecord;
use spx_rt::audio::{AudioPlatform, CpalPlatform, DeviceManager, VirtualPlatform};
use spx_rt::console::{drive_sections, AutoSubject, ConsoleSubject};
use spx_rt::records::ChannelSink;
use spx_rt::scheduler::SubjectInterface;
use spx_rt::session::{SessionParts, SessionRunner};
use spx_rt::stimuli::{Manifest, Randomizer, StimulusRegistry};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for spx-rt
#[derive(Parser, Debug)]
#[command(name = "spx-rt")]
#[command(about = "Speech-perception experiment runtime")]
#[command(version)]
struct Args {
    /// Lever file (overrides SPX_CONFIG and the per-user file)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stimulus manifest (TOML)
    #[arg(short, long, env = "SPX_MANIFEST", required_unless_present = "list_devices")]
    manifest: Option<PathBuf>,

    /// Randomizer seed; drawn from the clock when absent
    #[arg(short, long, env = "SPX_SEED")]
    seed: Option<u64>,

    /// Output device name (overrides the audio_device lever)
    #[arg(long, env = "SPX_AUDIO_DEVICE")]
    audio_device: Option<String>,

    /// Directory for session record files
    #[arg(long, default_value = ".", env = "SPX_RECORDS_DIR")]
    records_dir: PathBuf,

    /// Dry run: virtual output device, automatic responses and sections
    #[arg(long)]
    simulate: bool,

    /// Print the available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spx_rt=debug,spx_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let (mut levers, source) =
        load_levers(args.config.as_deref()).context("Failed to load levers")?;
    if let Some(device) = args.audio_device.clone() {
        levers.audio_device = Some(device);
        levers.validate().context("Invalid levers")?;
    }
    let levers = Arc::new(levers);

    let platform: Arc<dyn AudioPlatform> = if args.simulate {
        info!("Simulation mode: using the virtual output device");
        Arc::new(VirtualPlatform::simulated())
    } else {
        Arc::new(CpalPlatform::new(millis_to_duration(
            levers.playback_watchdog_ms,
        )))
    };
    let devices = DeviceManager::new(Arc::clone(&levers), Arc::clone(&platform));

    if args.list_devices {
        for device in devices.list().context("Failed to enumerate output devices")? {
            let mode = if device.host_api.is_exclusive() {
                "exclusive"
            } else {
                "shared"
            };
            println!("{}\t{}\t{}", device.host_api, mode, device.name);
        }
        return Ok(());
    }

    let manifest_path = args
        .manifest
        .clone()
        .context("A stimulus manifest is required")?;
    let sample_rate = levers.sample_rate;
    let registry = tokio::task::spawn_blocking(move || -> spx_rt::Result<StimulusRegistry> {
        let manifest = Manifest::from_file(&manifest_path)?;
        StimulusRegistry::load(&manifest, sample_rate)
    })
    .await
    .context("Stimulus loading task failed")?
    .context("Failed to load stimuli")?;
    info!(
        "Loaded {} stimuli in {} block(s)",
        registry.len(),
        registry.blocks().len()
    );

    let device = Arc::new(devices.handle().context("Failed to select an output device")?);

    let randomizer = match args.seed {
        Some(seed) => Randomizer::new(seed),
        None => Randomizer::from_clock(),
    };

    let (sink, records) = ChannelSink::new();
    let (mut runner, handle) = SessionRunner::new(SessionParts {
        levers: Arc::clone(&levers),
        registry: Arc::new(registry),
        device,
        randomizer,
        sink: Arc::new(sink),
        host: spx_rt::host::detect(),
        lever_source: source.to_string(),
    });

    tokio::fs::create_dir_all(&args.records_dir)
        .await
        .context("Failed to create the records directory")?;
    let records_path = args
        .records_dir
        .join(format!("session-{}.jsonl", runner.session_id()));
    let file = tokio::fs::File::create(&records_path)
        .await
        .with_context(|| format!("Failed to create {}", records_path.display()))?;
    info!("Writing session records to {}", records_path.display());
    let writer = tokio::spawn(write_records(file, records));

    let sections = tokio::spawn(drive_sections(handle, runner.sections(), !args.simulate));

    let subject: Box<dyn SubjectInterface> = if args.simulate {
        Box::new(AutoSubject::new("simulated"))
    } else {
        Box::new(ConsoleSubject::new())
    };
    let result = runner.run(subject).await;

    // The runner dropped its sink and section notifier; both tasks wind down
    match sections.await {
        Ok(Err(e)) => warn!("Section handler stopped: {}", e),
        Err(e) => warn!("Section handler task failed: {}", e),
        Ok(Ok(())) => {}
    }
    let written = writer.await.context("Record writer task failed")??;
    info!("{} records written", written);

    match result {
        Ok(summary) => {
            info!(
                "Session {} {}: {} trial(s)",
                summary.session_id,
                summary.outcome,
                summary.blocks.map(|b| b.trials_run).unwrap_or(0)
            );
            Ok(())
        }
        Err(e) if !e.is_fatal() => {
            info!("Session ended early: {}", e);
            Ok(())
        }
        Err(e) => {
            error!("Session halted: {}", e);
            Err(e).context("Session halted")
        }
    }
}

/// Persist records as JSON lines until the sink closes
async fn write_records(
    mut file: tokio::fs::File,
    mut records: mpsc::UnboundedReceiver<SessionRecord>,
) -> Result<usize> {
    let mut written = 0;
    while let Some(record) = records.recv().await {
        let mut line = record.to_json_line().context("Failed to encode a record")?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .context("Failed to write a record")?;
        written += 1;
    }
    file.flush().await.context("Failed to flush records")?;
    Ok(written)
}
