use anyhow::{Context, Result};
use call_capture::{
    AudioChunk, CaptureController, ChunkMode, ChunkSink, Config, LogNotifier, PermissionGate,
    PermissionProvider, RecorderFactory, RecorderSource, StaticPermission,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "call-capture", version, about = "Chunked microphone capture for audio calls")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/call-capture")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect for a while and stream chunks from the recording device
    Record(RecordArgs),
    /// List audio input devices
    Devices,
}

#[derive(Args)]
struct RecordArgs {
    #[arg(long, value_enum, default_value_t = SourceKind::Replay)]
    source: SourceKind,

    /// WAV file to replay (replay source only)
    #[arg(long)]
    input: Option<PathBuf>,

    /// How long the connection stays up
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Where received chunks are written
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the configured chunk mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    Replay,
    Microphone,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Accumulated,
    Delta,
}

impl From<ModeArg> for ChunkMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Accumulated => ChunkMode::Accumulated,
            ModeArg::Delta => ChunkMode::Delta,
        }
    }
}

/// Host-side sink: logs every chunk and mirrors the stream into a file
struct OutputSink {
    output: Option<PathBuf>,
    mode: ChunkMode,
}

impl ChunkSink for OutputSink {
    fn on_audio_data(&self, chunk: AudioChunk) -> Result<()> {
        info!("Chunk #{}: {} bytes", chunk.sequence, chunk.len());

        let Some(path) = &self.output else {
            return Ok(());
        };

        match self.mode {
            // Latest chunk is the whole recording so far
            ChunkMode::Accumulated => std::fs::write(path, &chunk.data)
                .with_context(|| format!("Failed to write {:?}", path))?,
            ChunkMode::Delta => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open {:?}", path))?;
                file.write_all(&chunk.data)?;
            }
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_capture=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Devices => list_devices(),
        Command::Record(args) => record(cfg, args).await,
    }
}

async fn record(cfg: Config, args: RecordArgs) -> Result<()> {
    let source = match args.source {
        SourceKind::Replay => RecorderSource::Replay(
            args.input
                .clone()
                .context("--input is required for the replay source")?,
        ),
        SourceKind::Microphone => RecorderSource::Microphone,
    };

    let device = RecorderFactory::create(source, cfg.recorder_config())?;

    let mut capture_config = cfg.capture_config();
    if let Some(mode) = args.mode {
        capture_config.chunk_mode = mode.into();
    }

    if let Some(path) = &args.output {
        // Delta chunks are appended, start from an empty file
        if capture_config.chunk_mode == ChunkMode::Delta && path.exists() {
            std::fs::remove_file(path).with_context(|| format!("Failed to reset {:?}", path))?;
        }
    }

    let sink = Arc::new(OutputSink {
        output: args.output.clone(),
        mode: capture_config.chunk_mode,
    });
    let gate = PermissionGate::new(permission_provider(&cfg), Arc::new(LogNotifier));
    let controller = Arc::new(CaptureController::new(capture_config, device, sink, gate));

    controller.mount().await;

    let (connected_tx, connected_rx) = watch::channel(false);
    let watcher = controller.watch_connection(connected_rx);

    info!(
        "Connected for {}s (type 't' + Enter to toggle the microphone)",
        args.seconds
    );
    connected_tx.send(true)?;

    let deadline = sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);

    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = commands.recv(), if stdin_open => match line {
                Some(line) if line.trim() == "t" => {
                    if let Err(e) = controller.toggle().await {
                        error!("Toggle failed: {}", e);
                    }
                    println!("[{}]", controller.toggle_label());
                }
                Some(_) => {}
                None => stdin_open = false,
            }
        }
    }

    info!("Disconnecting");
    connected_tx.send(false)?;
    drop(connected_tx);
    watcher.await.context("Connection watcher panicked")?;

    controller.shutdown().await?;

    println!("{}", serde_json::to_string_pretty(&controller.stats())?);

    Ok(())
}

fn permission_provider(cfg: &Config) -> Arc<dyn PermissionProvider> {
    if let Some(status) = cfg.permission_override() {
        return Arc::new(StaticPermission(status));
    }

    #[cfg(feature = "microphone")]
    let provider: Arc<dyn PermissionProvider> = Arc::new(call_capture::permission::SystemPermission);

    #[cfg(not(feature = "microphone"))]
    let provider: Arc<dyn PermissionProvider> = Arc::new(StaticPermission::granted());

    provider
}

/// Forward stdin lines from a detached thread so a pending read never holds up exit
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    rx
}

#[cfg(feature = "microphone")]
fn list_devices() -> Result<()> {
    let devices = call_capture::audio::MicrophoneRecorder::list_devices();
    info!("Audio input devices detected: {}", devices.len());
    for device in &devices {
        println!("  - {}", device);
    }
    Ok(())
}

#[cfg(not(feature = "microphone"))]
fn list_devices() -> Result<()> {
    anyhow::bail!("Device listing requires building with the `microphone` feature")
}
