use clap::Parser;
use snapshot_bucket_capture::spawn_source;
use snapshot_bucket_common::config::Config;
use snapshot_bucket_store::{FrameTransform, SnapshotStore};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// How long to wait for the camera to deliver a frame before giving up.
const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// Grab frames from the configured camera and save them as numbered snapshots.
#[derive(Parser, Debug)]
#[command(name = "snapshot-bucket-capture", version, about)]
struct Args {
    /// TOML config file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to store images in (overrides [store].output_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of snapshots to take
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,

    /// Pause between snapshots, in milliseconds
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::load_or_default(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let output = args.output.unwrap_or_else(|| config.store.output_dir.clone());
    info!(
        output = output.display().to_string(),
        count = args.count,
        camera = config.capture.url,
        "starting snapshot capture"
    );

    let mut store = match SnapshotStore::open_with_quality(&output, config.store.jpeg_quality) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open snapshot store");
            std::process::exit(1);
        }
    };
    let adjust = FrameTransform::new(config.store.mirror);
    let mut latest = spawn_source(&config.capture);

    for taken in 0..args.count {
        if taken > 0 && args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }

        let Some(frame) = latest.next(FRAME_TIMEOUT).await else {
            error!(timeout = ?FRAME_TIMEOUT, "no frame received from camera");
            std::process::exit(1);
        };

        match store.save_frame(&frame, &adjust) {
            Ok(path) => println!("{}", path.display()),
            Err(e) => {
                error!(error = %e, seq = frame.seq, "failed to save snapshot");
                std::process::exit(1);
            }
        }
    }

    info!(next_index = store.next_index(), "capture finished");
}
