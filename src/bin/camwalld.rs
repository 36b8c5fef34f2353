//! camwalld - multi-stream capture engine daemon.
//!
//! Loads the source list, starts an acquisition loop per source, and logs a
//! periodic health summary until interrupted. The presentation layer is an
//! external collaborator; this binary only exercises the engine.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camwall::{Engine, EngineConfig};

#[derive(Debug, Parser)]
#[command(name = "camwalld", about = "Multi-stream capture engine daemon")]
struct Args {
    /// Source list file: one address per line, blank lines ignored.
    #[arg(long, env = "CAMWALL_SOURCES")]
    sources: Option<PathBuf>,

    /// Target delay between pull attempts per source, in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Seconds between health summary log lines.
    #[arg(long, default_value_t = 5)]
    summary_interval_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = EngineConfig::load()?;
    if let Some(sources) = args.sources {
        config.source_list = Some(sources);
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }

    let sources = config.load_sources()?;
    log::info!("configured {} sources", sources.len());
    for source in &sources {
        log::info!("  [{}] {}", source.index, source.address);
    }

    let engine = Engine::new(sources, &config);
    engine.start_all()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })?;

    let summary_interval = Duration::from_secs(args.summary_interval_secs.max(1));
    let mut last_summary = std::time::Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
        if last_summary.elapsed() >= summary_interval {
            log::info!(
                "streams: {} running, {} connected of {}",
                engine.running_count(),
                engine.connected_count(),
                engine.sources().len()
            );
            last_summary = std::time::Instant::now();
        }
    }

    log::info!("shutting down");
    let timed_out: Vec<usize> = engine
        .stop_all()
        .into_iter()
        .filter(|(_, outcome)| !outcome.is_clean())
        .map(|(index, _)| index)
        .collect();
    if !timed_out.is_empty() {
        log::warn!("sources did not stop cleanly: {:?}", timed_out);
    }
    Ok(())
}
