//! Watch command: the long-running hosting loop.

use std::io::{self, Write};
use std::sync::Arc;

use colored::*;
use kasa_link_core::storage::StartupCache;
use kasa_link_core::{Engine, EngineConfig};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::WatchArgs;
use crate::error::{CliError, Result};
use crate::output::{get_formatter, OutputFormatter};
use crate::settings;

/// Run the watch command
pub async fn run_watch(args: WatchArgs, config: EngineConfig, json: bool) -> Result<()> {
    let formatter = get_formatter(json);
    let cache_dir = if args.save_cache {
        settings::cache_dir(&config)
    } else {
        None
    };
    let redraw_every = config.poll_interval();

    let engine = Engine::bind(config)?;

    if let Some(dir) = &cache_dir {
        match StartupCache::load(dir).await {
            Ok(cache) => {
                engine.seed(cache.reports()).await;
            }
            Err(e) => warn!(error = %e, "ignoring unreadable startup cache"),
        }
    }

    let mut refresh = engine.refresh().subscribe();
    let mut liveness = engine.subscribe_liveness();
    let cancel = CancellationToken::new();

    if !json {
        println!("Watching for devices (press Ctrl+C to stop)...");
    }
    let handle = engine.start(cancel.clone()).await?;
    render(&engine, formatter.as_ref(), json).await;

    // relay and energy changes do not raise the refresh signal
    let mut redraw = interval(redraw_every);
    redraw.set_missed_tick_behavior(MissedTickBehavior::Delay);
    redraw.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = cancel.cancelled() => {
                warn!("engine stopped");
                break;
            }
            generation = refresh.changed() => {
                if generation.is_none() {
                    break;
                }
                render(&engine, formatter.as_ref(), json).await;
            }
            event = liveness.recv() => match event {
                Ok(change) => {
                    println!("{}", formatter.format_liveness(&change));
                    if !json {
                        render(&engine, formatter.as_ref(), json).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed liveness events");
                    render(&engine, formatter.as_ref(), json).await;
                }
                Err(RecvError::Closed) => break,
            },
            _ = redraw.tick() => render(&engine, formatter.as_ref(), json).await,
        }
    }

    if let Some(dir) = &cache_dir {
        let cache = StartupCache::from_devices(&engine.snapshot().await);
        if let Err(e) = cache.save(dir).await {
            warn!(error = %e, "could not save startup cache");
        }
    }

    handle.shutdown().await.map_err(CliError::from)
}

async fn render(engine: &Arc<Engine>, formatter: &dyn OutputFormatter, json: bool) {
    let devices = engine.snapshot().await;

    if !json {
        // Clear screen and print header
        print!("\x1B[2J\x1B[1;1H");
        println!("{}", "kasa-link device watch".bold());
        println!("{}", "Press Ctrl+C to stop".dimmed());
        println!();
    }

    println!("{}", formatter.format_devices(&devices));
    io::stdout().flush().ok();
}
