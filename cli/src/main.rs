mod cli;
mod feed;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::logger::{LogFormat, init_logger};
use engine::{Clock, SignalEngine, TokioClock};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use cli::{Cli, build_config};
use feed::{FeedConfig, run_synthetic_feed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logger("divergence", format);

    let config = build_config(&cli)?;
    let engine = SignalEngine::new(config, cli.instruments.iter().map(String::as_str))?;
    info!(instruments = ?engine.instruments(), "engine ready");

    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let handle = engine.spawn(Arc::clone(&clock));

    let (feed_stop_tx, feed_stop_rx) = watch::channel(false);
    let feed_cfg = FeedConfig {
        price_every: Duration::from_millis(cli.price_every_ms.max(1)),
        info_every: Duration::from_millis(cli.info_every_ms.max(1)),
        burst_probability: 0.05,
    };
    let feeds: Vec<_> = engine
        .instruments()
        .iter()
        .cloned()
        .map(|instrument| {
            tokio::spawn(run_synthetic_feed(
                Arc::clone(&engine),
                Arc::clone(&clock),
                instrument,
                feed_cfg,
                feed_stop_rx.clone(),
            ))
        })
        .collect();

    let stop = async {
        match cli.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
            }
        }
    };
    tokio::pin!(stop);

    let mut report = interval(Duration::from_secs(cli.report_every_secs.max(1)));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let views = engine.subscribe();

    loop {
        tokio::select! {
            _ = report.tick() => {
                let view = views.borrow().clone();
                println!("{}", serde_json::to_string(&*view)?);
            }
            _ = &mut stop => break,
        }
    }

    info!("shutting down");
    let _ = feed_stop_tx.send(true);
    for feed in feeds {
        if let Err(e) = feed.await {
            warn!(error = ?e, "feed task ended abnormally");
        }
    }

    let discarded = handle.shutdown().await;
    info!(discarded = discarded.len(), "engine stopped");

    println!("{}", serde_json::to_string(&engine.view())?);
    Ok(())
}
