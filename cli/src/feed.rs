//! Synthetic producers standing in for the price ticker and sentiment source.

use std::sync::Arc;
use std::time::Duration;

use engine::{Clock, Instrument, SignalEngine};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug)]
pub struct FeedConfig {
    pub price_every: Duration,
    pub info_every: Duration,

    /// Chance that a sentiment sample is a burst rather than noise.
    pub burst_probability: f64,
}

/// Random-walk price whose drift follows the latest sentiment, so spikes
/// tend to be followed by a move.
#[derive(Clone, Debug)]
pub struct SyntheticMarket {
    price: f64,
    sentiment: f64,
    burst_probability: f64,
}

impl SyntheticMarket {
    pub fn new(start_price: f64, burst_probability: f64) -> Self {
        Self {
            price: start_price,
            sentiment: 0.0,
            burst_probability,
        }
    }

    pub fn next_price<R: Rng>(&mut self, rng: &mut R) -> f64 {
        let noise = rng.gen_range(-0.0005..0.0005);
        let drift = self.sentiment * 0.0002;
        self.price = (self.price * (1.0 + noise + drift)).max(0.01);
        self.price
    }

    /// Score in [-1, 1]: mean-reverting noise with occasional bursts.
    pub fn next_sentiment<R: Rng>(&mut self, rng: &mut R) -> f64 {
        self.sentiment = if rng.gen_bool(self.burst_probability) {
            let magnitude = rng.gen_range(0.7..=1.0);
            if rng.gen_bool(0.5) { magnitude } else { -magnitude }
        } else {
            self.sentiment * 0.8 + rng.gen_range(-0.1..0.1)
        };
        self.sentiment = self.sentiment.clamp(-1.0, 1.0);
        self.sentiment
    }
}

/// Pushes synthetic samples for one instrument until shutdown.
pub async fn run_synthetic_feed(
    engine: Arc<SignalEngine>,
    clock: Arc<dyn Clock>,
    instrument: Instrument,
    cfg: FeedConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rng = StdRng::from_entropy();
    let mut market = SyntheticMarket::new(rng.gen_range(50.0..50_000.0), cfg.burst_probability);

    let mut price_tick = interval(cfg.price_every);
    price_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut info_tick = interval(cfg.info_every);
    info_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(%instrument, "synthetic feed started");

    loop {
        let result = tokio::select! {
            _ = price_tick.tick() => {
                let p = market.next_price(&mut rng);
                engine.ingest_price(instrument.id(), clock.now_ms(), p)
            }
            _ = info_tick.tick() => {
                let s = market.next_sentiment(&mut rng);
                engine.ingest_info(instrument.id(), clock.now_ms(), s)
            }
            _ = shutdown.changed() => break,
        };

        if let Err(e) = result {
            warn!(error = %e, %instrument, "sample rejected");
        }
    }

    info!(%instrument, "synthetic feed stopped");
}
