//! Poll and mix tuning.
//!
//! Delays and payment sizes are drawn from a normal distribution truncated to
//! a configured range, so neither loop can stall indefinitely or fire too
//! fast on a pathological draw.

use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Configures the ledger polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub mean_delay: Duration,
    pub std_dev_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            mean_delay: Duration::from_secs(10),
            std_dev_delay: Duration::from_secs(3),
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl PollConfig {
    /// Bring out-of-range values back into range, silently.
    pub(super) fn make_valid(&mut self) {
        if self.std_dev_delay > self.mean_delay {
            self.std_dev_delay = self.mean_delay / 2;
        }
        if self.max_delay < self.mean_delay {
            self.max_delay = self.mean_delay;
        }
    }

    /// Sample the delay until the next poll tick.
    pub(super) fn delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        sample_delay(
            rng,
            self.mean_delay,
            self.std_dev_delay,
            self.min_delay,
            self.max_delay,
        )
    }
}

/// Configures disbursement: its cadence and the size of each payment.
#[derive(Debug, Clone, Copy)]
pub struct MixConfig {
    pub mean_delay: Duration,
    pub std_dev_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// How long a detected deposit waits before becoming eligible for mixing.
    pub initial_delay: Duration,

    pub mean_amount: f64,
    pub std_dev_amount: f64,
    pub min_amount: f64,
    pub max_amount: f64,
}

impl Default for MixConfig {
    fn default() -> Self {
        MixConfig {
            mean_delay: Duration::from_secs(1),
            std_dev_delay: Duration::from_millis(250),
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(3),
            initial_delay: Duration::from_secs(3 * 60),

            mean_amount: 10.0,
            std_dev_amount: 8.0,
            min_amount: 5.0,
            max_amount: 100.0,
        }
    }
}

impl MixConfig {
    /// Bring out-of-range values back into range, silently.
    pub(super) fn make_valid(&mut self) {
        if self.std_dev_delay > self.mean_delay {
            self.std_dev_delay = self.mean_delay / 2;
        }
        if self.max_delay < self.mean_delay {
            self.max_delay = self.mean_delay;
        }

        if self.mean_amount - self.std_dev_amount < 0.0 {
            self.std_dev_amount = self.mean_amount / 2.0;
        }
        if self.min_amount < 0.0 {
            self.min_amount = 1.0;
        }
        if self.max_amount < self.mean_amount {
            self.max_amount = self.mean_amount;
        }
    }

    /// Sample the delay until the next disbursement tick.
    pub(super) fn delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        sample_delay(
            rng,
            self.mean_delay,
            self.std_dev_delay,
            self.min_delay,
            self.max_delay,
        )
    }

    /// Sample the size of one mix payment.
    pub(super) fn amount<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        sample_normal(
            rng,
            self.mean_amount,
            self.std_dev_amount,
            self.min_amount,
            self.max_amount,
        )
    }
}

/// Draw from a normal distribution and clamp the result to `[min, max]`.
fn sample_normal<R: Rng + ?Sized>(
    rng: &mut R,
    mean: f64,
    std_dev: f64,
    min: f64,
    max: f64,
) -> f64 {
    let n = match Normal::new(mean, std_dev) {
        Ok(normal) => normal.sample(rng),
        // only reachable with a non-finite or negative spread
        Err(_) => mean,
    };
    n.max(min).min(max)
}

fn sample_delay<R: Rng + ?Sized>(
    rng: &mut R,
    mean: Duration,
    std_dev: Duration,
    min: Duration,
    max: Duration,
) -> Duration {
    let secs = sample_normal(
        rng,
        mean.as_secs_f64(),
        std_dev.as_secs_f64(),
        min.as_secs_f64(),
        max.as_secs_f64(),
    );
    Duration::from_secs_f64(secs)
}
