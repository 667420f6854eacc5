// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jittered exponential backoff.

use std::time::Duration;

use rand::Rng;

/// Fraction of the interval applied as symmetric jitter.
const JITTER: f64 = 0.1;

/// Exponential delay sequence with ±10% jitter.
///
/// The first [`next`](Self::next) after construction or [`reset`](Self::reset)
/// yields `initial`; each later call multiplies the base interval by
/// `multiplier`, clamps it to `max`, then jitters the clamped value.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    /// Un-jittered base of the last returned delay. Zero after reset.
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self { initial, max, multiplier, current: Duration::ZERO }
    }

    /// Delay to wait before the next retry.
    pub fn next(&mut self) -> Duration {
        self.current = if self.current.is_zero() {
            self.initial.min(self.max)
        } else {
            // Overflow, NaN and negative products saturate at the ceiling.
            Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
                .unwrap_or(self.max)
                .min(self.max)
        };
        jitter(self.current)
    }

    /// Return to the initial state.
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }

    /// Un-jittered base of the most recent delay (zero after reset).
    pub fn current(&self) -> Duration {
        self.current
    }
}

fn jitter(base: Duration) -> Duration {
    let factor = rand::rng().random_range(-JITTER..=JITTER);
    Duration::try_from_secs_f64(base.as_secs_f64() * (1.0 + factor)).unwrap_or(base)
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
