use std::time::Duration;

use crate::config::client::{ReconnectConfig, ReconnectStrategy};

/// Delay schedule between reconnect attempts.
///
/// `Fixed` waits the same interval every time and gives up after
/// `max_attempts`. `Exponential` grows the delay by `multiplier` up to
/// `max_delay` and never gives up.
#[derive(Debug, Clone)]
pub struct Backoff {
    strategy: ReconnectStrategy,
    interval: Duration,
    max_attempts: u32,
    initial: Duration,
    multiplier: f64,
    max_delay: Duration,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            strategy: ReconnectStrategy::Fixed,
            interval,
            max_attempts,
            initial: interval,
            multiplier: 1.0,
            max_delay: interval,
            current: interval,
            attempt: 0,
        }
    }

    pub fn exponential(initial: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            strategy: ReconnectStrategy::Exponential,
            interval: initial,
            max_attempts: u32::MAX,
            initial,
            multiplier,
            max_delay,
            current: initial,
            attempt: 0,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        match config.strategy {
            ReconnectStrategy::Fixed => Self::fixed(Duration::from_millis(config.interval_ms), config.max_attempts),
            ReconnectStrategy::Exponential => Self::exponential(
                Duration::from_millis(config.initial_delay_ms),
                config.multiplier,
                Duration::from_millis(config.max_delay_ms),
            ),
        }
    }

    /// Delay before the next attempt, or `None` once the attempts are used up
    pub fn next(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;

        match self.strategy {
            ReconnectStrategy::Fixed => Some(self.interval),
            ReconnectStrategy::Exponential => {
                let delay = self.current;
                self.current = self.current.mul_f64(self.multiplier).min(self.max_delay);
                Some(delay)
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self.strategy {
            ReconnectStrategy::Fixed => self.attempt >= self.max_attempts,
            ReconnectStrategy::Exponential => false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff_is_bounded() {
        let mut backoff = Backoff::fixed(Duration::from_secs(5), 3);
        assert_eq!(backoff.next(), Some(Duration::from_secs(5)));
        assert_eq!(backoff.next(), Some(Duration::from_secs(5)));
        assert_eq!(backoff.next(), Some(Duration::from_secs(5)));
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.next(), None);
        assert_eq!(backoff.attempts(), 3);

        backoff.reset();
        assert!(!backoff.is_exhausted());
        assert_eq!(backoff.next(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let mut backoff = Backoff::exponential(Duration::from_secs(1), 1.5, Duration::from_secs(30));
        let delays: Vec<u128> = (0..12).map(|_| backoff.next().unwrap().as_millis()).collect();
        assert_eq!(&delays[..4], &[1000, 1500, 2250, 3375]);
        assert_eq!(*delays.last().unwrap(), 30_000);
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(!backoff.is_exhausted());

        backoff.reset();
        assert_eq!(backoff.next(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_from_config_defaults() {
        let mut backoff = Backoff::from_config(&ReconnectConfig::default());
        for _ in 0..5 {
            assert_eq!(backoff.next(), Some(Duration::from_millis(5_000)));
        }
        assert_eq!(backoff.next(), None);
    }
}
