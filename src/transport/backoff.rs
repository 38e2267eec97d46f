//! Fibonacci reconnect delays

use std::time::Duration;

/// Produces reconnect delays growing along the Fibonacci sequence
/// (d, d, 2d, 3d, 5d, ...) and capped at a maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    initial: Duration,
    max: Duration,
    previous: Duration,
    current: Duration,
}

impl FibonacciBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            previous: Duration::ZERO,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        let next = self.previous.saturating_add(self.current);
        self.previous = self.current;
        self.current = next.min(self.max);
        delay
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.previous = Duration::ZERO;
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_fibonacci_sequence() {
        let mut backoff = FibonacciBackoff::new(ms(100), ms(10_000));
        let delays: Vec<Duration> = (0..6).map(|_| backoff.next_delay()).collect();

        assert_eq!(delays, vec![ms(100), ms(100), ms(200), ms(300), ms(500), ms(800)]);
    }

    #[test]
    fn test_delay_is_capped() {
        let mut backoff = FibonacciBackoff::new(ms(100), ms(250));
        let delays: Vec<Duration> = (0..6).map(|_| backoff.next_delay()).collect();

        assert_eq!(delays, vec![ms(100), ms(100), ms(200), ms(250), ms(250), ms(250)]);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::new(ms(50), ms(1000));
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();

        assert_eq!(backoff.next_delay(), ms(50));
        assert_eq!(backoff.next_delay(), ms(50));
    }

    #[test]
    fn test_max_below_initial_is_clamped() {
        let mut backoff = FibonacciBackoff::new(ms(500), ms(10));
        assert_eq!(backoff.next_delay(), ms(500));
        assert_eq!(backoff.next_delay(), ms(500));
    }
}
