use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use rand::Rng;

/// A non-blocking timer implementing a fixed-delay or exponential-backoff
/// retry, living alongside whatever exchange it's retrying.
///
/// Doesn't own the work being retried (that's the caller's CON message and
/// its exchange state) — just answers "has enough time passed to retry
/// again, or should we give up?"
#[derive(Debug, Clone, Copy)]
pub struct RetryTimer {
  start: Instant,
  init: Duration,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

/// A number of attempts made (or allowed).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attempts(pub u16);

impl std::ops::Sub for Attempts {
  type Output = Attempts;

  fn sub(self, rhs: Attempts) -> Attempts {
    Attempts(self.0.saturating_sub(rhs.0))
  }
}

/// What a [`RetryTimer`] recommends doing right now.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts are exhausted; give up and propagate a timeout.
  Cry,
  /// Retry now.
  Retry,
}

impl RetryTimer {
  /// Start a new retry timer at `start`, picking an initial delay (jittered
  /// if the strategy has a range) seeded from the start time itself so two
  /// concurrent exchanges don't retry in lockstep.
  pub fn new(start: Instant, strategy: Strategy, max_attempts: Attempts) -> Self {
    let init = if strategy.has_jitter() {
      let range = strategy.range();
      Duration::from_millis(rand::thread_rng().gen_range(range.start().as_millis() as u64..=range.end().as_millis() as u64))
    } else {
      *strategy.range().start()
    };

    RetryTimer { start, init, strategy, max_attempts, attempts: Attempts(1) }
  }

  /// Tell the timer "it failed again, what do I do?"
  ///
  /// Returns `WouldBlock` if not enough time has passed yet to retry.
  pub fn what_should_i_do(&mut self, now: Instant) -> nb::Result<YouShould, std::convert::Infallible> {
    if self.attempts >= self.max_attempts {
      Ok(YouShould::Cry)
    } else if self.is_ready(now.saturating_duration_since(self.start), self.attempts.0) {
      self.attempts.0 += 1;
      Ok(YouShould::Retry)
    } else {
      Err(nb::Error::WouldBlock)
    }
  }

  fn is_ready(&self, time_passed: Duration, attempts: u16) -> bool {
    if attempts == 0 {
      return true;
    }

    match self.strategy {
      | Strategy::Delay { .. } => time_passed >= self.init * attempts as u32,
      | Strategy::Exponential { .. } => time_passed >= Strategy::total_delay_exp(self.init, attempts),
    }
  }
}

/// Backoff strategy to use between retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
  /// Pick a random delay in `[init_min, init_max]` for the first retry,
  /// doubling it after every subsequent failed attempt.
  Exponential {
    /// Minimum delay before the second attempt
    init_min: Duration,
    /// Maximum delay before the second attempt
    init_max: Duration,
  },
  /// Pick a random delay in `[min, max]`, waited between every attempt
  /// (not doubled).
  Delay {
    /// Minimum delay between attempts
    min: Duration,
    /// Maximum delay between attempts
    max: Duration,
  },
}

impl Strategy {
  /// Whether min and max differ, i.e. whether we need to roll random jitter
  /// at all.
  pub fn has_jitter(&self) -> bool {
    let r = self.range();
    r.start() != r.end()
  }

  /// The `[min, max]` delay range this strategy draws from.
  pub fn range(&self) -> RangeInclusive<Duration> {
    match *self {
      | Self::Delay { min, max } => min..=max,
      | Self::Exponential { init_min, init_max } => init_min..=init_max,
    }
  }

  /// Total time elapsed if every one of `max_attempts` retries fails.
  pub fn max_time(&self, max_attempts: Attempts) -> Duration {
    match self {
      | Self::Exponential { init_max, .. } => Self::total_delay_exp(*init_max, max_attempts.0),
      | Self::Delay { max, .. } => *max * max_attempts.0 as u32,
    }
  }

  /// | attempt | total delay |
  /// |---------|-------------|
  /// | 1       | init        |
  /// | 2       | init * 2    |
  /// | 3       | init * 4    |
  /// | n       | init * 2^(n-1) |
  fn total_delay_exp(init: Duration, attempt: u16) -> Duration {
    init * 2u32.pow((attempt.saturating_sub(1)) as u32)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn delay_retrier() {
    let start = Instant::now();
    let mut retry = RetryTimer::new(start, Strategy::Delay { min: Duration::from_millis(1000), max: Duration::from_millis(1000) }, Attempts(5));

    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(999)).unwrap_err(), nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(1000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(1999)).unwrap_err(), nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(2000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(10_000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(10_000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(10_000)).unwrap(), YouShould::Cry);
  }

  #[test]
  fn exponential_retrier() {
    let start = Instant::now();
    let mut retry = RetryTimer::new(start,
                                     Strategy::Exponential { init_min: Duration::from_millis(1000), init_max: Duration::from_millis(1000) },
                                     Attempts(6));

    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(999)).unwrap_err(), nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(1000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(1999)).unwrap_err(), nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(2000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(3999)).unwrap_err(), nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(4000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(8_000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(16_000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(start + Duration::from_millis(16_000)).unwrap(), YouShould::Cry);
  }

  #[test]
  fn exp_calculation() {
    let init = Duration::from_millis(100);
    assert_eq!(Strategy::total_delay_exp(init, 1), Duration::from_millis(100));
    assert_eq!(Strategy::total_delay_exp(init, 2), Duration::from_millis(200));
    assert_eq!(Strategy::total_delay_exp(init, 3), Duration::from_millis(400));
  }
}
