use std::time::Duration;

use crate::retry::{Attempts, Strategy};

/// Bytes / Second
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BytesPerSecond(pub u32);

/// RFC 7252 §4.8.1 timing constants, as a default [`Config`].
///
/// `ACK_TIMEOUT=2s`, `ACK_RANDOM_FACTOR=1.5`, `MAX_RETRANSMIT=4`.
pub mod defaults {
  use std::time::Duration;

  /// Base retransmission timeout for CON requests not yet ACKed.
  pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);
  /// Upper bound multiplier applied to `ACK_TIMEOUT` when picking the first
  /// retransmit delay.
  pub const ACK_RANDOM_FACTOR: f32 = 1.5;
  /// Number of retransmissions allowed before giving up (5 transmissions
  /// total).
  pub const MAX_RETRANSMIT: u16 = 4;
  /// Max number of requests in flight at once, absent explicit congestion
  /// control.
  pub const NSTART: u8 = 1;
  /// Max random delay before answering a multicast/NON request.
  pub const DEFAULT_LEISURE: Duration = Duration::from_secs(5);
  /// Rate-limit applied while waiting on a response.
  pub const PROBING_RATE_BYTES_PER_SEC: u32 = 1;
  /// How long a message ID / token stays reserved for dedup and matching
  /// after its exchange completes.
  pub const EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);
  /// Largest payload sent without blockwise segmentation.
  pub const MAX_PAYLOAD: usize = 1024;
  /// Longest span a CON's retransmissions may occupy.
  pub const MAX_TRANSMIT_SPAN: Duration = Duration::from_secs(45);
}

/// Configuration for handling outbound CON requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Con {
  /// Retry strategy for CON requests that have not yet been ACKed.
  pub unacked_retry_strategy: Strategy,
  /// Retry strategy for a CON notification/separate-response that HAS been
  /// ACKed (empty ACK received, final response still pending).
  pub acked_retry_strategy: Strategy,
  /// Number of retransmissions allowed before giving up.
  pub max_attempts: Attempts,
}

impl Default for Con {
  fn default() -> Self {
    Con { unacked_retry_strategy: Strategy::Exponential { init_min: Duration::from_millis(2000),
                                                           init_max: Duration::from_millis(3000) },
          acked_retry_strategy: Strategy::Exponential { init_min: Duration::from_millis(2000),
                                                         init_max: Duration::from_millis(3000) },
          max_attempts: Attempts(defaults::MAX_RETRANSMIT) }
  }
}

/// Configuration for handling outbound NON requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Non {
  /// Retry strategy while waiting on a response to a NON request.
  pub retry_strategy: Strategy,
  /// Number of retransmissions allowed before giving up.
  pub max_attempts: Attempts,
}

impl Default for Non {
  fn default() -> Self {
    Non { retry_strategy: Strategy::Exponential { init_min: Duration::from_millis(1000),
                                                   init_max: Duration::from_millis(1500) },
          max_attempts: Attempts(defaults::MAX_RETRANSMIT) }
  }
}

/// Configuration for parsing & handling messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Msg {
  /// Seed for the token generator's RNG. Customizable so different
  /// endpoints in a fleet don't share predictable token sequences.
  pub token_seed: u64,
  /// Rate we should try not to exceed while awaiting responses.
  pub probing_rate: BytesPerSecond,
  /// See [`Con`]
  pub con: Con,
  /// See [`Non`]
  pub non: Non,
  /// Maximum random delay before responding to a multicast request.
  pub multicast_response_leisure: Duration,
}

impl Default for Msg {
  fn default() -> Self {
    Msg { token_seed: 0,
          probing_rate: BytesPerSecond(defaults::PROBING_RATE_BYTES_PER_SEC),
          con: Con::default(),
          non: Non::default(),
          multicast_response_leisure: defaults::DEFAULT_LEISURE }
  }
}

/// Top-level runtime configuration for an [`crate::server::Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
  /// See [`Msg`]
  pub msg: Msg,
  /// Maximum number of requests that may be in flight at once.
  pub max_concurrent_requests: u8,
  /// Default blockwise size exponent offered to peers (`SZX`, size = `16 <<
  /// szx`). `6` is RFC 7959's largest block (1024 bytes), matching
  /// `MAX_PAYLOAD`.
  pub default_block_szx: u8,
  /// Largest payload sent without blockwise segmentation.
  pub max_payload: usize,
}

impl Default for Config {
  fn default() -> Self {
    Config { msg: Msg::default(),
             max_concurrent_requests: defaults::NSTART,
             default_block_szx: coap_msg::msg::opt::known::block::Block::MAX_SZX,
             max_payload: defaults::MAX_PAYLOAD }
  }
}

impl Config {
  pub(crate) fn max_transmit_span(&self) -> Duration {
    let acked = self.msg.con.acked_retry_strategy.max_time(self.msg.con.max_attempts - Attempts(1));
    let unacked = self.msg.con.unacked_retry_strategy.max_time(self.msg.con.max_attempts - Attempts(1));
    let non = self.msg.non.retry_strategy.max_time(self.msg.non.max_attempts - Attempts(1));
    acked.max(unacked).max(non)
  }

  pub(crate) fn max_transmit_wait(&self) -> Duration {
    let acked = self.msg.con.acked_retry_strategy.max_time(self.msg.con.max_attempts);
    let unacked = self.msg.con.unacked_retry_strategy.max_time(self.msg.con.max_attempts);
    let non = self.msg.non.retry_strategy.max_time(self.msg.non.max_attempts);
    acked.max(unacked).max(non)
  }

  pub(crate) fn max_latency(&self) -> Duration {
    Duration::from_secs(100)
  }

  pub(crate) fn expected_processing_delay(&self) -> Duration {
    Duration::from_millis(200)
  }

  /// RFC 7252 §4.8.2: how long a (endpoint, MID) or (endpoint, token) pair
  /// must be kept around to catch duplicates / stray late responses.
  pub fn exchange_lifetime(&self) -> Duration {
    self.max_transmit_span() + 2 * self.max_latency() + self.expected_processing_delay()
  }
}
