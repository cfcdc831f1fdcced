//! Reliability layer (§4.2): inbound CON/NON dedup and outbound CON
//! retransmission, both keyed by (endpoint, MID).

use std::collections::HashMap;
use std::time::Instant;

use coap_msg::Id;

use crate::net::Addrd;
use crate::retry::{Attempts, RetryTimer, Strategy, YouShould};

/// (endpoint, MID) — the key both dedup and retransmit state are tracked
/// under. Not `(endpoint, token)`; that's the matcher's job (§4.3).
pub type ExchangeId = Addrd<Id>;

/// State for a CON we sent and are waiting on an ACK/RST for.
struct Outbound {
  bytes: Vec<u8>,
  retry: RetryTimer,
  started_at: Instant,
}

/// What came of polling the outbound exchange table for due retransmits.
pub enum RetransmitOutcome {
  /// Resend these bytes to this endpoint.
  Resend(Addrd<Vec<u8>>),
  /// `MAX_RETRANSMIT` exhausted with no ACK/RST; give up.
  TimedOut(ExchangeId),
}

/// A previously-seen inbound CON, cached so a duplicate can be answered
/// without re-invoking the handler.
struct Inbound {
  /// Set once the original response has been produced; `None` while the
  /// handler is still running (e.g. waiting on a separate response).
  response: Option<Vec<u8>>,
  seen_at: Instant,
}

/// Tracks in-flight exchanges on both directions of the wire.
#[derive(Default)]
pub struct Reliability {
  outbound: HashMap<ExchangeId, Outbound>,
  inbound: HashMap<ExchangeId, Inbound>,
}

impl Reliability {
  /// Start tracking a CON we just sent, arming its retransmit timer.
  pub fn track_outbound(&mut self, id: ExchangeId, bytes: Vec<u8>, strategy: Strategy, max_attempts: Attempts, now: Instant) {
    self.outbound.insert(id, Outbound { bytes, retry: RetryTimer::new(now, strategy, max_attempts), started_at: now });
  }

  /// An ACK or RST arrived for `id`. Returns `true` if it matched a
  /// tracked outbound exchange (and stops tracking it either way — RST
  /// also terminates the exchange).
  pub fn resolve(&mut self, id: ExchangeId) -> bool {
    self.outbound.remove(&id).is_some()
  }

  /// Poll every outbound exchange, returning the datagrams due for
  /// retransmission and any that have exhausted their attempts.
  pub fn poll_retransmits(&mut self, now: Instant) -> Vec<RetransmitOutcome> {
    let mut due = Vec::new();
    let mut timed_out = Vec::new();

    for (id, exchange) in self.outbound.iter_mut() {
      match exchange.retry.what_should_i_do(now) {
        | Ok(YouShould::Retry) => due.push((*id, exchange.bytes.clone())),
        | Ok(YouShould::Cry) => timed_out.push(*id),
        | Err(nb::Error::WouldBlock) => {},
        | Err(nb::Error::Other(never)) => match never {},
      }
    }

    for id in &timed_out {
      self.outbound.remove(id);
    }

    due.into_iter()
       .map(|(id, bytes)| RetransmitOutcome::Resend(Addrd(bytes, id.addr())))
       .chain(timed_out.into_iter().map(RetransmitOutcome::TimedOut))
       .collect()
  }

  /// Check whether `id` has already been seen; if not, start tracking it
  /// as in-flight (response not yet known).
  ///
  /// Returns `Some(cached)` when this is a duplicate — `cached` is the
  /// response to resend, or `None` if the original is still being
  /// processed (client should just wait, not get a response yet).
  pub fn check_duplicate(&mut self, id: ExchangeId, now: Instant) -> Option<Option<Vec<u8>>> {
    if let Some(existing) = self.inbound.get(&id) {
      return Some(existing.response.clone());
    }
    self.inbound.insert(id, Inbound { response: None, seen_at: now });
    None
  }

  /// Record the response produced for a previously-seen inbound
  /// exchange, so a later duplicate can be answered from cache.
  pub fn cache_response(&mut self, id: ExchangeId, bytes: Vec<u8>) {
    if let Some(entry) = self.inbound.get_mut(&id) {
      entry.response = Some(bytes);
    }
  }

  /// Drop every record (inbound and outbound) older than
  /// `exchange_lifetime`. Outbound exchanges still mid-retransmit are
  /// never purged early since `poll_retransmits` already owns their
  /// lifecycle via `max_attempts`.
  pub fn purge(&mut self, now: Instant, exchange_lifetime: std::time::Duration) {
    self.inbound.retain(|_, v| now.saturating_duration_since(v.seen_at) < exchange_lifetime);
    self.outbound.retain(|_, v| now.saturating_duration_since(v.started_at) < exchange_lifetime);
  }
}

#[cfg(test)]
mod tests {
  use std::net::SocketAddr;
  use std::time::Duration;

  use super::*;

  fn addr() -> SocketAddr {
    "127.0.0.1:5683".parse().unwrap()
  }

  #[test]
  fn duplicate_is_detected_and_cached() {
    let mut rel = Reliability::default();
    let id = Addrd(Id(7), addr());
    let now = Instant::now();

    assert!(rel.check_duplicate(id, now).is_none());
    rel.cache_response(id, vec![1, 2, 3]);

    assert_eq!(rel.check_duplicate(id, now).unwrap(), Some(vec![1, 2, 3]));
  }

  #[test]
  fn outbound_retransmits_then_times_out() {
    let mut rel = Reliability::default();
    let id = Addrd(Id(1), addr());
    let start = Instant::now();
    let strategy = Strategy::Delay { min: Duration::from_millis(100), max: Duration::from_millis(100) };
    rel.track_outbound(id, vec![9], strategy, Attempts(2), start);

    let outcomes = rel.poll_retransmits(start + Duration::from_millis(100));
    assert!(matches!(outcomes.as_slice(), [RetransmitOutcome::Resend(_)]));

    let outcomes = rel.poll_retransmits(start + Duration::from_millis(200));
    assert!(matches!(outcomes.as_slice(), [RetransmitOutcome::Resend(_)]));

    let outcomes = rel.poll_retransmits(start + Duration::from_millis(300));
    assert!(matches!(outcomes.as_slice(), [RetransmitOutcome::TimedOut(_)]));
  }

  #[test]
  fn ack_stops_tracking() {
    let mut rel = Reliability::default();
    let id = Addrd(Id(1), addr());
    rel.track_outbound(id, vec![9], Strategy::Delay { min: Duration::from_secs(10), max: Duration::from_secs(10) }, Attempts(3), Instant::now());
    assert!(rel.resolve(id));
    assert!(!rel.resolve(id));
  }
}
