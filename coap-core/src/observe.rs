//! Observe subsystem (RFC 7641, §4.5): subscription registry and
//! notification fan-out.

use std::collections::HashMap;
use std::net::SocketAddr;

use coap_msg::msg::opt::known::observe::SequenceNumber;
use coap_msg::{Id, Token, Type};

use crate::net::Addrd;

/// (endpoint, token) — an observation's identity.
pub type ObserverId = Addrd<Token>;

/// A single client's subscription to a resource.
#[derive(Debug, Clone)]
pub struct Observation {
  /// Full path of the observed resource
  pub resource_path: String,
  /// Last observe-count delivered to this client
  pub last_notified: SequenceNumber,
  /// MID the most recent notification was sent under
  pub last_mid: Id,
  /// `Content-Format` this client's responses have been using
  pub content_format: Option<u16>,
  /// Transmission type notifications to this observer should use —
  /// inherited from the request that registered the observation.
  pub notify_as: Type,
}

/// Registry of active observations, supporting lookup both by subscriber
/// (for deregistration) and by resource path (for fan-out on mutation).
#[derive(Default)]
pub struct Observers {
  by_id: HashMap<ObserverId, Observation>,
}

impl Observers {
  /// Register (or replace) an observation for `(addr, token)`.
  pub fn register(&mut self, addr: SocketAddr, token: Token, resource_path: String, initial_seq: SequenceNumber, mid: Id, content_format: Option<u16>, notify_as: Type) {
    self.by_id.insert(Addrd(token, addr),
                       Observation { resource_path, last_notified: initial_seq, last_mid: mid, content_format, notify_as });
  }

  /// `Observe = 1`, client RST, or cleanup: drop this subscription.
  pub fn deregister(&mut self, addr: SocketAddr, token: &Token) -> Option<Observation> {
    self.by_id.remove(&Addrd(token.clone(), addr))
  }

  /// Every observer currently watching `path`, most-recently-registered
  /// order is not guaranteed.
  pub fn of_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = (ObserverId, &'a Observation)> + 'a {
    self.by_id.iter().filter(move |(_, obs)| obs.resource_path == path).map(|(id, obs)| (id.clone(), obs))
  }

  /// Record that `id` was just sent a notification at `seq`, under `mid`.
  pub fn record_notified(&mut self, id: &ObserverId, seq: SequenceNumber, mid: Id) {
    if let Some(obs) = self.by_id.get_mut(id) {
      obs.last_notified = seq;
      obs.last_mid = mid;
    }
  }

  /// Remove every observer of `path` (resource deletion) and return them,
  /// so the caller can send each a final `4.04` notification.
  pub fn remove_all_of_path(&mut self, path: &str) -> Vec<(ObserverId, Observation)> {
    let ids: Vec<ObserverId> = self.by_id.iter().filter(|(_, obs)| obs.resource_path == path).map(|(id, _)| id.clone()).collect();
    ids.into_iter().filter_map(|id| self.by_id.remove(&id).map(|obs| (id.clone(), obs))).collect()
  }

  /// Whether a given value is strictly newer than what was last delivered
  /// to this observer (RFC 7641 §3.4), used to suppress a stale
  /// notification superseded by a fresher mutation before it went out.
  pub fn is_fresh(&self, id: &ObserverId, candidate: SequenceNumber) -> bool {
    self.by_id.get(id).map(|o| candidate.is_newer_than(o.last_notified)).unwrap_or(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn addr() -> SocketAddr {
    "127.0.0.1:5683".parse().unwrap()
  }

  #[test]
  fn register_and_fan_out() {
    let mut obs = Observers::default();
    obs.register(addr(), Token(vec![1]), "basic".into(), SequenceNumber::new(0), Id(1), None, Type::Con);
    obs.register(addr(), Token(vec![2]), "other".into(), SequenceNumber::new(0), Id(2), None, Type::Con);

    let watching_basic: Vec<_> = obs.of_path("basic").collect();
    assert_eq!(watching_basic.len(), 1);
  }

  #[test]
  fn deregister_removes_entry() {
    let mut obs = Observers::default();
    let token = Token(vec![1]);
    obs.register(addr(), token.clone(), "basic".into(), SequenceNumber::new(0), Id(1), None, Type::Con);
    assert!(obs.deregister(addr(), &token).is_some());
    assert_eq!(obs.of_path("basic").count(), 0);
  }

  #[test]
  fn resource_deletion_sweeps_all_observers_of_path() {
    let mut obs = Observers::default();
    obs.register(addr(), Token(vec![1]), "basic".into(), SequenceNumber::new(0), Id(1), None, Type::Con);
    obs.register(addr(), Token(vec![2]), "basic".into(), SequenceNumber::new(0), Id(2), None, Type::Con);
    let removed = obs.remove_all_of_path("basic");
    assert_eq!(removed.len(), 2);
    assert_eq!(obs.of_path("basic").count(), 0);
  }
}
