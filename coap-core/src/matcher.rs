//! Request/response matcher (§4.3): correlates a response to its request
//! by (endpoint, token), not MID, since a separate response arrives under
//! a fresh MID.

use std::collections::HashMap;
use std::time::Instant;

use coap_msg::{Id, Token};

use crate::net::Addrd;

/// (endpoint, token) — the matcher's correlation key.
pub type PendingId = Addrd<Token>;

/// A request awaiting a response.
struct Pending {
  /// MID the request was sent under, so an ACK/RST can be resolved back
  /// to this token-keyed entry.
  mid: Id,
  /// Whether an (empty) ACK has already been seen — if so, the eventual
  /// response is a separate CON, not a piggy-backed ACK.
  acknowledged: bool,
  sent_at: Instant,
}

/// What arrived for a pending exchange.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
  /// This was the (empty) ACK/RST stopping the client's retransmit timer;
  /// the real response is still pending.
  Acknowledged,
  /// The final response — the pending entry is now resolved and removed.
  Delivered,
}

/// Outstanding requests, indexed both by token (response correlation) and
/// by MID (ACK/RST correlation).
#[derive(Default)]
pub struct Matcher {
  pending_by_token: HashMap<PendingId, Pending>,
  pending_by_mid: HashMap<Addrd<Id>, Token>,
}

impl Matcher {
  /// Register a request we just sent.
  pub fn track(&mut self, addr: std::net::SocketAddr, token: Token, mid: Id, now: Instant) {
    self.pending_by_mid.insert(Addrd(mid, addr), token.clone());
    self.pending_by_token.insert(Addrd(token, addr), Pending { mid, acknowledged: false, sent_at: now });
  }

  /// An ACK or RST arrived for `(addr, mid)`. Returns `None` if it
  /// doesn't match anything we're tracking.
  pub fn resolve_by_mid(&mut self, addr: std::net::SocketAddr, mid: Id) -> Option<Token> {
    let token = self.pending_by_mid.get(&Addrd(mid, addr))?.clone();
    if let Some(pending) = self.pending_by_token.get_mut(&Addrd(token.clone(), addr)) {
      pending.acknowledged = true;
    }
    Some(token)
  }

  /// A response arrived for `(addr, token)`. Resolving removes the
  /// pending entry entirely (both maps) — `None` means this is an
  /// unsolicited response with no matching request, which callers must
  /// answer with RST per §4.3.
  pub fn resolve_by_token(&mut self, addr: std::net::SocketAddr, token: &Token) -> Option<Resolution> {
    let pending = self.pending_by_token.remove(&Addrd(token.clone(), addr))?;
    self.pending_by_mid.remove(&Addrd(pending.mid, addr));
    Some(Resolution::Delivered)
  }

  /// Whether `(addr, token)` is still outstanding (used to decide how to
  /// format a notification's transmission type and similar housekeeping).
  pub fn is_pending(&self, addr: std::net::SocketAddr, token: &Token) -> bool {
    self.pending_by_token.contains_key(&Addrd(token.clone(), addr))
  }

  /// Drop every entry older than `exchange_lifetime`.
  pub fn purge(&mut self, now: Instant, exchange_lifetime: std::time::Duration) {
    let expired: Vec<PendingId> = self.pending_by_token
                                       .iter()
                                       .filter(|(_, p)| now.saturating_duration_since(p.sent_at) >= exchange_lifetime)
                                       .map(|(id, _)| id.clone())
                                       .collect();
    for id in expired {
      if let Some(pending) = self.pending_by_token.remove(&id) {
        self.pending_by_mid.remove(&Addrd(pending.mid, id.addr()));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn addr() -> std::net::SocketAddr {
    "127.0.0.1:5683".parse().unwrap()
  }

  #[test]
  fn ack_then_response_resolves() {
    let mut m = Matcher::default();
    let token = Token(vec![1]);
    m.track(addr(), token.clone(), Id(42), Instant::now());

    assert_eq!(m.resolve_by_mid(addr(), Id(42)), Some(token.clone()));
    assert!(m.is_pending(addr(), &token));

    assert_eq!(m.resolve_by_token(addr(), &token), Some(Resolution::Delivered));
    assert!(!m.is_pending(addr(), &token));
  }

  #[test]
  fn unsolicited_response_does_not_resolve() {
    let mut m = Matcher::default();
    assert_eq!(m.resolve_by_token(addr(), &Token(vec![9])), None);
  }
}
