//! Blockwise transfer (RFC 7959, §4.6): Block1 request-body reassembly and
//! Block2 response-body segmentation, both keyed by (endpoint, token).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use coap_msg::msg::opt::known::block::Block;
use coap_msg::Token;

use crate::net::Addrd;

/// (endpoint, token) — a blockwise session's identity.
pub type SessionId = Addrd<Token>;

/// A response payload too large for one datagram, cached so successive
/// `Block2` GETs can be served without re-invoking the handler.
struct CachedResponse {
  bytes: Vec<u8>,
  etag: Option<Vec<u8>>,
  content_format: Option<u16>,
  szx: u8,
  cached_at: Instant,
}

/// What requesting one block out of a [`Block2Cache`] entry yields.
pub struct ServedBlock<'a> {
  /// This block's payload slice
  pub data: &'a [u8],
  /// Whether more blocks follow
  pub more: bool,
  /// ETag of the full response, which must match across every block
  pub etag: Option<&'a [u8]>,
  pub content_format: Option<u16>,
}

/// Caches full response bodies that exceed `MAX_PAYLOAD`, serving them out
/// in `Block2`-sized pieces.
#[derive(Default)]
pub struct Block2Cache {
  entries: HashMap<SessionId, CachedResponse>,
}

impl Block2Cache {
  /// Cache a full response body for blockwise serving. `szx` is the block
  /// size this server will use to serve it (callers may still request a
  /// smaller one; never larger, per §4.6 "the server MUST honor it
  /// downward").
  pub fn store(&mut self, addr: SocketAddr, token: Token, bytes: Vec<u8>, etag: Option<Vec<u8>>, content_format: Option<u16>, szx: u8, now: Instant) {
    self.entries.insert(Addrd(token, addr), CachedResponse { bytes, etag, content_format, szx, cached_at: now });
  }

  /// Serve block `num` at the requested `szx` (clamped to the cached
  /// preferred size), if a cached payload exists for this session.
  pub fn serve(&self, addr: SocketAddr, token: &Token, num: u32, requested_szx: u8) -> Option<ServedBlock<'_>> {
    let entry = self.entries.get(&Addrd(token.clone(), addr))?;
    let szx = requested_szx.min(entry.szx);
    let size = Block::size_for_szx(szx);
    let start = num as usize * size;
    if start > entry.bytes.len() {
      return None;
    }
    let end = (start + size).min(entry.bytes.len());
    let more = end < entry.bytes.len();
    Some(ServedBlock { data: &entry.bytes[start..end], more, etag: entry.etag.as_deref(), content_format: entry.content_format })
  }

  /// Drop a session (last block served, or idle timeout).
  pub fn remove(&mut self, addr: SocketAddr, token: &Token) {
    self.entries.remove(&Addrd(token.clone(), addr));
  }

  /// Drop every session idle longer than `exchange_lifetime`.
  pub fn purge(&mut self, now: Instant, exchange_lifetime: std::time::Duration) {
    self.entries.retain(|_, v| now.saturating_duration_since(v.cached_at) < exchange_lifetime);
  }
}

/// Outcome of handing a `Block1` fragment to the assembler.
pub enum AssembleOutcome {
  /// More blocks expected; reply `2.31 Continue`.
  Continue,
  /// Terminal block (`M=0`) received; here's the full reassembled body.
  Complete(Vec<u8>),
  /// The negotiated block size would make the accumulated body exceed
  /// what this server will buffer; reply `4.13` with `Size1`.
  TooLarge,
}

struct Assembly {
  buffer: Vec<u8>,
  expected_num: u32,
  szx: u8,
  started_at: Instant,
}

/// Reassembles `Block1`-segmented request bodies, one session per
/// (endpoint, token).
pub struct Block1Assembler {
  sessions: HashMap<SessionId, Assembly>,
  max_body: usize,
}

impl Block1Assembler {
  /// `max_body` bounds how large a reassembled body this server accepts
  /// before giving up with `TooLarge`.
  pub fn new(max_body: usize) -> Self {
    Block1Assembler { sessions: HashMap::new(), max_body }
  }

  /// Feed one `Block1` fragment in. Block numbers must arrive in order;
  /// an out-of-order or size-increasing fragment restarts the session
  /// (§4.6 "session cleanup ... on mismatched SZX increase").
  pub fn accept(&mut self, addr: SocketAddr, token: Token, block: Block, data: &[u8], now: Instant) -> AssembleOutcome {
    let id = Addrd(token, addr);

    let fresh = match self.sessions.get(&id) {
      | Some(s) if s.expected_num == block.num && s.szx >= block.szx => false,
      | _ => true,
    };

    if fresh {
      self.sessions.insert(id.clone(), Assembly { buffer: Vec::new(), expected_num: 0, szx: block.szx, started_at: now });
    }

    let session = self.sessions.get_mut(&id).expect("just inserted if absent");
    if session.buffer.len() + data.len() > self.max_body {
      self.sessions.remove(&id);
      return AssembleOutcome::TooLarge;
    }

    session.buffer.extend_from_slice(data);
    session.expected_num = block.num + 1;

    if block.more {
      AssembleOutcome::Continue
    } else {
      let Assembly { buffer, .. } = self.sessions.remove(&id).expect("session present");
      AssembleOutcome::Complete(buffer)
    }
  }

  /// Drop every session idle longer than `exchange_lifetime`.
  pub fn purge(&mut self, now: Instant, exchange_lifetime: std::time::Duration) {
    self.sessions.retain(|_, v| now.saturating_duration_since(v.started_at) < exchange_lifetime);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn addr() -> SocketAddr {
    "127.0.0.1:5683".parse().unwrap()
  }

  #[test]
  fn block2_serves_successive_blocks() {
    let mut cache = Block2Cache::default();
    let payload: Vec<u8> = (0..2000u32).map(|n| (n % 256) as u8).collect();
    cache.store(addr(), Token(vec![1]), payload.clone(), None, None, 6, Instant::now());

    let b0 = cache.serve(addr(), &Token(vec![1]), 0, 6).unwrap();
    assert_eq!(b0.data.len(), 1024);
    assert!(b0.more);

    let b1 = cache.serve(addr(), &Token(vec![1]), 1, 6).unwrap();
    assert_eq!(b1.data.len(), 976);
    assert!(!b1.more);

    let mut reassembled = b0.data.to_vec();
    reassembled.extend_from_slice(b1.data);
    assert_eq!(reassembled, payload);
  }

  #[test]
  fn block1_reassembles_in_order() {
    let mut asm = Block1Assembler::new(1 << 20);
    let now = Instant::now();
    let token = Token(vec![2]);

    let outcome = asm.accept(addr(), token.clone(), Block { num: 0, more: true, szx: 0 }, b"hello, ", now);
    assert!(matches!(outcome, AssembleOutcome::Continue));

    let outcome = asm.accept(addr(), token.clone(), Block { num: 1, more: false, szx: 0 }, b"world!", now);
    match outcome {
      | AssembleOutcome::Complete(body) => assert_eq!(body, b"hello, world!"),
      | _ => panic!("expected Complete"),
    }
  }

  #[test]
  fn block1_rejects_oversized_body() {
    let mut asm = Block1Assembler::new(4);
    let outcome = asm.accept(addr(), Token(vec![3]), Block { num: 0, more: true, szx: 0 }, b"hello", Instant::now());
    assert!(matches!(outcome, AssembleOutcome::TooLarge));
  }
}
