//! Forward proxy (§4.7): parses `Proxy-Uri`, originates an upstream
//! request under a fresh token/MID space, and correlates the upstream
//! reply back to the original downstream request.

use std::collections::HashMap;
use std::net::SocketAddr;

use coap_msg::msg::opt::known::{is_safe_to_forward, URI_PATH};
use coap_msg::{Id, Message, OptNumber, Token, Type};

/// A `Proxy-Uri` broken into its parts, sufficient to address the
/// upstream origin server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
  /// `coap` or `coaps`
  pub scheme: String,
  pub host: String,
  pub port: u16,
  /// Path, without a leading slash, already split on `/`
  pub path_segments: Vec<String>,
}

/// `Proxy-Uri` didn't parse, or named a scheme we don't forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyUriError {
  /// Couldn't split the string into scheme/host/port/path at all.
  Malformed,
  /// Scheme other than `coap`/`coaps`; reply `5.05`.
  UnsupportedScheme,
}

/// Parse a `Proxy-Uri` value into its parts (RFC 7252 §6.4).
pub fn parse_proxy_uri(uri: &str) -> Result<ParsedUri, ProxyUriError> {
  let (scheme, rest) = uri.split_once("://").ok_or(ProxyUriError::Malformed)?;
  if scheme != "coap" && scheme != "coaps" {
    return Err(ProxyUriError::UnsupportedScheme);
  }

  let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
  if authority.is_empty() {
    return Err(ProxyUriError::Malformed);
  }

  let (host, port) = match authority.rsplit_once(':') {
    | Some((h, p)) => (h, p.parse::<u16>().map_err(|_| ProxyUriError::Malformed)?),
    | None => (authority, if scheme == "coaps" { 5684 } else { 5683 }),
  };

  let path_segments = path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();

  Ok(ParsedUri { scheme: scheme.to_string(), host: host.to_string(), port, path_segments })
}

/// What a downstream request is waiting on, while its upstream
/// counterpart is in flight.
struct Downstream {
  addr: SocketAddr,
  token: Token,
  mid: Id,
  upstream_mid: Id,
}

/// Upstream-request origination and downstream correlation for the
/// forward proxy.
pub struct Proxy {
  next_token: u64,
  next_mid: u16,
  by_upstream_token: HashMap<Token, Downstream>,
  by_upstream_mid: HashMap<Id, Token>,
}

impl Default for Proxy {
  fn default() -> Self {
    Proxy { next_token: 0, next_mid: 0, by_upstream_token: HashMap::new(), by_upstream_mid: HashMap::new() }
  }
}

impl Proxy {
  /// Mint a fresh upstream token. Never reuses a client's downstream
  /// token (§4.7: "NEVER reusing client tokens upstream").
  fn fresh_token(&mut self) -> Token {
    let bytes = self.next_token.to_be_bytes();
    self.next_token = self.next_token.wrapping_add(1);
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    Token(bytes[first_nonzero..].to_vec())
  }

  fn fresh_mid(&mut self) -> Id {
    let id = Id(self.next_mid);
    self.next_mid = self.next_mid.wrapping_add(1);
    id
  }

  /// Build the upstream request for a downstream `Proxy-Uri` request,
  /// registering the correlation so the eventual reply can be routed
  /// back. Returns the upstream `(host, port)` to send to, plus the
  /// message to send.
  pub fn build_upstream_request(&mut self, downstream_addr: SocketAddr, downstream: &Message) -> Result<((String, u16), Message), ProxyUriError> {
    let proxy_uri = downstream.get_option(coap_msg::msg::opt::known::PROXY_URI)
                               .and_then(|v| v.as_str().ok())
                               .ok_or(ProxyUriError::Malformed)?;
    let parsed = parse_proxy_uri(proxy_uri)?;

    let upstream_token = self.fresh_token();
    let upstream_mid = self.fresh_mid();

    self.by_upstream_mid.insert(upstream_mid, upstream_token.clone());
    self.by_upstream_token.insert(upstream_token.clone(),
                                   Downstream { addr: downstream_addr, token: downstream.token.clone(), mid: downstream.id, upstream_mid });

    let mut upstream = Message::new(Type::Con, downstream.code, upstream_mid, upstream_token);
    for seg in &parsed.path_segments {
      upstream.add_option(URI_PATH, seg.as_bytes().to_vec());
    }
    for (number, values) in downstream.opts.iter() {
      if *number == OptNumber(coap_msg::msg::opt::known::PROXY_URI) || *number == OptNumber(URI_PATH) {
        continue;
      }
      if is_safe_to_forward(number.0) {
        for value in values {
          upstream.add_option(number.0, value.0.clone());
        }
      }
    }
    upstream.payload = downstream.payload.clone();

    Ok(((parsed.host, parsed.port), upstream))
  }

  /// An upstream RST (error) or retransmit timeout arrived under
  /// `upstream_mid`; resolve and remove the tracked exchange, returning
  /// the downstream endpoint/token/mid a `5.04` should be sent to.
  pub fn fail_upstream_mid(&mut self, upstream_mid: Id) -> Option<(SocketAddr, Token, Id)> {
    let token = self.by_upstream_mid.remove(&upstream_mid)?;
    let downstream = self.by_upstream_token.remove(&token)?;
    Some((downstream.addr, downstream.token, downstream.mid))
  }

  /// An upstream response arrived correlated by token; resolve and remove
  /// the tracked exchange (final step — no further replies expected for
  /// this upstream token).
  pub fn resolve_upstream_token(&mut self, upstream_token: &Token) -> Option<(SocketAddr, Token, Id)> {
    let downstream = self.by_upstream_token.remove(upstream_token)?;
    self.by_upstream_mid.remove(&downstream.upstream_mid);
    Some((downstream.addr, downstream.token, downstream.mid))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_coap_uri_with_port() {
    let parsed = parse_proxy_uri("coap://upstream.example:5683/basic").unwrap();
    assert_eq!(parsed.host, "upstream.example");
    assert_eq!(parsed.port, 5683);
    assert_eq!(parsed.path_segments, vec!["basic"]);
  }

  #[test]
  fn defaults_port_when_absent() {
    let parsed = parse_proxy_uri("coap://upstream/basic").unwrap();
    assert_eq!(parsed.port, 5683);
  }

  #[test]
  fn rejects_unsupported_scheme() {
    assert_eq!(parse_proxy_uri("http://upstream/basic"), Err(ProxyUriError::UnsupportedScheme));
  }

  #[test]
  fn never_reuses_sequential_tokens_across_requests() {
    let mut proxy = Proxy::default();
    let t1 = proxy.fresh_token();
    let t2 = proxy.fresh_token();
    assert_ne!(t1, t2);
  }

  fn downstream_request(mid: Id, token: Token, uri: &str) -> Message {
    let mut msg = Message::new(Type::Con, coap_msg::Code::GET, mid, token);
    msg.add_option(coap_msg::msg::opt::known::PROXY_URI, uri.as_bytes().to_vec());
    msg
  }

  #[test]
  fn resolving_one_exchange_does_not_corrupt_another_by_mid_collision() {
    let mut proxy = Proxy::default();
    let addr: SocketAddr = "127.0.0.1:1234".parse().unwrap();

    // Both requests get downstream MIDs that collide with the upstream MID
    // space (both start counting from 0), exercising the bug this guards
    // against: cleaning up `by_upstream_mid` by the wrong key.
    let req_a = downstream_request(Id(0), Token(vec![0xAA]), "coap://upstream/a");
    let req_b = downstream_request(Id(0), Token(vec![0xBB]), "coap://upstream/b");

    let (_, upstream_a) = proxy.build_upstream_request(addr, &req_a).unwrap();
    let (_, upstream_b) = proxy.build_upstream_request(addr, &req_b).unwrap();

    // Resolve a's exchange by its upstream token.
    let resolved = proxy.resolve_upstream_token(&upstream_a.token).unwrap();
    assert_eq!(resolved.1, Token(vec![0xAA]));

    // b's upstream exchange must still be intact: a retransmit timeout on
    // b's upstream MID should still resolve back to b's downstream request.
    let failed = proxy.fail_upstream_mid(upstream_b.id).unwrap();
    assert_eq!(failed.1, Token(vec![0xBB]));
  }
}
