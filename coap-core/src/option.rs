//! Typed getters/setters for the options the core protocol understands,
//! layered as an extension trait over the raw [`coap_msg::Message`] so
//! [`crate::req::Req`] and [`crate::resp::Resp`] share one implementation.

use coap_msg::msg::opt::known::block::Block;
use coap_msg::msg::opt::known::observe::SequenceNumber;
use coap_msg::msg::opt::known::*;
use coap_msg::{Message, OptValue};

/// Typed access to the options the core protocol cares about.
pub trait MessageOptionsExt {
  /// Mutable access to the underlying message (only requirement to get the
  /// default method bodies below).
  fn msg(&self) -> &Message;
  /// Mutable access to the underlying message
  fn msg_mut(&mut self) -> &mut Message;

  /// `Uri-Path` segments, in order, decoded as UTF-8.
  fn path_segments(&self) -> Result<Vec<&str>, std::str::Utf8Error> {
    self.msg().get_option_values(URI_PATH).map(|v| v.as_str()).collect()
  }

  /// Set `Uri-Path` from a `/`-separated path, discarding empty segments
  /// (so both `"/a/b"` and `"a/b/"` produce the same two options).
  fn set_path(&mut self, path: &str) {
    self.msg_mut().opts.remove(&coap_msg::OptNumber(URI_PATH));
    for seg in path.split('/').filter(|s| !s.is_empty()) {
      self.msg_mut().add_option(URI_PATH, seg.as_bytes().to_vec());
    }
  }

  /// `Uri-Query` key=value pairs, raw strings.
  fn query_segments(&self) -> Result<Vec<&str>, std::str::Utf8Error> {
    self.msg().get_option_values(URI_QUERY).map(|v| v.as_str()).collect()
  }

  /// `Observe` option value, if present.
  fn observe(&self) -> Option<SequenceNumber> {
    self.msg().get_option(OBSERVE).map(|v| SequenceNumber::new(v.as_uint()))
  }

  /// Set the `Observe` option.
  fn set_observe(&mut self, seq: SequenceNumber) {
    self.msg_mut().set_option(OBSERVE, OptValue::from_uint(seq.0).0);
  }

  /// `ETag` values (repeatable in `If-Match`; single-valued in responses).
  fn etags(&self) -> Vec<&OptValue> {
    self.msg().get_option_values(ETAG).collect()
  }

  /// Set a single `ETag`.
  fn set_etag(&mut self, etag: Vec<u8>) {
    self.msg_mut().set_option(ETAG, etag);
  }

  /// Whether `If-Match` was present with no listed ETags (the RFC 7252
  /// wildcard: "any current representation").
  fn if_match_wildcard(&self) -> bool {
    self.msg().opts.get(&coap_msg::OptNumber(IF_MATCH)).map(|v| v.iter().any(|o| o.0.is_empty())).unwrap_or(false)
  }

  /// `If-Match` ETags, if the option is present at all.
  fn if_match(&self) -> Option<Vec<&OptValue>> {
    if self.msg().opts.contains_key(&coap_msg::OptNumber(IF_MATCH)) {
      Some(self.msg().get_option_values(IF_MATCH).collect())
    } else {
      None
    }
  }

  /// Whether `If-None-Match` is present.
  fn if_none_match(&self) -> bool {
    self.msg().opts.contains_key(&coap_msg::OptNumber(IF_NONE_MATCH))
  }

  /// `Content-Format` of the payload.
  fn content_format(&self) -> Option<u16> {
    self.msg().get_option(CONTENT_FORMAT).map(|v| v.as_uint() as u16)
  }

  /// Set `Content-Format`.
  fn set_content_format(&mut self, cf: u16) {
    self.msg_mut().set_option(CONTENT_FORMAT, OptValue::from_uint(cf as u32).0);
  }

  /// `Accept` — the content-format the requester wants back.
  fn accept(&self) -> Option<u16> {
    self.msg().get_option(ACCEPT).map(|v| v.as_uint() as u16)
  }

  /// `Max-Age`, in seconds (default 60 per RFC 7252 §5.10.5 if absent).
  fn max_age(&self) -> u32 {
    self.msg().get_option(MAX_AGE).map(|v| v.as_uint()).unwrap_or(60)
  }

  /// Set `Max-Age`.
  fn set_max_age(&mut self, seconds: u32) {
    self.msg_mut().set_option(MAX_AGE, OptValue::from_uint(seconds).0);
  }

  /// `Location-Path` segments set by the server on a `2.01 Created`.
  fn location_path(&self) -> Result<Vec<&str>, std::str::Utf8Error> {
    self.msg().get_option_values(LOCATION_PATH).map(|v| v.as_str()).collect()
  }

  /// Set `Location-Path` from segments.
  fn set_location_path(&mut self, segments: &[impl AsRef<str>]) {
    self.msg_mut().opts.remove(&coap_msg::OptNumber(LOCATION_PATH));
    for seg in segments {
      self.msg_mut().add_option(LOCATION_PATH, seg.as_ref().as_bytes().to_vec());
    }
  }

  /// `Location-Query` segments set by the server on a `2.01 Created`.
  fn location_query(&self) -> Result<Vec<&str>, std::str::Utf8Error> {
    self.msg().get_option_values(LOCATION_QUERY).map(|v| v.as_str()).collect()
  }

  /// Set `Location-Query` from segments.
  fn set_location_query(&mut self, segments: &[impl AsRef<str>]) {
    self.msg_mut().opts.remove(&coap_msg::OptNumber(LOCATION_QUERY));
    for seg in segments {
      self.msg_mut().add_option(LOCATION_QUERY, seg.as_ref().as_bytes().to_vec());
    }
  }

  /// `Block1` (request-body segmentation).
  fn block1(&self) -> Option<Block> {
    self.msg().get_option(BLOCK1).map(|v| Block::decode(v.as_uint()))
  }

  /// Set `Block1`.
  fn set_block1(&mut self, block: Block) {
    self.msg_mut().set_option(BLOCK1, OptValue::from_uint(block.encode()).0);
  }

  /// `Block2` (response-body segmentation).
  fn block2(&self) -> Option<Block> {
    self.msg().get_option(BLOCK2).map(|v| Block::decode(v.as_uint()))
  }

  /// Set `Block2`.
  fn set_block2(&mut self, block: Block) {
    self.msg_mut().set_option(BLOCK2, OptValue::from_uint(block.encode()).0);
  }

  /// `Proxy-Uri`, the full upstream URI a forward-proxy request targets.
  fn proxy_uri(&self) -> Option<&str> {
    self.msg().get_option(PROXY_URI).and_then(|v| v.as_str().ok())
  }

  /// `Size1` — client's hint of the full Block1 body size.
  fn size1(&self) -> Option<u32> {
    self.msg().get_option(SIZE1).map(|v| v.as_uint())
  }

  /// Set `Size1`.
  fn set_size1(&mut self, size: u32) {
    self.msg_mut().set_option(SIZE1, OptValue::from_uint(size).0);
  }
}

impl MessageOptionsExt for Message {
  fn msg(&self) -> &Message {
    self
  }

  fn msg_mut(&mut self) -> &mut Message {
    self
  }
}

#[cfg(test)]
mod tests {
  use coap_msg::{Code, Id, Token, Type};

  use super::*;

  #[test]
  fn path_roundtrip() {
    let mut msg = Message::new(Type::Con, Code::GET, Id(1), Token(vec![]));
    msg.set_path("/sensors/temp/");
    assert_eq!(msg.path_segments().unwrap(), vec!["sensors", "temp"]);
  }

  #[test]
  fn observe_roundtrip() {
    let mut msg = Message::new(Type::Con, Code::GET, Id(1), Token(vec![]));
    msg.set_observe(SequenceNumber::new(42));
    assert_eq!(msg.observe().unwrap(), SequenceNumber::new(42));
  }

  #[test]
  fn if_match_wildcard_detected() {
    let mut msg = Message::new(Type::Con, Code::PUT, Id(1), Token(vec![]));
    msg.add_option(IF_MATCH, vec![]);
    assert!(msg.if_match_wildcard());
  }

  #[test]
  fn location_query_roundtrip() {
    let mut msg = Message::new(Type::Con, Code::CREATED, Id(1), Token(vec![]));
    msg.set_location_query(&["id=7"]);
    assert_eq!(msg.location_query().unwrap(), vec!["id=7"]);
  }
}
