use std::collections::BTreeMap;

/// Message Code (method / response status)
pub mod code;

/// Message parsing errors
pub mod parse_error;

/// Message ID
pub mod id;

/// Message Options
pub mod opt;

/// Message Type
pub mod ty;

/// Message Token
pub mod token;

/// Message Version
pub mod ver;

pub use code::*;
pub use id::*;
pub use opt::*;
pub use parse_error::*;
pub use token::*;
pub use ty::*;
pub use ver::*;

/// RFC 7252 §5.5 — the application data carried by a message.
///
/// An empty payload is legal and distinct from "no payload marker was
/// present"; both serialize to zero bytes after the `0xFF` marker.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Payload(pub Vec<u8>);

impl Payload {
  /// Borrow the payload as a byte slice
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }
}

/// First byte of a message.
///
/// ```text
/// CoAP version
/// |
/// |  Message type (request, response, empty)
/// |  |
/// |  |  Length of token, in bytes. (4-bit integer)
/// |  |  |
/// vv vv vvvv
/// 01 00 0000
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Byte1 {
  pub(crate) ver: Version,
  pub(crate) ty: Type,
  pub(crate) tkl: u8,
}

impl TryFrom<u8> for Byte1 {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    let ver = b >> 6;
    let ty = (b >> 4) & 0b11;
    let tkl = b & 0b1111;

    Ok(Byte1 { ver: Version(ver),
               ty: Type::try_from(ty)?,
               tkl })
  }
}

impl From<Byte1> for u8 {
  fn from(b: Byte1) -> u8 {
    (b.ver.0 << 6) | ((b.ty as u8) << 4) | (b.tkl & 0b1111)
  }
}

/// Map from option number to the (possibly repeated, order-preserving) list
/// of values seen for that number.
///
/// Keying on a `BTreeMap` gives us ascending-number iteration order for free,
/// which is exactly the order the wire format requires on serialization.
pub type OptionMap = BTreeMap<OptNumber, Vec<OptValue>>;

/// # CoAP Messages
///
/// High-level representation of a CoAP message: close enough to the wire
/// format to serialize cheaply, but with options collected into an
/// [`OptionMap`] rather than the raw delta-encoded list on the wire.
///
/// Message equality and the codec round-trip are defined modulo option
/// ordering: two messages with the same options inserted in a different
/// order, but the same number -> values mapping, are equal.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
  /// Protocol version. Always `1` for any message we construct; accepted on
  /// parse without further validation (RFC 7252 does not define version 2+).
  pub ver: Version,
  /// CON / NON / ACK / RST
  pub ty: Type,
  /// Method (request) or status (response) or empty
  pub code: Code,
  /// 16-bit message ID, used for deduplication and ACK/RST correlation
  pub id: Id,
  /// 0-8 opaque bytes identifying the request/response exchange
  pub token: Token,
  /// Options, sorted ascending by number; same-number repeats keep
  /// insertion order
  pub opts: OptionMap,
  /// Application payload
  pub payload: Payload,
}

impl Message {
  /// Construct a new message with no options and an empty payload.
  pub fn new(ty: Type, code: Code, id: Id, token: Token) -> Self {
    Message { ver: Version(1),
              ty,
              code,
              id,
              token,
              opts: BTreeMap::new(),
              payload: Payload::default() }
  }

  /// Construct the empty ACK/RST that answers `id`.
  pub fn empty(ty: Type, id: Id) -> Self {
    Message::new(ty, Code::EMPTY, id, Token(Vec::new()))
  }

  /// Add an option value, appending to any existing values for this number.
  pub fn add_option(&mut self, number: u16, value: Vec<u8>) {
    self.opts.entry(OptNumber(number)).or_default().push(OptValue(value));
  }

  /// Replace all values for this option number with a single value.
  pub fn set_option(&mut self, number: u16, value: Vec<u8>) {
    self.opts.insert(OptNumber(number), vec![OptValue(value)]);
  }

  /// Get the first value for an option number, if present.
  pub fn get_option(&self, number: u16) -> Option<&OptValue> {
    self.opts.get(&OptNumber(number)).and_then(|v| v.first())
  }

  /// Get all values for an option number.
  pub fn get_option_values(&self, number: u16) -> impl Iterator<Item = &OptValue> {
    self.opts.get(&OptNumber(number)).into_iter().flatten()
  }

  /// RFC 7252 §3: empty messages carry no token, no options, no payload.
  pub fn is_valid_empty(&self) -> bool {
    if self.code != Code::EMPTY {
      return true;
    }
    self.token.0.is_empty() && self.opts.is_empty() && self.payload.0.is_empty()
  }
}

/// Serialized length of a message, used to decide whether a response needs
/// blockwise segmentation and to size the output buffer before encoding.
pub fn serialized_len(msg: &Message) -> usize {
  let header = 4;
  let token = msg.token.0.len();

  let mut running_number = 0u16;
  let mut opts = 0usize;
  for (number, values) in msg.opts.iter() {
    for value in values {
      let delta = number.0 - running_number;
      running_number = number.0;
      opts += Opt { delta: OptDelta(delta), value: value.clone() }.len();
    }
  }

  let payload_marker = if msg.payload.0.is_empty() { 0 } else { 1 };
  header + token + opts + payload_marker + msg.payload.0.len()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn byte1_roundtrip() {
    let b = Byte1 { ver: Version(1), ty: Type::Con, tkl: 4 };
    let byte: u8 = b.into();
    assert_eq!(Byte1::try_from(byte).unwrap(), b);
  }

  #[test]
  fn empty_message_invariant() {
    let mut m = Message::empty(Type::Ack, Id(7));
    assert!(m.is_valid_empty());
    m.add_option(11, b"path".to_vec());
    assert!(!m.is_valid_empty());
  }
}
