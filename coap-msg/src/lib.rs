//! Low-level representation of CoAP messages (RFC 7252 §3).
//!
//! The centerpiece of this crate is [`Message`]: a CoAP message that stays
//! close to the actual byte layout on the wire, plus the [`TryFromBytes`] /
//! [`TryIntoBytes`] codec that moves between that representation and a raw
//! UDP datagram.
//!
//! This crate has no opinions about sockets, retransmission or request
//! dispatch — see the `coap-core` crate for the endpoint built on top of it.

#![deny(missing_copy_implementations)]
#![forbid(unsafe_code)]

/// Message parsing (bytes -> [`Message`])
pub mod from_bytes;

/// Message structs
pub mod msg;

/// Message serialization ([`Message`] -> bytes)
pub mod to_bytes;

#[doc(inline)]
pub use from_bytes::TryFromBytes;
#[doc(inline)]
pub use msg::*;
#[doc(inline)]
pub use to_bytes::TryIntoBytes;

#[cfg(test)]
pub(crate) fn test_msg() -> (Message, Vec<u8>) {
  use std::collections::BTreeMap;

  let header: [u8; 4] = 0b0100_0001_0100_0101_0000_0000_0000_0001_u32.to_be_bytes();
  let token: [u8; 1] = [254u8];
  let content_format: &[u8] = b"application/json";
  let options: [&[u8]; 2] = [&[0b_1100_1101u8, 0b0000_0011u8], content_format];
  let payload: [&[u8]; 2] = [&[0b1111_1111_u8], b"hello, world!"];
  let bytes = [header.as_ref(), token.as_ref(), options.concat().as_ref(), payload.concat().as_ref()].concat();

  let msg = Message { id: Id(1),
                       ty: Type::Con,
                       ver: Version(1),
                       token: Token(vec![254]),
                       opts: BTreeMap::from([(OptNumber(12), vec![OptValue(content_format.to_vec())])]),
                       code: Code { class: 2, detail: 5 },
                       payload: Payload(b"hello, world!".to_vec()) };
  (msg, bytes)
}
