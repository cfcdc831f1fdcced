/// Everything that can go wrong deserializing a [`Message`](super::Message)
/// from a raw datagram.
///
/// This is deliberately a flat enum of "what byte looked wrong", not yet
/// mapped to a CoAP response code — that mapping (§4.1 of the endpoint spec)
/// lives in `coap-core`, since whether a parse error is worth a reply at all
/// depends on whether a message ID could be recovered.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum MessageParseError {
  /// Fewer than 4 bytes were available for the header.
  UnexpectedEndOfStream,
  /// The 2-bit type field held a value other than 0-3 (unreachable in
  /// practice, since 2 bits can only ever encode 0-3, but kept so callers
  /// that mask nibbles incorrectly still get a typed error).
  InvalidType(u8),
  /// Token length field (TKL) was 9-15; RFC 7252 reserves that range.
  InvalidTokenLength(u8),
  /// An option's 4-bit delta or length nibble was 15, which RFC 7252
  /// reserves as a "payload marker or error" sentinel and never legal
  /// within an option header.
  OptionReservedNibble,
  /// The `0xFF` payload marker was the last byte of the datagram.
  PayloadMarkerWithNoPayload,
}

impl MessageParseError {
  pub(crate) fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }
}
