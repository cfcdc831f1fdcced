use crate::msg::parse_error::MessageParseError;

/// RFC 7252 §3 — message type.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(u8)]
pub enum Type {
  /// Confirmable — the receiver MUST ack or reset it
  Con = 0,
  /// Non-confirmable — fire and forget
  Non = 1,
  /// Acknowledgement of a Con message
  Ack = 2,
  /// Rejection of a Con or Non message
  Rst = 3,
}

impl TryFrom<u8> for Type {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    match b {
      | 0 => Ok(Type::Con),
      | 1 => Ok(Type::Non),
      | 2 => Ok(Type::Ack),
      | 3 => Ok(Type::Rst),
      | n => Err(MessageParseError::InvalidType(n)),
    }
  }
}
