use crate::msg::opt::opt_len_or_delta;
use crate::msg::{Byte1, Code, Message};

/// Trait for converting `Self` into a serialized byte buffer.
pub trait TryIntoBytes {
  /// Error type yielded if conversion fails
  type Error;

  /// Serialize `self` to bytes
  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error>;
}

/// Things that can go wrong encoding a message.
///
/// In practice this codec cannot fail to encode a well-formed [`Message`];
/// the error exists for forward compatibility and to mirror the fallible
/// decode side.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageToBytesError {
  /// Token was longer than 8 bytes.
  TokenTooLong,
}

impl TryIntoBytes for &Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    if self.token.0.len() > 8 {
      return Err(MessageToBytesError::TokenTooLong);
    }

    let mut out = Vec::with_capacity(crate::msg::serialized_len(self));

    let byte1 = Byte1 { ver: self.ver, ty: self.ty, tkl: self.token.0.len() as u8 };
    out.push(byte1.into());
    out.push(u8::from(self.code));
    out.extend_from_slice(&self.id.0.to_be_bytes());
    out.extend_from_slice(&self.token.0);

    let mut running_number = 0u16;
    for (number, values) in self.opts.iter() {
      for value in values {
        let delta = number.0 - running_number;
        running_number = number.0;

        let (delta_nibble, delta_ext) = opt_len_or_delta(delta);
        let (len_nibble, len_ext) = opt_len_or_delta(value.0.len() as u16);

        out.push((delta_nibble << 4) | len_nibble);
        out.extend_from_slice(&delta_ext);
        out.extend_from_slice(&len_ext);
        out.extend_from_slice(&value.0);
      }
    }

    if !self.payload.0.is_empty() {
      out.push(0xFF);
      out.extend_from_slice(&self.payload.0);
    }

    Ok(out)
  }
}

impl TryIntoBytes for Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    (&self).try_into_bytes()
  }
}
