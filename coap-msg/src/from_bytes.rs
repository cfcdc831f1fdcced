use std::collections::BTreeMap;

use crate::msg::opt::{parse_opt_len_or_delta, OptValue};
use crate::msg::{Byte1, Code, Id, Message, MessageParseError, Opt, OptDelta, OptNumber, Payload, Token, Type};

/// Trait for converting a sequence of bytes into some data structure.
pub trait TryFromBytes: Sized {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert from a byte slice into `Self`
  fn try_from_bytes(bytes: &[u8]) -> Result<Self, Self::Error>;
}

impl TryFromBytes for Message {
  type Error = MessageParseError;

  fn try_from_bytes(bytes: &[u8]) -> Result<Self, Self::Error> {
    let mut iter = bytes.iter();

    let byte1 = Byte1::try_from(*iter.next().ok_or(MessageParseError::UnexpectedEndOfStream)?)?;
    Token::validate(byte1.tkl)?;

    let code = Code::from(*iter.next().ok_or(MessageParseError::UnexpectedEndOfStream)?);

    let id_hi = *iter.next().ok_or(MessageParseError::UnexpectedEndOfStream)?;
    let id_lo = *iter.next().ok_or(MessageParseError::UnexpectedEndOfStream)?;
    let id = Id(u16::from_be_bytes([id_hi, id_lo]));

    let token_bytes: Vec<u8> = (&mut iter).take(byte1.tkl as usize).copied().collect();
    if token_bytes.len() != byte1.tkl as usize {
      return Err(MessageParseError::UnexpectedEndOfStream);
    }
    let token = Token(token_bytes);

    let opts = parse_opts(&mut iter)?;

    let payload = match iter.next() {
      | None => Payload::default(),
      | Some(0xFF) => {
        let rest: Vec<u8> = iter.copied().collect();
        if rest.is_empty() {
          return Err(MessageParseError::PayloadMarkerWithNoPayload);
        }
        Payload(rest)
      },
      | Some(_) => return Err(MessageParseError::OptionReservedNibble),
    };

    Ok(Message { ver: byte1.ver, ty: byte1.ty, code, id, token, opts, payload })
  }
}

/// Parse the delta-encoded option sequence that follows the token, up to
/// (but not including) the `0xFF` payload marker or end of stream.
fn parse_opts(iter: &mut std::slice::Iter<u8>) -> Result<BTreeMap<OptNumber, Vec<OptValue>>, MessageParseError> {
  let mut opts: BTreeMap<OptNumber, Vec<OptValue>> = BTreeMap::new();
  let mut running_number = 0u16;

  loop {
    // peek without consuming, since 0xFF / end-of-stream both mean "done"
    // and neither should be treated as an option header byte.
    let head = match iter.as_slice().first() {
      | None => return Ok(opts),
      | Some(&0xFF) => return Ok(opts),
      | Some(&b) => b,
    };
    iter.next();

    let delta_nibble = head >> 4;
    let len_nibble = head & 0b1111;

    let delta = parse_opt_len_or_delta(delta_nibble, iter, MessageParseError::OptionReservedNibble)?;
    let len = parse_opt_len_or_delta(len_nibble, iter, MessageParseError::OptionReservedNibble)?;

    let value: Vec<u8> = iter.take(len as usize).copied().collect();
    if value.len() != len as usize {
      return Err(MessageParseError::UnexpectedEndOfStream);
    }

    running_number = running_number.checked_add(delta).ok_or(MessageParseError::UnexpectedEndOfStream)?;
    let opt = Opt { delta: OptDelta(delta), value: OptValue(value) };
    opts.entry(OptNumber(running_number)).or_default().push(opt.value);
  }
}
