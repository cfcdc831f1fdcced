/// RFC 7252 §3 — protocol version, packed into the top 2 bits of byte 1.
///
/// Always `1` for any message this crate produces. Messages with a
/// different version are accepted on parse (per RFC 7252, an implementation
/// that receives a message with an unknown version simply cannot understand
/// it) but the endpoint layer rejects anything other than `1`.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Version(pub u8);

impl Default for Version {
  fn default() -> Self {
    Version(1)
  }
}
