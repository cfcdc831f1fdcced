/// RFC 7252 §3 — 16-bit message ID, scoped to an (endpoint, direction) pair.
///
/// Used to detect duplicate transmissions and to match an ACK/RST to the
/// message it answers. Unrelated to [`Token`](crate::Token), which survives
/// across a separate response's fresh message ID.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Id(pub u16);

impl Id {
  /// Next message ID, wrapping at `u16::MAX`.
  pub fn next(self) -> Self {
    Id(self.0.wrapping_add(1))
  }
}

impl From<u16> for Id {
  fn from(n: u16) -> Self {
    Id(n)
  }
}
