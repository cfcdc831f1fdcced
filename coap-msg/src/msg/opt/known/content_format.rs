/// RFC 7252 §12.3 — registered `Content-Format` values this core cares
/// about. Applications are free to use other registered or experimental
/// values; this is not an exhaustive enum, just the ones the protocol core
/// itself produces (discovery responses).
#[derive(Copy, Clone, Hash, PartialEq, Eq, Debug)]
pub enum ContentFormat {
  /// `text/plain;charset=utf-8` (0)
  TextPlain,
  /// `application/link-format` (40), used by `/.well-known/core`
  LinkFormat,
  /// `application/octet-stream` (42)
  OctetStream,
  /// `application/json` (50)
  Json,
  /// Any other registered or experimental value
  Other(u16),
}

impl From<u16> for ContentFormat {
  fn from(n: u16) -> Self {
    match n {
      | 0 => ContentFormat::TextPlain,
      | 40 => ContentFormat::LinkFormat,
      | 42 => ContentFormat::OctetStream,
      | 50 => ContentFormat::Json,
      | n => ContentFormat::Other(n),
    }
  }
}

impl From<ContentFormat> for u16 {
  fn from(c: ContentFormat) -> u16 {
    match c {
      | ContentFormat::TextPlain => 0,
      | ContentFormat::LinkFormat => 40,
      | ContentFormat::OctetStream => 42,
      | ContentFormat::Json => 50,
      | ContentFormat::Other(n) => n,
    }
  }
}
