//! The subset of RFC 7252 §5.10 / RFC 7641 / RFC 7959 options the core
//! protocol understands by number.

/// Block1/Block2 option value packing (RFC 7959 §2.1)
pub mod block;

/// Content-Format registry values (RFC 7252 §12.3)
pub mod content_format;

/// Observe option value and sequence-number comparison (RFC 7641 §3.4)
pub mod observe;

/// `If-Match` (repeatable, opaque)
pub const IF_MATCH: u16 = 1;
/// `Uri-Host` (string)
pub const URI_HOST: u16 = 3;
/// `ETag` (repeatable, opaque)
pub const ETAG: u16 = 4;
/// `If-None-Match` (opaque, empty value)
pub const IF_NONE_MATCH: u16 = 5;
/// `Observe` (integer, RFC 7641)
pub const OBSERVE: u16 = 6;
/// `Uri-Port` (integer)
pub const URI_PORT: u16 = 7;
/// `Location-Path` (repeatable, string)
pub const LOCATION_PATH: u16 = 8;
/// `Uri-Path` (repeatable, string)
pub const URI_PATH: u16 = 11;
/// `Content-Format` (integer)
pub const CONTENT_FORMAT: u16 = 12;
/// `Max-Age` (integer)
pub const MAX_AGE: u16 = 14;
/// `Uri-Query` (repeatable, string)
pub const URI_QUERY: u16 = 15;
/// `Accept` (integer)
pub const ACCEPT: u16 = 17;
/// `Location-Query` (repeatable, string)
pub const LOCATION_QUERY: u16 = 20;
/// `Block2` (integer, RFC 7959)
pub const BLOCK2: u16 = 23;
/// `Block1` (integer, RFC 7959)
pub const BLOCK1: u16 = 27;
/// `Size2` (integer, RFC 7959)
pub const SIZE2: u16 = 28;
/// `Proxy-Uri` (string)
pub const PROXY_URI: u16 = 35;
/// `Proxy-Scheme` (string)
pub const PROXY_SCHEME: u16 = 39;
/// `Size1` (integer, RFC 7959)
pub const SIZE1: u16 = 60;

/// content-format for `application/link-format`, used by `/.well-known/core`
pub const LINK_FORMAT: u32 = 40;

/// Whether this option number may legally appear more than once in a
/// message.
pub fn is_repeatable(number: u16) -> bool {
  matches!(number, IF_MATCH | ETAG | LOCATION_PATH | URI_PATH | URI_QUERY | LOCATION_QUERY)
}

/// Whether this option number is one the core protocol recognizes. An
/// unrecognized option with its critical bit set (`OptNumber::is_critical`)
/// must be rejected with `4.02 BadOption` rather than silently ignored
/// (RFC 7252 §5.4.1).
pub fn is_known(number: u16) -> bool {
  matches!(number,
           IF_MATCH
           | URI_HOST
           | ETAG
           | IF_NONE_MATCH
           | OBSERVE
           | URI_PORT
           | LOCATION_PATH
           | URI_PATH
           | CONTENT_FORMAT
           | MAX_AGE
           | URI_QUERY
           | ACCEPT
           | LOCATION_QUERY
           | BLOCK2
           | BLOCK1
           | SIZE2
           | PROXY_URI
           | PROXY_SCHEME
           | SIZE1)
}

/// Whether this option is safe for a proxy to forward unmodified even if it
/// doesn't understand it, per the `number & 2` bit (RFC 7252 §5.4.2).
pub fn is_safe_to_forward(number: u16) -> bool {
  number & 0b10 == 0
}
