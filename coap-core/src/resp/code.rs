use coap_msg::Code;

/// Coarse classification of a response [`Code`], per RFC 7252 §5.9/§12.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
  /// `2.xx`
  Success,
  /// `4.xx`
  ClientError,
  /// `5.xx`
  ServerError,
}

/// Classify a response code. Panics if `code` isn't a response code
/// (class 2, 4 or 5) — callers are expected to have already distinguished
/// requests/responses via [`crate::resp::Resp::new`].
pub fn class(code: Code) -> Class {
  match code.class {
    | 2 => Class::Success,
    | 4 => Class::ClientError,
    | 5 => Class::ServerError,
    | c => unreachable!("not a response code class: {c}"),
  }
}

/// Whether this code is in the `2.xx` success class.
pub fn is_success(code: Code) -> bool {
  class(code) == Class::Success
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_known_codes() {
    assert_eq!(class(Code::CONTENT), Class::Success);
    assert_eq!(class(Code::NOT_FOUND), Class::ClientError);
    assert_eq!(class(Code::INTERNAL_SERVER_ERROR), Class::ServerError);
  }

  #[test]
  fn is_success_matches_2xx() {
    assert!(is_success(Code::CREATED));
    assert!(!is_success(Code::BAD_REQUEST));
  }
}
