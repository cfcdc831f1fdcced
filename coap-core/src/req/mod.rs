//! Request-side wrapper over [`coap_msg::Message`] (§3 "Request").

use coap_msg::{Code, Message};

use crate::option::MessageOptionsExt;

/// Request builder, mirroring [`Req::new`] plus the option setters.
pub mod builder;

/// The four CoAP request methods this endpoint understands. `Code`'s other
/// request-class values (`0.05`-`0.31`) are reserved and never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  /// `0.01 GET`
  Get,
  /// `0.02 POST`
  Post,
  /// `0.03 PUT`
  Put,
  /// `0.04 DELETE`
  Delete,
}

impl Method {
  /// Map a request [`Code`] to a [`Method`], if it's one of the four this
  /// endpoint dispatches.
  pub fn from_code(code: Code) -> Option<Self> {
    match code {
      | Code::GET => Some(Method::Get),
      | Code::POST => Some(Method::Post),
      | Code::PUT => Some(Method::Put),
      | Code::DELETE => Some(Method::Delete),
      | _ => None,
    }
  }

  /// The [`Code`] this method is carried on the wire as.
  pub fn code(self) -> Code {
    match self {
      | Method::Get => Code::GET,
      | Method::Post => Code::POST,
      | Method::Put => Code::PUT,
      | Method::Delete => Code::DELETE,
    }
  }
}

/// A request, inbound or outbound.
///
/// Thin wrapper rather than a newtype with private fields — callers
/// frequently need the raw [`Message`] (to hand to the codec, or to the
/// matcher keyed by token) alongside the typed option accessors.
#[derive(Debug, Clone)]
pub struct Req(pub Message);

impl Req {
  /// Wrap a message. Returns `None` if its code isn't a recognized request
  /// method.
  pub fn new(msg: Message) -> Option<Self> {
    Method::from_code(msg.code).map(|_| Req(msg))
  }

  /// The method this request invokes.
  ///
  /// Panics only if constructed by hand with a non-request code, which
  /// [`Req::new`] prevents.
  pub fn method(&self) -> Method {
    Method::from_code(self.0.code).expect("Req always carries a request method")
  }
}

impl MessageOptionsExt for Req {
  fn msg(&self) -> &Message {
    &self.0
  }

  fn msg_mut(&mut self) -> &mut Message {
    &mut self.0
  }
}
