//! Response-side wrapper over [`coap_msg::Message`] (§3 "Response").

use coap_msg::msg::CodeKind;
use coap_msg::{Code, Id, Message, Token, Type};

use crate::option::MessageOptionsExt;

/// Whether a response [`Code`] belongs to the 2.xx/4.xx/5.xx success/error
/// classes §7 enumerates.
pub mod code;

/// A response, inbound or outbound. See [`crate::req::Req`] for the
/// request-side counterpart.
#[derive(Debug, Clone)]
pub struct Resp(pub Message);

impl Resp {
  /// Wrap a message. Returns `None` if its code isn't a response code.
  pub fn new(msg: Message) -> Option<Self> {
    (msg.code.kind() == CodeKind::Response).then_some(Resp(msg))
  }

  /// Build a fresh response of `code` to `request`, reusing its id and
  /// token and taking the reliability type the caller supplies (an ACK
  /// piggybacking the response for a CON request, or the same `ty` as the
  /// request for NON/separate responses).
  pub fn to(request: &Message, ty: Type, code: Code) -> Self {
    Resp(Message::new(ty, code, Id(request.id.0), Token(request.token.0.clone())))
  }

  /// Set the response payload and its `Content-Format`.
  pub fn set_payload(&mut self, bytes: impl Into<Vec<u8>>, content_format: u16) {
    self.0.payload = coap_msg::Payload(bytes.into());
    self.set_content_format(content_format);
  }
}

impl MessageOptionsExt for Resp {
  fn msg(&self) -> &Message {
    &self.0
  }

  fn msg_mut(&mut self) -> &mut Message {
    &mut self.0
  }
}
