use coap_msg::{Id, Message, Token, Type};

use super::{Method, Req};
use crate::option::MessageOptionsExt;

/// Builds a [`Req`] one option at a time, the way a client assembles an
/// outbound request before it's handed to the matcher and reliability
/// layer.
pub struct ReqBuilder {
  msg: Message,
}

impl ReqBuilder {
  /// Start building a request for `method`, confirmable unless
  /// [`ReqBuilder::non`] is called.
  pub fn new(method: Method, id: Id, token: Token) -> Self {
    ReqBuilder { msg: Message::new(Type::Con, method.code(), id, token) }
  }

  /// Mark the request non-confirmable.
  pub fn non(mut self) -> Self {
    self.msg.ty = Type::Non;
    self
  }

  /// Set `Uri-Path` from a `/`-separated path.
  pub fn path(mut self, path: &str) -> Self {
    self.msg.set_path(path);
    self
  }

  /// Append a single `Uri-Query` segment.
  pub fn query(mut self, segment: &str) -> Self {
    self.msg.add_option(coap_msg::msg::opt::known::URI_QUERY, segment.as_bytes().to_vec());
    self
  }

  /// Set the request payload and its `Content-Format`.
  pub fn payload(mut self, bytes: impl Into<Vec<u8>>, content_format: u16) -> Self {
    self.msg.payload = coap_msg::Payload(bytes.into());
    self.msg.set_content_format(content_format);
    self
  }

  /// Register interest via `Observe: 0`.
  pub fn observe(mut self) -> Self {
    self.msg.set_observe(coap_msg::msg::opt::known::observe::SequenceNumber::new(0));
    self
  }

  /// Request a specific `Content-Format` back via `Accept`.
  pub fn accept(mut self, content_format: u16) -> Self {
    self.msg.set_option(coap_msg::msg::opt::known::ACCEPT, coap_msg::OptValue::from_uint(content_format as u32).0);
    self
  }

  /// Finish building.
  pub fn build(self) -> Req {
    Req(self.msg)
  }
}
